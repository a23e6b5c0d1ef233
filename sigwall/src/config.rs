use serde::Deserialize;
use signatures::config::Config as SignaturesConfig;
use std::fs::File;

#[derive(Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Default, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
}

#[derive(Default, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub signatures: SignaturesConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] signatures::config::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use signatures::config::CacheStoreType;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            signatures:
                listener:
                    host: 0.0.0.0
                    port: 8080
                upstream:
                    api_token: "secret"
                    form_id: "form-123"
                cache:
                    ttl_secs: 600
                    store:
                        type: file
                        path: /var/lib/sigwall/signatures.json
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.common.metrics.unwrap().statsd_port, 8125);
        assert_eq!(config.signatures.listener.port, 8080);
        assert_eq!(config.signatures.upstream.form_id, "form-123");
        assert_eq!(
            config.signatures.cache.store,
            CacheStoreType::File {
                path: "/var/lib/sigwall/signatures.json".into()
            }
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
            signatures:
                upstream:
                    api_token: "secret"
                    form_id: "form-123"
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(config.common.metrics.is_none());
        assert_eq!(config.signatures.cache.ttl_secs, 900);
        assert!(config.signatures.validate().is_ok());
    }
}
