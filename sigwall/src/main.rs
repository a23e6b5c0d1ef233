use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
use config::{Config, ConfigError, MetricsConfig};

#[derive(Parser)]
#[command(about = "Serves petition signatures fetched from an OSDI forms API")]
struct Cli {
    /// Path to the YAML configuration file. Without one, configuration
    /// comes from defaults and environment variables.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.signatures.apply_env();
    config.signatures.validate()?;

    Ok(config)
}

fn init_metrics(metrics: &MetricsConfig) {
    let recorder = match StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some("sigwall"))
    {
        Ok(recorder) => recorder,
        Err(err) => {
            warn!(error = %err, "could not create statsd exporter, metrics disabled");
            return;
        }
    };

    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "could not install metrics recorder");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "could not load configuration");
            std::process::exit(1);
        }
    };

    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics);
    }

    info!(
        form_id = %config.signatures.upstream.form_id,
        listener = %format!("{}:{}", config.signatures.listener.host, config.signatures.listener.port),
        "starting signature service"
    );

    if let Err(err) = signatures::run(config.signatures).await {
        error!(error = %err, "service exited with error");
        std::process::exit(1);
    }
}
