//! Fetches petition signatures from an OSDI-style forms API, merges each
//! submission with its person's profile and tags, caches the result, and
//! serves it as JSON for a static signature wall.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod enrich;
pub mod metrics_defs;
pub mod pages;
pub mod pipeline;
pub mod render;
pub mod types;

use cache::{CacheStore, FileCacheStore, SignatureCache};
use config::CacheStoreType;
use pipeline::SignatureFetcher;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("upstream client error: {0}")]
    Client(#[from] client::FetchError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),
}

/// Wire the fetch pipeline and cache from configuration and serve the API
/// until the process is stopped.
pub async fn run(config: config::Config) -> Result<(), ServiceError> {
    let fetcher = SignatureFetcher::new(&config.upstream, config.fetch.clone())?;

    let store: Option<Box<dyn CacheStore>> = match &config.cache.store {
        CacheStoreType::File { path } => Some(Box::new(FileCacheStore::new(path))),
        CacheStoreType::Memory => None,
    };
    let cache = SignatureCache::new(fetcher, config.cache.ttl(), store);

    api::serve(config.listener.clone(), cache).await?;
    Ok(())
}
