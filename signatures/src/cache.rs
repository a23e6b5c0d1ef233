use crate::counter;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::pipeline::SignatureFetcher;
use crate::types::MergedRecord;
use parking_lot::RwLock;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode or decode cache file: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no signature data available")]
    Unavailable,
}

/// The last successfully produced result set and the instant it was
/// produced. The two are only ever replaced together.
#[derive(Debug)]
pub struct CacheEntry {
    pub records: Vec<MergedRecord>,
    pub fetched_at: SystemTime,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.fetched_at)
            .unwrap_or(Duration::ZERO)
    }

    pub fn last_updated_epoch(&self) -> u64 {
        self.fetched_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Persists the last successful result set between process runs.
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Result<Option<CacheEntry>, CacheError>;
    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Stores the result set as a single JSON file. The file's mtime is the
/// entry's timestamp, so freshness carries across process restarts.
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCacheStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self) -> Result<Option<CacheEntry>, CacheError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let fetched_at = file.metadata()?.modified()?;
        let records: Vec<MergedRecord> = serde_json::from_reader(BufReader::new(file))?;

        Ok(Some(CacheEntry {
            records,
            fetched_at,
        }))
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &entry.records)?;
        writer.flush()?;
        Ok(())
    }
}

/// Single-slot cache in front of the fetch pipeline. Owns the last known
/// good result set; readers get an `Arc` to an immutable entry, so a
/// refresh never mutates data another request is still serializing.
#[derive(Clone)]
pub struct SignatureCache {
    inner: Arc<CacheInner>,
}

impl SignatureCache {
    pub fn new(
        fetcher: SignatureFetcher,
        ttl: Duration,
        store: Option<Box<dyn CacheStore>>,
    ) -> Self {
        SignatureCache {
            inner: Arc::new(CacheInner {
                fetcher,
                ttl,
                slot: RwLock::new(None),
                refresh_lock: Semaphore::new(1),
                store,
                hydrated: AtomicBool::new(false),
            }),
        }
    }

    /// Serve the cached result set, refreshing from upstream when the slot
    /// is empty or older than the TTL. Concurrent refreshes collapse to a
    /// single in-flight fetch.
    pub async fn get_or_refresh(&self) -> Result<Arc<CacheEntry>, CacheError> {
        self.inner.hydrate();

        if let Some(entry) = self.inner.fresh_entry() {
            counter!(CACHE_HIT).increment(1);
            return Ok(entry);
        }
        counter!(CACHE_MISS).increment(1);

        // The refresh runs on its own task: a caller that disconnects and
        // drops this future must not abort an in-flight fetch, which still
        // populates the cache for the next reader.
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.refresh().await })
            .await
            .map_err(|_| CacheError::Unavailable)?
    }
}

struct CacheInner {
    fetcher: SignatureFetcher,
    ttl: Duration,
    slot: RwLock<Option<Arc<CacheEntry>>>,
    // Collapses concurrent refreshes to one in-flight fetch.
    refresh_lock: Semaphore,
    store: Option<Box<dyn CacheStore>>,
    // The persisted copy is consulted once, lazily.
    hydrated: AtomicBool,
}

impl CacheInner {
    /// On a refresh that produces nothing, the previous entry is served
    /// unchanged and its timestamp is left alone, so the next request
    /// retries immediately instead of locking in an empty result for a
    /// full TTL.
    async fn refresh(&self) -> Result<Arc<CacheEntry>, CacheError> {
        let _permit = self
            .refresh_lock
            .acquire()
            .await
            .map_err(|_| CacheError::Unavailable)?;

        // Another request may have refreshed while we waited on the permit.
        if let Some(entry) = self.fresh_entry() {
            return Ok(entry);
        }

        let summary = self.fetcher.fetch_all().await;
        if summary.records.is_empty() {
            warn!(
                partial = summary.partial,
                "fetch produced no records, serving last known data"
            );
            return self.last_known().ok_or(CacheError::Unavailable);
        }
        if summary.partial {
            warn!(
                records = summary.records.len(),
                "caching partial result set; upstream pagination failed part-way"
            );
        }

        let entry = Arc::new(CacheEntry {
            records: summary.records,
            fetched_at: SystemTime::now(),
        });
        *self.slot.write() = Some(entry.clone());

        if let Some(store) = &self.store
            && let Err(err) = store.store(&entry)
        {
            warn!(error = %err, "could not persist signature cache");
        }

        Ok(entry)
    }

    fn fresh_entry(&self) -> Option<Arc<CacheEntry>> {
        self.slot
            .read()
            .as_ref()
            .filter(|entry| entry.age() < self.ttl)
            .cloned()
    }

    fn last_known(&self) -> Option<Arc<CacheEntry>> {
        self.slot.read().clone()
    }

    /// Seed the in-memory slot from the persisted copy, once. A corrupt or
    /// unreadable file counts as an empty cache.
    fn hydrate(&self) {
        let Some(store) = &self.store else { return };
        if self.hydrated.swap(true, Ordering::SeqCst) {
            return;
        }

        match store.load() {
            Ok(Some(entry)) => {
                info!(
                    records = entry.records.len(),
                    age_secs = entry.age().as_secs(),
                    "loaded signature cache from disk"
                );
                *self.slot.write() = Some(Arc::new(entry));
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ignoring unreadable signature cache file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, UpstreamConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> SignatureFetcher {
        let upstream = UpstreamConfig {
            base_url: server.uri(),
            api_token: "test-token".into(),
            form_id: "form-1".into(),
        };
        let fetch = FetchConfig {
            max_pages: None,
            page_delay_ms: 0,
            item_delay_ms: 0,
            retry_max_attempts: 2,
            retry_base_delay_ms: 1,
        };
        SignatureFetcher::new(&upstream, fetch).unwrap()
    }

    fn memory_cache(server: &MockServer, ttl: Duration) -> SignatureCache {
        SignatureCache::new(fetcher(server), ttl, None)
    }

    fn file_cache(server: &MockServer, ttl: Duration, path: &Path) -> SignatureCache {
        SignatureCache::new(fetcher(server), ttl, Some(Box::new(FileCacheStore::new(path))))
    }

    fn submissions_page(names: &[&str]) -> serde_json::Value {
        let items: Vec<_> = names
            .iter()
            .map(|name| {
                json!({"_embedded": {"osdi:person": {"given_name": name}}})
            })
            .collect();
        json!({"_embedded": {"osdi:submissions": items}})
    }

    fn sample_entry(names: &[&str]) -> CacheEntry {
        CacheEntry {
            records: names
                .iter()
                .map(|name| MergedRecord {
                    given_name: Some(name.to_string()),
                    ..Default::default()
                })
                .collect(),
            fetched_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_serves_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Ada"])),
            )
            // A second network fetch would violate the freshness contract.
            .expect(1)
            .mount(&server)
            .await;

        let cache = memory_cache(&server, Duration::from_secs(60));

        let first = cache.get_or_refresh().await.unwrap();
        let second = cache.get_or_refresh().await.unwrap();

        assert_eq!(first.records, second.records);
        assert_eq!(first.fetched_at, second.fetched_at);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Ada"])),
            )
            .expect(2)
            .mount(&server)
            .await;

        // Zero TTL: every entry is immediately stale.
        let cache = memory_cache(&server, Duration::ZERO);
        cache.get_or_refresh().await.unwrap();
        cache.get_or_refresh().await.unwrap();
    }

    #[tokio::test]
    async fn test_total_failure_serves_last_known_unchanged() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Ada"])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = memory_cache(&server, Duration::ZERO);

        let first = cache.get_or_refresh().await.unwrap();
        let second = cache.get_or_refresh().await.unwrap();

        // Same entry, same timestamp: the failed refresh must not touch it.
        assert_eq!(first.records, second.records);
        assert_eq!(first.fetched_at, second.fetched_at);
    }

    #[tokio::test]
    async fn test_total_failure_without_fallback_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = memory_cache(&server, Duration::from_secs(60));
        assert!(matches!(
            cache.get_or_refresh().await,
            Err(CacheError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_collapse_to_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(submissions_page(&["Ada"]))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = memory_cache(&server, Duration::from_secs(60));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_refresh().await.unwrap().records.len() }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_refresh().await.unwrap().records.len() }
        });

        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_does_not_abort_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(submissions_page(&["Ada"]))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = memory_cache(&server, Duration::from_secs(60));

        // Simulates a caller disconnecting mid-refresh.
        let abandoned = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();

        // The background fetch still completes and fills the slot.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let entry = cache.get_or_refresh().await.unwrap();
        assert_eq!(entry.records.len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("signatures.json"));

        let entry = sample_entry(&["Ada", "Grace"]);
        store.store(&entry).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.records, entry.records);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("missing.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = FileCacheStore::new(path);
        assert!(matches!(store.load(), Err(CacheError::Codec(_))));
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_a_cold_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Ada"])),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, b"{ not json").unwrap();

        // The corrupt file is ignored and upstream is fetched instead.
        let cache = file_cache(&server, Duration::from_secs(60), &path);
        let entry = cache.get_or_refresh().await.unwrap();
        assert_eq!(entry.records.len(), 1);
    }

    #[tokio::test]
    async fn test_file_cache_survives_restart_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Ada"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");

        // First process run populates the file.
        let cache = file_cache(&server, Duration::from_secs(60), &path);
        cache.get_or_refresh().await.unwrap();

        // Second run hydrates from the fresh-enough file; the mock's
        // expectation of a single request covers both runs.
        let restarted = file_cache(&server, Duration::from_secs(60), &path);
        let entry = restarted.get_or_refresh().await.unwrap();
        assert_eq!(entry.records[0].given_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_stale_cache_file_triggers_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/form-1/submissions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(submissions_page(&["Grace"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        FileCacheStore::new(&path).store(&sample_entry(&["Ada"])).unwrap();

        // Zero TTL makes the persisted copy stale no matter its mtime.
        let cache = file_cache(&server, Duration::ZERO, &path);

        let entry = cache.get_or_refresh().await.unwrap();
        assert_eq!(entry.records[0].given_name.as_deref(), Some("Grace"));
    }
}
