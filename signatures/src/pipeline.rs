use crate::client::{FetchError, OsdiClient};
use crate::config::{FetchConfig, UpstreamConfig};
use crate::enrich::Enricher;
use crate::histogram;
use crate::metrics_defs::{FETCH_DURATION, FETCH_PAGES, FETCH_RECORDS};
use crate::pages::Paginator;
use crate::types::MergedRecord;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const SUBMISSIONS_KEY: &str = "osdi:submissions";

/// Ask the collection endpoint to embed each submission's person so the
/// common case needs no follow-up request per item.
const EXPAND_PERSON: &[(&str, &str)] = &[("expand", "person")];

/// Outcome of one full fetch of the submissions collection.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub records: Vec<MergedRecord>,
    /// True when pagination stopped early on a failed page. The records
    /// collected before the failure are still present.
    pub partial: bool,
}

/// Walks every page of the form's submissions and enriches each entry into
/// a merged record. One sequential worker; the politeness delays between
/// pages and items bound the request rate against the upstream limiter.
pub struct SignatureFetcher {
    client: OsdiClient,
    submissions_url: String,
    fetch: FetchConfig,
}

impl SignatureFetcher {
    pub fn new(upstream: &UpstreamConfig, fetch: FetchConfig) -> Result<Self, FetchError> {
        let client = OsdiClient::new(&upstream.api_token, fetch.retry_policy())?;
        let submissions_url = format!(
            "{}/forms/{}/submissions/",
            upstream.base_url.trim_end_matches('/'),
            upstream.form_id
        );

        Ok(SignatureFetcher {
            client,
            submissions_url,
            fetch,
        })
    }

    /// Fetch and merge the whole collection. Per-item failures are skipped;
    /// a failed page stops the walk but keeps what was already collected.
    pub async fn fetch_all(&self) -> FetchSummary {
        let started = Instant::now();
        let enricher = Enricher::new(&self.client).with_page_delay(self.fetch.page_delay());
        let mut pages = Paginator::new(&self.client, self.submissions_url.clone(), SUBMISSIONS_KEY)
            .with_query(EXPAND_PERSON)
            .with_page_delay(self.fetch.page_delay())
            .with_max_pages(self.fetch.max_pages);

        let mut summary = FetchSummary::default();
        let mut page_count = 0u32;

        while let Some(page) = pages.next_page().await {
            let items = match page {
                Ok(items) => items,
                Err(err) => {
                    warn!(error = %err, "submission page fetch failed, keeping partial results");
                    summary.partial = true;
                    break;
                }
            };
            page_count += 1;
            debug!(page = page_count, items = items.len(), "fetched submission page");

            for (index, item) in items.iter().enumerate() {
                if index > 0 && !self.fetch.item_delay().is_zero() {
                    sleep(self.fetch.item_delay()).await;
                }
                if let Some(record) = enricher.enrich(item).await {
                    summary.records.push(record);
                }
            }
        }

        histogram!(FETCH_DURATION).record(started.elapsed().as_secs_f64());
        histogram!(FETCH_RECORDS).record(summary.records.len() as f64);
        histogram!(FETCH_PAGES).record(page_count as f64);
        info!(
            records = summary.records.len(),
            pages = page_count,
            partial = summary.partial,
            "signature fetch complete"
        );

        summary
    }
}
