use crate::client::{FetchError, OsdiClient};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Result of draining a paginated walk to completion.
#[derive(Debug, Default)]
pub struct PageWalk {
    pub items: Vec<Value>,
    /// True when a page failed after retries and the walk stopped early.
    /// Items from the pages before the failure are still present.
    pub partial: bool,
}

/// A lazy, finite, non-restartable walk over a paginated hypermedia
/// collection. Each page's items are drawn from `_embedded[collection_key]`
/// and the next page is resolved from `_links.next.href`; a missing next
/// link ends the walk normally.
pub struct Paginator<'a> {
    client: &'a OsdiClient,
    collection_key: &'static str,
    query: &'static [(&'static str, &'static str)],
    next_url: Option<String>,
    page_delay: Duration,
    max_pages: Option<u32>,
    pages_fetched: u32,
    finished: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a OsdiClient, start_url: String, collection_key: &'static str) -> Self {
        Paginator {
            client,
            collection_key,
            query: &[],
            next_url: Some(start_url),
            page_delay: Duration::ZERO,
            max_pages: None,
            pages_fetched: 0,
            finished: false,
        }
    }

    /// Fixed query parameters applied to every page fetch, e.g. an OSDI
    /// `expand` parameter.
    pub fn with_query(mut self, query: &'static [(&'static str, &'static str)]) -> Self {
        self.query = query;
        self
    }

    /// Pause inserted before every page fetch after the first, to bound the
    /// outbound request rate against the upstream limiter.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Stop after this many pages even if a next link remains.
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Items of the next page, or `None` once the collection is exhausted.
    /// A page whose body lacks the collection key yields an empty item list
    /// but does not end the walk. After an `Err` the walk is over and all
    /// further calls return `None`.
    pub async fn next_page(&mut self) -> Option<Result<Vec<Value>, FetchError>> {
        if self.finished {
            return None;
        }
        if let Some(limit) = self.max_pages
            && self.pages_fetched >= limit
        {
            debug!(limit, "page ceiling reached, stopping pagination");
            self.finished = true;
            return None;
        }

        let url = self.next_url.take()?;
        if self.pages_fetched > 0 && !self.page_delay.is_zero() {
            sleep(self.page_delay).await;
        }

        let body = match self.client.get(&url, self.query).await {
            Ok(body) => body,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };
        self.pages_fetched += 1;

        self.next_url = body
            .pointer("/_links/next/href")
            .and_then(Value::as_str)
            .map(String::from);
        if self.next_url.is_none() {
            self.finished = true;
        }

        let items = body
            .pointer(&format!("/_embedded/{}", self.collection_key))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Some(Ok(items))
    }

    /// Accumulate every remaining page. A failed page stops the walk and is
    /// reported through the `partial` flag rather than discarding what was
    /// already collected.
    pub async fn collect(mut self) -> PageWalk {
        let mut walk = PageWalk::default();
        while let Some(page) = self.next_page().await {
            match page {
                Ok(items) => walk.items.extend(items),
                Err(err) => {
                    warn!(error = %err, "pagination stopped early");
                    walk.partial = true;
                }
            }
        }
        walk
    }
}
