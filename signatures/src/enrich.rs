use crate::client::OsdiClient;
use crate::counter;
use crate::metrics_defs::SUBMISSIONS_SKIPPED;
use crate::pages::Paginator;
use crate::types::{MergedRecord, Person, SubmissionSummary, Tagging};
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves a raw submission summary into a [`MergedRecord`]: the owning
/// person, the person's tags, and the submission's custom fields overlaid
/// on top of the person's.
pub struct Enricher<'a> {
    client: &'a OsdiClient,
    page_delay: Duration,
}

impl<'a> Enricher<'a> {
    pub fn new(client: &'a OsdiClient) -> Self {
        Enricher {
            client,
            page_delay: Duration::ZERO,
        }
    }

    /// Politeness delay applied when a taggings sub-resource has to be
    /// walked page by page.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Resolve one submission, or `None` when it cannot be attributed to a
    /// person. A skip is logged and counted but never fails the batch.
    pub async fn enrich(&self, summary: &Value) -> Option<MergedRecord> {
        let summary: SubmissionSummary = match serde_json::from_value(summary.clone()) {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "skipping malformed submission summary");
                counter!(SUBMISSIONS_SKIPPED).increment(1);
                return None;
            }
        };

        let person = self.resolve_person(&summary).await?;
        let submission_fields = self.submission_fields(&summary).await;
        let tags = self.resolve_tags(&person).await;

        Some(merge_record(person, submission_fields, tags))
    }

    /// The submission's own custom fields. Summaries normally carry them
    /// inline; when they don't, the full record behind the self link is
    /// fetched once.
    async fn submission_fields(&self, summary: &SubmissionSummary) -> IndexMap<String, Value> {
        if !summary.custom_fields.is_empty() {
            return summary.custom_fields.clone();
        }
        let Some(link) = &summary.links.own else {
            return IndexMap::new();
        };

        match self.client.get(&link.href, &[]).await {
            Ok(body) => match serde_json::from_value::<SubmissionSummary>(body) {
                Ok(detail) => detail.custom_fields,
                Err(err) => {
                    debug!(error = %err, url = %link.href, "submission detail is malformed");
                    IndexMap::new()
                }
            },
            Err(err) => {
                debug!(error = %err, url = %link.href, "could not fetch submission detail");
                IndexMap::new()
            }
        }
    }

    /// The person behind the submission. The embedded copy (from an
    /// `expand=person` collection fetch) is preferred since it costs no
    /// extra request; otherwise the person link is followed.
    async fn resolve_person(&self, summary: &SubmissionSummary) -> Option<Person> {
        if let Some(person) = &summary.embedded.person {
            return Some(person.clone());
        }

        let Some(link) = &summary.links.person else {
            debug!("submission has no person link, skipping");
            counter!(SUBMISSIONS_SKIPPED).increment(1);
            return None;
        };

        match self.client.get(&link.href, &[]).await {
            Ok(body) => match serde_json::from_value::<Person>(body) {
                Ok(person) => Some(person),
                Err(err) => {
                    warn!(error = %err, url = %link.href, "person record is malformed, skipping");
                    counter!(SUBMISSIONS_SKIPPED).increment(1);
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, url = %link.href, "person fetch failed, skipping submission");
                counter!(SUBMISSIONS_SKIPPED).increment(1);
                None
            }
        }
    }

    /// Tag names for a person: the embedded list when present, otherwise a
    /// walk of the taggings sub-resource. A tagging without an embedded tag
    /// contributes nothing; tag resolution never fails the person.
    async fn resolve_tags(&self, person: &Person) -> Vec<String> {
        if let Some(tags) = &person.tags {
            return tags.clone();
        }
        let Some(link) = &person.links.taggings else {
            return Vec::new();
        };

        let walk = Paginator::new(self.client, link.href.clone(), "osdi:taggings")
            .with_page_delay(self.page_delay)
            .collect()
            .await;
        if walk.partial {
            debug!(url = %link.href, "taggings walk ended early, keeping tags resolved so far");
        }

        walk.items
            .iter()
            .filter_map(|item| {
                serde_json::from_value::<Tagging>(item.clone())
                    .ok()
                    .and_then(|tagging| tagging.embedded.tag)
                    .map(|tag| tag.name)
            })
            .collect()
    }
}

/// Overlay the submission's custom fields onto the person's (submission
/// values win on key collision) and attach the resolved tags. Pure; calling
/// it twice with the same inputs yields the same record.
pub fn merge_record(
    person: Person,
    submission_fields: IndexMap<String, Value>,
    tags: Vec<String>,
) -> MergedRecord {
    let mut custom_fields = person.custom_fields;
    custom_fields.extend(submission_fields);

    MergedRecord {
        given_name: person.given_name,
        family_name: person.family_name,
        email_addresses: person.email_addresses,
        postal_addresses: person.postal_addresses,
        custom_fields,
        tags,
    }
}
