use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::bulletin::{parse_entries, BulletinEntry};
use super::upsert_in_batches;
use crate::errors::{SourceError, TaskError};
use crate::models::{HazardCandidate, HazardType};
use crate::orchestrator::Task;
use crate::store::HazardStore;

pub const SOURCE: &str = "ntwc";

/// Keyword → severity, checked in order against the lowercased title.
const TITLE_SEVERITY: [(&str, f64); 4] = [
    ("warning", 0.9),
    ("advisory", 0.6),
    ("watch", 0.4),
    ("information", 0.2),
];
const DEFAULT_SEVERITY: f64 = 0.3;

/// Tsunami bulletins from one or more Atom feeds.
pub struct TsunamiSource {
    store: Arc<dyn HazardStore>,
    client: reqwest::Client,
    feed_urls: Vec<String>,
}

impl TsunamiSource {
    pub fn new(store: Arc<dyn HazardStore>, client: reqwest::Client, feed_urls: Vec<String>) -> Self {
        Self {
            store,
            client,
            feed_urls,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    pub async fn ingest(&self, xml: &str) -> Result<usize, SourceError> {
        let entries = parse_entries(xml)?;
        let candidates = normalize(entries, Utc::now());
        upsert_in_batches(self.store.as_ref(), SOURCE, &candidates).await
    }
}

#[async_trait]
impl Task for TsunamiSource {
    /// Each feed is independent: one failing feed is logged and the others
    /// still ingest. The run fails only if every feed failed.
    async fn run(&self) -> Result<usize, TaskError> {
        let mut written = 0;
        let mut last_error = None;
        let mut succeeded = 0;

        for url in &self.feed_urls {
            let result = match self.fetch(url).await {
                Ok(xml) => self.ingest(&xml).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(count) => {
                    succeeded += 1;
                    written += count;
                }
                Err(e) => {
                    error!("Tsunami feed {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e.into()),
            _ => {
                info!("Tsunami ingest upserted {} hazards", written);
                Ok(written)
            }
        }
    }
}

pub fn title_severity(title: &str) -> f64 {
    let lowered = title.to_lowercase();
    TITLE_SEVERITY
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, severity)| *severity)
        .unwrap_or(DEFAULT_SEVERITY)
}

pub fn normalize(entries: Vec<BulletinEntry>, now: DateTime<Utc>) -> Vec<HazardCandidate> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let Some(point) = entry.point else {
                debug!("Dropping tsunami bulletin {:?} without a point", entry.title);
                return None;
            };
            let title = entry.title.unwrap_or_default();
            let occurred_at = entry
                .updated
                .as_deref()
                .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(now);
            let source_event_id = entry.id.unwrap_or_else(|| {
                format!("{}@{}", title, entry.updated.as_deref().unwrap_or_default())
            });

            let mut attributes = Map::new();
            if !title.is_empty() {
                attributes.insert("title".to_string(), Value::String(title.clone()));
            }
            if let Some(summary) = entry.summary {
                attributes.insert("description".to_string(), Value::String(summary));
            }
            if let Some(updated) = entry.updated {
                attributes.insert("updated".to_string(), Value::String(updated));
            }

            Some(HazardCandidate {
                hazard_type: HazardType::Tsunami,
                severity: title_severity(&title),
                occurred_at,
                lat: point.lat,
                lon: point.lon,
                source: SOURCE.to_string(),
                source_event_id,
                attributes,
            })
        })
        .collect()
}
