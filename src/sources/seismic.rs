use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::upsert_in_batches;
use crate::errors::{SourceError, TaskError};
use crate::models::{HazardCandidate, HazardType};
use crate::orchestrator::Task;
use crate::store::HazardStore;

pub const SOURCE: &str = "usgs";

#[derive(Debug, Deserialize)]
pub struct QuakeFeed {
    #[serde(default)]
    pub features: Vec<QuakeFeature>,
}

#[derive(Debug, Deserialize)]
pub struct QuakeFeature {
    pub id: String,
    #[serde(default)]
    pub properties: QuakeProperties,
    pub geometry: Option<PointGeometry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuakeProperties {
    pub mag: Option<f64>,
    pub place: Option<String>,
    /// Epoch milliseconds.
    pub time: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PointGeometry {
    /// `[lon, lat, depth_km]`
    pub coordinates: Vec<f64>,
}

/// Earthquake feed (GeoJSON summary feed).
pub struct SeismicSource {
    store: Arc<dyn HazardStore>,
    client: reqwest::Client,
    feed_url: String,
}

impl SeismicSource {
    pub fn new(store: Arc<dyn HazardStore>, client: reqwest::Client, feed_url: impl Into<String>) -> Self {
        Self {
            store,
            client,
            feed_url: feed_url.into(),
        }
    }

    async fn fetch(&self) -> Result<QuakeFeed, SourceError> {
        let body = self
            .client
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn ingest(&self, feed: QuakeFeed) -> Result<usize, SourceError> {
        let candidates = normalize(feed, Utc::now());
        let written = upsert_in_batches(self.store.as_ref(), SOURCE, &candidates).await?;
        info!("Seismic ingest upserted {} hazards", written);
        Ok(written)
    }
}

#[async_trait]
impl Task for SeismicSource {
    async fn run(&self) -> Result<usize, TaskError> {
        let feed = self.fetch().await?;
        Ok(self.ingest(feed).await?)
    }
}

pub fn magnitude_severity(magnitude: Option<f64>) -> f64 {
    magnitude.map(|m| (m / 10.0).clamp(0.0, 1.0)).unwrap_or(0.0)
}

pub fn normalize(feed: QuakeFeed, now: DateTime<Utc>) -> Vec<HazardCandidate> {
    feed.features
        .into_iter()
        .filter_map(|feature| {
            let coords = match feature.geometry {
                Some(ref g) if g.coordinates.len() >= 2 => g.coordinates.clone(),
                _ => {
                    debug!("Skipping earthquake {} without coordinates", feature.id);
                    return None;
                }
            };
            let props = feature.properties;
            let occurred_at = props
                .time
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or(now);

            let mut attributes = Map::new();
            if let Some(title) = props.title {
                attributes.insert("title".to_string(), Value::String(title));
            }
            if let Some(place) = props.place {
                attributes.insert("description".to_string(), Value::String(place));
            }
            if let Some(mag) = props.mag {
                attributes.insert("magnitude".to_string(), json!(mag));
            }
            if let Some(depth) = coords.get(2) {
                attributes.insert("depth_km".to_string(), json!(depth));
            }
            if let Some(url) = props.url {
                attributes.insert("url".to_string(), Value::String(url));
            }

            Some(HazardCandidate {
                hazard_type: HazardType::Earthquake,
                severity: magnitude_severity(props.mag),
                occurred_at,
                lat: coords[1],
                lon: coords[0],
                source: SOURCE.to_string(),
                source_event_id: feature.id,
                attributes,
            })
        })
        .collect()
}
