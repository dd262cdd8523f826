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

pub const SOURCE: &str = "nifc";
pub const MAX_RECORDS: usize = 500;

const OUT_FIELDS: &str = "OBJECTID,UniqueFireIdentifier,IncidentName,IncidentSize,FireDiscoveryDateTime,POOState,FireCause,PercentContained";

#[derive(Debug, Deserialize)]
pub struct FeatureQueryResponse {
    #[serde(default)]
    pub features: Vec<FireFeature>,
    pub error: Option<ArcGisError>,
}

#[derive(Debug, Deserialize)]
pub struct ArcGisError {
    pub code: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FireFeature {
    pub attributes: FireAttributes,
    pub geometry: Option<FireGeometry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FireAttributes {
    #[serde(rename = "OBJECTID")]
    pub object_id: Option<i64>,
    pub unique_fire_identifier: Option<String>,
    pub incident_name: Option<String>,
    pub incident_size: Option<f64>,
    /// Epoch milliseconds.
    pub fire_discovery_date_time: Option<i64>,
    #[serde(rename = "POOState")]
    pub poo_state: Option<String>,
    pub fire_cause: Option<String>,
    pub percent_contained: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FireGeometry {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Wildfire incident locations from an ArcGIS feature service.
pub struct WildfireSource {
    store: Arc<dyn HazardStore>,
    client: reqwest::Client,
    query_url: String,
}

impl WildfireSource {
    pub fn new(store: Arc<dyn HazardStore>, client: reqwest::Client, query_url: impl Into<String>) -> Self {
        Self {
            store,
            client,
            query_url: query_url.into(),
        }
    }

    async fn fetch(&self) -> Result<FeatureQueryResponse, SourceError> {
        let record_count = MAX_RECORDS.to_string();
        let body = self
            .client
            .get(&self.query_url)
            .query(&[
                ("where", "1=1"),
                ("outFields", OUT_FIELDS),
                ("orderByFields", "FireDiscoveryDateTime DESC"),
                ("resultRecordCount", record_count.as_str()),
                ("outSR", "4326"),
                ("f", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn ingest(&self, response: FeatureQueryResponse) -> Result<usize, SourceError> {
        if let Some(err) = response.error {
            return Err(SourceError::Provider(format!(
                "{} ({})",
                err.message.unwrap_or_default(),
                err.code.unwrap_or_default()
            )));
        }
        let candidates = normalize(response.features, Utc::now());
        let written = upsert_in_batches(self.store.as_ref(), SOURCE, &candidates).await?;
        info!("Wildfire ingest upserted {} hazards", written);
        Ok(written)
    }
}

#[async_trait]
impl Task for WildfireSource {
    async fn run(&self) -> Result<usize, TaskError> {
        let response = self.fetch().await?;
        Ok(self.ingest(response).await?)
    }
}

pub fn acres_severity(acres: f64) -> f64 {
    if acres <= 1000.0 {
        0.3
    } else if acres <= 10000.0 {
        0.6
    } else {
        0.9
    }
}

pub fn normalize(features: Vec<FireFeature>, now: DateTime<Utc>) -> Vec<HazardCandidate> {
    features
        .into_iter()
        .take(MAX_RECORDS)
        .filter_map(|feature| {
            let attrs = feature.attributes;
            let (lon, lat) = match feature.geometry {
                Some(FireGeometry {
                    x: Some(x),
                    y: Some(y),
                }) => (x, y),
                _ => {
                    debug!("Skipping wildfire {:?} without geometry", attrs.object_id);
                    return None;
                }
            };

            let source_event_id = match (&attrs.unique_fire_identifier, attrs.object_id) {
                (Some(uid), _) if !uid.trim().is_empty() => uid.clone(),
                (_, Some(object_id)) => format!("nifc:{}", object_id),
                _ => {
                    debug!("Skipping wildfire without any identifier");
                    return None;
                }
            };

            let acres = attrs.incident_size.unwrap_or(0.0);
            let occurred_at = attrs
                .fire_discovery_date_time
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or(now);

            let mut attributes = Map::new();
            if let Some(name) = attrs.incident_name {
                attributes.insert("title".to_string(), Value::String(name));
            }
            attributes.insert("acres".to_string(), json!(acres));
            if let Some(state) = attrs.poo_state {
                attributes.insert("state".to_string(), Value::String(state));
            }
            if let Some(cause) = attrs.fire_cause {
                attributes.insert("cause".to_string(), Value::String(cause));
            }
            if let Some(contained) = attrs.percent_contained {
                attributes.insert("percent_contained".to_string(), json!(contained));
            }

            Some(HazardCandidate {
                hazard_type: HazardType::Wildfire,
                severity: acres_severity(acres),
                occurred_at,
                lat,
                lon,
                source: SOURCE.to_string(),
                source_event_id,
                attributes,
            })
        })
        .collect()
}
