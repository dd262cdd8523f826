//! River-flood risk from a daily discharge forecast.
//!
//! Coordinates are snapped to two decimals (~1.1 km cells) before querying
//! and keying, so nearby lookups share a hazard row. Lookups may run from the
//! scheduled job and from user requests at the same time; the store upsert
//! keeps that safe without any locking here.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::UPSERT_BATCH_SIZE;
use crate::errors::{SourceError, TaskError};
use crate::geo::GeoPoint;
use crate::models::{HazardCandidate, HazardType, UpsertOutcome};
use crate::orchestrator::Task;
use crate::store::{HazardStore, UserDirectory};

pub const SOURCE: &str = "open-meteo";
const KEY_PREFIX: &str = "OPENMETEO";
pub const FORECAST_DAYS: usize = 3;

const HIGH_RATIO: f64 = 5.0;
const MODERATE_RATIO: f64 = 2.5;
const MEDIAN_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FloodRisk {
    Low,
    Moderate,
    High,
}

impl FloodRisk {
    pub fn classify(discharge: f64, median: f64) -> (f64, FloodRisk) {
        let ratio = discharge / median.max(MEDIAN_FLOOR);
        let risk = if ratio > HIGH_RATIO {
            FloodRisk::High
        } else if ratio > MODERATE_RATIO {
            FloodRisk::Moderate
        } else {
            FloodRisk::Low
        };
        (ratio, risk)
    }

    pub fn severity(&self) -> f64 {
        match self {
            FloodRisk::High => 0.8,
            FloodRisk::Moderate => 0.5,
            FloodRisk::Low => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FloodRisk::High => "high",
            FloodRisk::Moderate => "moderate",
            FloodRisk::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloodForecast {
    pub daily: DailySeries,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub river_discharge: Vec<Option<f64>>,
    #[serde(default)]
    pub river_discharge_median: Vec<Option<f64>>,
    #[serde(default)]
    pub river_discharge_max: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodDay {
    pub date: String,
    pub discharge: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
    pub ratio: f64,
    pub risk: FloodRisk,
}

/// Result of one lookup, returned to the caller of the user-facing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodRiskReport {
    pub point: GeoPoint,
    pub days: Vec<FloodDay>,
    pub hazard: Option<UpsertOutcome>,
}

impl FloodRiskReport {
    pub fn first_day_risk(&self) -> Option<FloodRisk> {
        self.days.first().map(|d| d.risk)
    }
}

pub fn assess(series: &DailySeries) -> Vec<FloodDay> {
    series
        .time
        .iter()
        .take(FORECAST_DAYS)
        .enumerate()
        .map(|(i, date)| {
            let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            let discharge = at(&series.river_discharge);
            let median = at(&series.river_discharge_median);
            // A day without both readings carries no evidence of a flood.
            let (ratio, risk) = match (discharge, median) {
                (Some(discharge), Some(median)) => FloodRisk::classify(discharge, median),
                _ => (0.0, FloodRisk::Low),
            };
            FloodDay {
                date: date.clone(),
                discharge,
                median,
                max: at(&series.river_discharge_max),
                ratio,
                risk,
            }
        })
        .collect()
}

pub fn event_key(point: &GeoPoint, date: &str) -> String {
    format!("{}_{:.2}_{:.2}_{}", KEY_PREFIX, point.lat, point.lon, date)
}

/// Only a `high` first forecast day produces a hazard.
pub fn hazard_for(point: &GeoPoint, days: &[FloodDay]) -> Option<HazardCandidate> {
    let today = days.first().filter(|d| d.risk == FloodRisk::High)?;
    let (discharge, median) = (today.discharge?, today.median?);

    let mut attributes = Map::new();
    attributes.insert("title".to_string(), Value::String("River flood risk".to_string()));
    attributes.insert(
        "description".to_string(),
        Value::String(format!(
            "River discharge {:.1} m3/s is {:.1}x the seasonal median",
            discharge, today.ratio
        )),
    );
    attributes.insert("risk".to_string(), Value::String(today.risk.as_str().to_string()));
    attributes.insert("discharge".to_string(), json!(discharge));
    attributes.insert("median".to_string(), json!(median));
    attributes.insert("ratio".to_string(), json!(today.ratio));
    if let Some(max) = today.max {
        attributes.insert("max".to_string(), json!(max));
    }
    attributes.insert("forecast_date".to_string(), Value::String(today.date.clone()));

    Some(HazardCandidate {
        hazard_type: HazardType::Flood,
        severity: today.risk.severity(),
        occurred_at: Utc::now(),
        lat: point.lat,
        lon: point.lon,
        source: SOURCE.to_string(),
        source_event_id: event_key(point, &today.date),
        attributes,
    })
}

pub struct FloodSource {
    store: Arc<dyn HazardStore>,
    users: Arc<dyn UserDirectory>,
    client: reqwest::Client,
    api_url: String,
    watch_points: Vec<GeoPoint>,
}

impl FloodSource {
    pub fn new(
        store: Arc<dyn HazardStore>,
        users: Arc<dyn UserDirectory>,
        client: reqwest::Client,
        api_url: impl Into<String>,
        watch_points: Vec<GeoPoint>,
    ) -> Self {
        Self {
            store,
            users,
            client,
            api_url: api_url.into(),
            watch_points,
        }
    }

    async fn fetch(&self, point: &GeoPoint) -> Result<FloodForecast, SourceError> {
        let days = FORECAST_DAYS.to_string();
        let lat = format!("{:.2}", point.lat);
        let lon = format!("{:.2}", point.lon);
        let body = self
            .client
            .get(&self.api_url)
            .query(&[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("daily", "river_discharge,river_discharge_median,river_discharge_max"),
                ("forecast_days", days.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetches and classifies the forecast for a point, writing a hazard when
    /// the first day is `high`.
    pub async fn lookup(&self, point: GeoPoint) -> Result<FloodRiskReport, SourceError> {
        let point = point.rounded();
        let forecast = self.fetch(&point).await?;
        self.evaluate(point, &forecast).await
    }

    pub async fn evaluate(
        &self,
        point: GeoPoint,
        forecast: &FloodForecast,
    ) -> Result<FloodRiskReport, SourceError> {
        let point = point.rounded();
        let days = assess(&forecast.daily);
        let hazard = match hazard_for(&point, &days) {
            Some(candidate) => Some(self.store.upsert_hazard(&candidate).await?),
            None => None,
        };
        Ok(FloodRiskReport {
            point,
            days,
            hazard,
        })
    }

    /// Configured watch points plus users' live positions, deduplicated on
    /// the rounded grid.
    async fn scan_points(&self) -> Vec<GeoPoint> {
        let mut points: Vec<GeoPoint> = self.watch_points.iter().map(GeoPoint::rounded).collect();
        match self.users.live_positions().await {
            Ok(positions) => points.extend(positions.iter().map(|p| p.point().rounded())),
            Err(e) => warn!("Could not load live positions for flood scan: {}", e),
        }

        let mut unique: Vec<GeoPoint> = Vec::with_capacity(points.len());
        for p in points {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        unique
    }
}

#[async_trait]
impl Task for FloodSource {
    async fn run(&self) -> Result<usize, TaskError> {
        let points = self.scan_points().await;
        let mut written = 0;
        let mut failures = 0;
        let mut last_error = None;

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let results = join_all(batch.iter().map(|p| self.lookup(*p))).await;
            for (point, result) in batch.iter().zip(results) {
                match result {
                    Ok(report) => {
                        if report.hazard.is_some() {
                            written += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Flood lookup failed for {:.2},{:.2}: {}", point.lat, point.lon, e);
                        failures += 1;
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if failures == points.len() => Err(e.into()),
            _ => {
                info!(
                    "Flood scan checked {} points, {} hazards written",
                    points.len(),
                    written
                );
                Ok(written)
            }
        }
    }
}
