use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardType {
    Earthquake,
    Wildfire,
    Flood,
    Tsunami,
}

impl HazardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardType::Earthquake => "earthquake",
            HazardType::Wildfire => "wildfire",
            HazardType::Flood => "flood",
            HazardType::Tsunami => "tsunami",
        }
    }

    /// Capitalised form used in rendered messages.
    pub fn label(&self) -> &'static str {
        match self {
            HazardType::Earthquake => "Earthquake",
            HazardType::Wildfire => "Wildfire",
            HazardType::Flood => "Flood",
            HazardType::Tsunami => "Tsunami",
        }
    }
}

impl fmt::Display for HazardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HazardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earthquake" => Ok(HazardType::Earthquake),
            "wildfire" => Ok(HazardType::Wildfire),
            "flood" => Ok(HazardType::Flood),
            "tsunami" => Ok(HazardType::Tsunami),
            other => Err(format!("unknown hazard type: {}", other)),
        }
    }
}

/// A normalized record produced by a source adapter, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardCandidate {
    pub hazard_type: HazardType,
    pub severity: f64,
    pub occurred_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub source: String,
    pub source_event_id: String,
    pub attributes: Map<String, Value>,
}

/// A stored hazard row. `id` and `created_at` never change after the first insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub id: i64,
    pub hazard_type: HazardType,
    pub severity: f64,
    pub occurred_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub source: String,
    pub source_event_id: String,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Hazard {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn title(&self) -> Option<&str> {
        self.attributes
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
    }

    pub fn magnitude(&self) -> Option<f64> {
        self.attributes.get("magnitude").and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}
