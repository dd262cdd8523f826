//! PostgreSQL implementation of the store interfaces.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use super::{AlertStore, HazardStore, UserDirectory};
use crate::db::{queries, DbPool};
use crate::errors::StoreError;
use crate::models::{
    FamilyContact, Hazard, HazardCandidate, LivePosition, NewAlert, PoiKind, PointOfInterest,
    UpsertOutcome,
};

#[derive(Debug, FromRow)]
struct HazardRow {
    id: i64,
    hazard_type: String,
    severity: f64,
    occurred_at: DateTime<Utc>,
    lat: f64,
    lon: f64,
    source: String,
    source_event_id: String,
    attributes: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HazardRow> for Hazard {
    type Error = StoreError;

    fn try_from(row: HazardRow) -> Result<Self, Self::Error> {
        let hazard_type = row
            .hazard_type
            .parse()
            .map_err(|_| StoreError::InvalidHazardType(row.hazard_type.clone()))?;
        Ok(Hazard {
            id: row.id,
            hazard_type,
            severity: row.severity,
            occurred_at: row.occurred_at,
            lat: row.lat,
            lon: row.lon,
            source: row.source,
            source_event_id: row.source_event_id,
            attributes: row.attributes.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ContactRow {
    user_id: Uuid,
    display_name: String,
    push_token: Option<String>,
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_hazards(
        &self,
        query: &'static str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Hazard>, StoreError> {
        let rows = sqlx::query_as::<_, HazardRow>(query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Hazard::try_from).collect()
    }
}

#[async_trait]
impl HazardStore for PgStore {
    async fn upsert_hazard(&self, candidate: &HazardCandidate) -> Result<UpsertOutcome, StoreError> {
        let row = sqlx::query(queries::UPSERT_HAZARD)
            .bind(candidate.hazard_type.as_str())
            .bind(candidate.severity)
            .bind(candidate.occurred_at)
            .bind(candidate.lat)
            .bind(candidate.lon)
            .bind(&candidate.source)
            .bind(&candidate.source_event_id)
            .bind(Json(&candidate.attributes))
            .fetch_one(&self.pool)
            .await?;

        let id: i64 = row.try_get("id")?;
        let inserted: bool = row.try_get("inserted")?;
        Ok(if inserted {
            UpsertOutcome::Inserted(id)
        } else {
            UpsertOutcome::Updated(id)
        })
    }

    async fn hazards_occurred_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError> {
        self.fetch_hazards(queries::SELECT_HAZARDS_OCCURRED_SINCE, cutoff)
            .await
    }

    async fn hazards_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError> {
        self.fetch_hazards(queries::SELECT_HAZARDS_CREATED_SINCE, cutoff)
            .await
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::INSERT_ALERT)
            .bind(alert.user_id)
            .bind(alert.hazard_id)
            .bind(&alert.message)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::DELETE_ALERTS_BEFORE)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn points_of_interest(&self) -> Result<Vec<PointOfInterest>, StoreError> {
        let rows = sqlx::query(queries::SELECT_POINTS_OF_INTEREST)
            .fetch_all(&self.pool)
            .await?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind")?;
            points.push(PointOfInterest {
                user_id: row.try_get("user_id")?,
                kind: if kind == "live_position" {
                    PoiKind::LivePosition
                } else {
                    PoiKind::SavedPlace
                },
                lat: row.try_get("lat")?,
                lon: row.try_get("lon")?,
            });
        }
        Ok(points)
    }

    async fn live_positions(&self) -> Result<Vec<LivePosition>, StoreError> {
        let rows = sqlx::query(queries::SELECT_LIVE_POSITIONS)
            .fetch_all(&self.pool)
            .await?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            positions.push(LivePosition {
                user_id: row.try_get("user_id")?,
                display_name: row.try_get("display_name")?,
                lat: row.try_get("lat")?,
                lon: row.try_get("lon")?,
                push_token: row.try_get("push_token")?,
            });
        }
        Ok(positions)
    }

    async fn family_contacts(&self, user_id: Uuid) -> Result<Vec<FamilyContact>, StoreError> {
        let rows = sqlx::query_as::<_, ContactRow>(queries::SELECT_FAMILY_CONTACTS)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| FamilyContact {
                user_id: row.user_id,
                display_name: row.display_name,
                push_token: row.push_token,
            })
            .collect())
    }
}
