//! In-memory store with the same upsert and conflict semantics as Postgres.
//!
//! Used by tests and for running the pipeline without a database.
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AlertStore, HazardStore, UserDirectory};
use crate::errors::StoreError;
use crate::geo::GeoPoint;
use crate::models::{
    Alert, FamilyContact, Hazard, HazardCandidate, LivePosition, NewAlert, PoiKind,
    PointOfInterest, UpsertOutcome,
};

#[derive(Debug, Clone)]
struct UserRecord {
    id: Uuid,
    display_name: String,
    push_token: Option<String>,
    live_position: Option<GeoPoint>,
}

#[derive(Default)]
struct Inner {
    next_hazard_id: i64,
    hazards: Vec<Hazard>,
    alerts: Vec<Alert>,
    users: Vec<UserRecord>,
    saved_places: Vec<(Uuid, GeoPoint)>,
    families: Vec<Vec<Uuid>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, display_name: &str, push_token: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().users.push(UserRecord {
            id,
            display_name: display_name.to_string(),
            push_token: push_token.map(str::to_string),
            live_position: None,
        });
        id
    }

    pub fn set_live_position(&self, user_id: Uuid, lat: f64, lon: f64) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) {
            user.live_position = Some(GeoPoint::new(lat, lon));
        }
    }

    pub fn add_saved_place(&self, user_id: Uuid, lat: f64, lon: f64) {
        self.lock().saved_places.push((user_id, GeoPoint::new(lat, lon)));
    }

    pub fn add_family(&self, members: &[Uuid]) {
        self.lock().families.push(members.to_vec());
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        self.lock().hazards.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    /// Moves a hazard's first-insert time, e.g. to age it out of a scan window.
    pub fn set_hazard_created_at(&self, hazard_id: i64, created_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(hazard) = inner.hazards.iter_mut().find(|h| h.id == hazard_id) {
            hazard.created_at = created_at;
        }
    }

    pub fn set_alert_created_at(&self, user_id: Uuid, hazard_id: i64, created_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(alert) = inner
            .alerts
            .iter_mut()
            .find(|a| a.user_id == user_id && a.hazard_id == hazard_id)
        {
            alert.created_at = created_at;
        }
    }
}

fn newest_first(mut hazards: Vec<Hazard>, key: fn(&Hazard) -> DateTime<Utc>) -> Vec<Hazard> {
    hazards.sort_by_key(|h| std::cmp::Reverse(key(h)));
    hazards
}

#[async_trait]
impl HazardStore for MemoryStore {
    async fn upsert_hazard(&self, candidate: &HazardCandidate) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.hazards.iter_mut().find(|h| {
            h.source == candidate.source && h.source_event_id == candidate.source_event_id
        }) {
            existing.severity = candidate.severity;
            existing.occurred_at = candidate.occurred_at;
            existing.lat = candidate.lat;
            existing.lon = candidate.lon;
            existing.attributes = candidate.attributes.clone();
            return Ok(UpsertOutcome::Updated(existing.id));
        }

        inner.next_hazard_id += 1;
        let id = inner.next_hazard_id;
        inner.hazards.push(Hazard {
            id,
            hazard_type: candidate.hazard_type,
            severity: candidate.severity,
            occurred_at: candidate.occurred_at,
            lat: candidate.lat,
            lon: candidate.lon,
            source: candidate.source.clone(),
            source_event_id: candidate.source_event_id.clone(),
            attributes: candidate.attributes.clone(),
            created_at: Utc::now(),
        });
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn hazards_occurred_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError> {
        let hazards = self
            .lock()
            .hazards
            .iter()
            .filter(|h| h.occurred_at >= cutoff)
            .cloned()
            .collect();
        Ok(newest_first(hazards, |h| h.occurred_at))
    }

    async fn hazards_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError> {
        let hazards = self
            .lock()
            .hazards
            .iter()
            .filter(|h| h.created_at >= cutoff)
            .cloned()
            .collect();
        Ok(newest_first(hazards, |h| h.created_at))
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, alert: &NewAlert) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner
            .alerts
            .iter()
            .any(|a| a.user_id == alert.user_id && a.hazard_id == alert.hazard_id)
        {
            return Ok(false);
        }
        inner.alerts.push(Alert {
            user_id: alert.user_id,
            hazard_id: alert.hazard_id,
            message: alert.message.clone(),
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.alerts.len();
        inner.alerts.retain(|a| a.created_at >= cutoff);
        Ok((before - inner.alerts.len()) as u64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn points_of_interest(&self) -> Result<Vec<PointOfInterest>, StoreError> {
        let inner = self.lock();
        let saved = inner.saved_places.iter().map(|(user_id, p)| PointOfInterest {
            user_id: *user_id,
            kind: PoiKind::SavedPlace,
            lat: p.lat,
            lon: p.lon,
        });
        let live = inner.users.iter().filter_map(|u| {
            u.live_position.map(|p| PointOfInterest {
                user_id: u.id,
                kind: PoiKind::LivePosition,
                lat: p.lat,
                lon: p.lon,
            })
        });
        Ok(saved.chain(live).collect())
    }

    async fn live_positions(&self) -> Result<Vec<LivePosition>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter_map(|u| {
                u.live_position.map(|p| LivePosition {
                    user_id: u.id,
                    display_name: u.display_name.clone(),
                    lat: p.lat,
                    lon: p.lon,
                    push_token: u.push_token.clone(),
                })
            })
            .collect())
    }

    async fn family_contacts(&self, user_id: Uuid) -> Result<Vec<FamilyContact>, StoreError> {
        let inner = self.lock();
        let member_ids: Vec<Uuid> = inner
            .families
            .iter()
            .filter(|family| family.contains(&user_id))
            .flatten()
            .copied()
            .filter(|id| *id != user_id)
            .collect();

        Ok(inner
            .users
            .iter()
            .filter(|u| member_ids.contains(&u.id))
            .map(|u| FamilyContact {
                user_id: u.id,
                display_name: u.display_name.clone(),
                push_token: u.push_token.clone(),
            })
            .collect())
    }
}
