//! Materializes per-user alerts for recent hazards.
//!
//! Every run scans hazards inside the lookback window, matches them against
//! saved places and live positions, writes at most one alert per
//! `(user, hazard)` and then purges alerts past their TTL.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{StoreError, TaskError};
use crate::models::{Hazard, HazardType, NewAlert, PoiKind, PointOfInterest};
use crate::orchestrator::Task;
use crate::store::{AlertStore, HazardStore, UserDirectory};

pub const ALERT_TTL_HOURS: i64 = 24;
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;
pub const DEFAULT_MATCH_RADIUS_KM: f64 = 500.0;

/// How far from a hazard a user still gets an alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchRadius {
    /// Same radius for every hazard. This is the production behaviour.
    Fixed(f64),
    /// Earthquakes use `base_km + per_magnitude_km * magnitude`; other hazard
    /// types, and quakes without a magnitude, use `base_km`.
    MagnitudeScaled { base_km: f64, per_magnitude_km: f64 },
}

impl MatchRadius {
    pub fn magnitude_scaled() -> Self {
        MatchRadius::MagnitudeScaled {
            base_km: 15.0,
            per_magnitude_km: 10.0,
        }
    }

    pub fn for_hazard(&self, hazard: &Hazard) -> f64 {
        match *self {
            MatchRadius::Fixed(km) => km,
            MatchRadius::MagnitudeScaled {
                base_km,
                per_magnitude_km,
            } => match (hazard.hazard_type, hazard.magnitude()) {
                (HazardType::Earthquake, Some(mag)) => base_km + per_magnitude_km * mag.max(0.0),
                _ => base_km,
            },
        }
    }
}

impl Default for MatchRadius {
    fn default() -> Self {
        MatchRadius::Fixed(DEFAULT_MATCH_RADIUS_KM)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorReport {
    pub hazards_scanned: usize,
    pub alerts_created: usize,
    pub alerts_expired: u64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_km: f64,
    kind: PoiKind,
}

impl Candidate {
    /// Closer wins; on an exact tie the live position wins.
    fn beats(&self, other: &Candidate) -> bool {
        self.distance_km < other.distance_km
            || (self.distance_km == other.distance_km
                && self.kind == PoiKind::LivePosition
                && other.kind != PoiKind::LivePosition)
    }
}

pub struct AlertGenerator {
    hazards: Arc<dyn HazardStore>,
    alerts: Arc<dyn AlertStore>,
    users: Arc<dyn UserDirectory>,
    lookback: Duration,
    radius: MatchRadius,
}

impl AlertGenerator {
    pub fn new(
        hazards: Arc<dyn HazardStore>,
        alerts: Arc<dyn AlertStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            hazards,
            alerts,
            users,
            lookback: Duration::minutes(DEFAULT_LOOKBACK_MINUTES),
            radius: MatchRadius::default(),
        }
    }

    pub fn with_lookback_minutes(mut self, minutes: i64) -> Self {
        self.lookback = Duration::minutes(minutes);
        self
    }

    pub fn with_radius(mut self, radius: MatchRadius) -> Self {
        self.radius = radius;
        self
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<GeneratorReport, StoreError> {
        let hazards = self.hazards.hazards_occurred_since(now - self.lookback).await?;
        let points = self.users.points_of_interest().await?;

        let mut report = GeneratorReport {
            hazards_scanned: hazards.len(),
            ..Default::default()
        };

        for hazard in &hazards {
            let radius_km = self.radius.for_hazard(hazard);
            for (user_id, candidate) in closest_matches(hazard, &points, radius_km) {
                let alert = NewAlert {
                    user_id,
                    hazard_id: hazard.id,
                    message: render_message(hazard, candidate.distance_km),
                };
                match self.alerts.insert_alert(&alert).await {
                    Ok(true) => report.alerts_created += 1,
                    Ok(false) => debug!("Alert for user {} hazard {} already exists", user_id, hazard.id),
                    Err(e) => warn!("Failed to insert alert for user {} hazard {}: {}", user_id, hazard.id, e),
                }
            }
        }

        report.alerts_expired = self
            .alerts
            .delete_alerts_before(now - Duration::hours(ALERT_TTL_HOURS))
            .await?;

        info!(
            "Alert generator scanned {} hazards, created {} alerts, expired {}",
            report.hazards_scanned, report.alerts_created, report.alerts_expired
        );
        Ok(report)
    }
}

#[async_trait]
impl Task for AlertGenerator {
    async fn run(&self) -> Result<usize, TaskError> {
        Ok(self.run_at(Utc::now()).await?.alerts_created)
    }
}

/// One candidate per user within `radius_km` (inclusive).
fn closest_matches(
    hazard: &Hazard,
    points: &[PointOfInterest],
    radius_km: f64,
) -> Vec<(Uuid, Candidate)> {
    let origin = hazard.point();
    let mut best: HashMap<Uuid, Candidate> = HashMap::new();

    for poi in points {
        let distance_km = origin.distance_km(&poi.point());
        if distance_km > radius_km {
            continue;
        }
        let candidate = Candidate {
            distance_km,
            kind: poi.kind,
        };
        best.entry(poi.user_id)
            .and_modify(|current| {
                if candidate.beats(current) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut matches: Vec<_> = best.into_iter().collect();
    matches.sort_by_key(|(user_id, _)| *user_id);
    matches
}

pub fn render_message(hazard: &Hazard, distance_km: f64) -> String {
    let distance = distance_km.round();
    match (hazard.hazard_type, hazard.magnitude()) {
        (HazardType::Earthquake, Some(mag)) => {
            format!("Earthquake M{:.1} detected ~{} km away.", mag, distance)
        }
        (kind, _) => format!(
            "{} alert: {} detected ~{} km away.",
            kind.label(),
            hazard.title().unwrap_or("Emergency"),
            distance
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::lat_offset_km;
    use crate::models::HazardCandidate;
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    fn hazard_candidate(hazard_type: HazardType, attributes: Map<String, serde_json::Value>) -> HazardCandidate {
        HazardCandidate {
            hazard_type,
            severity: 0.6,
            occurred_at: Utc::now() - Duration::minutes(5),
            lat: 40.0,
            lon: -74.0,
            source: "test".to_string(),
            source_event_id: format!("{}-1", hazard_type),
            attributes,
        }
    }

    fn quake_attrs(mag: f64) -> Map<String, serde_json::Value> {
        let mut attrs = Map::new();
        attrs.insert("magnitude".to_string(), json!(mag));
        attrs.insert("title".to_string(), json!("M 5.2 - offshore"));
        attrs
    }

    fn generator(store: &Arc<MemoryStore>) -> AlertGenerator {
        AlertGenerator::new(store.clone(), store.clone(), store.clone())
    }

    fn stored(store: &MemoryStore) -> Hazard {
        store.hazards().remove(0)
    }

    #[tokio::test]
    async fn test_running_twice_keeps_one_alert_per_user_and_hazard() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_hazard(&hazard_candidate(HazardType::Earthquake, quake_attrs(5.24))).await.unwrap();
        let ana = store.add_user("Ana", None);
        store.set_live_position(ana, lat_offset_km(40.0, 12.0), -74.0);
        store.add_saved_place(ana, lat_offset_km(40.0, 30.0), -74.0);

        let gen = generator(&store);
        let first = gen.run_at(Utc::now()).await.unwrap();
        let second = gen.run_at(Utc::now()).await.unwrap();

        assert_eq!(first.alerts_created, 1);
        assert_eq!(second.alerts_created, 0);
        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].user_id, ana);
        assert_eq!(alerts[0].message, "Earthquake M5.2 detected ~12 km away.");
    }

    #[tokio::test]
    async fn test_radius_boundary_is_inclusive() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_hazard(&hazard_candidate(HazardType::Flood, Map::new())).await.unwrap();
        let hazard = stored(&store);

        let inside = store.add_user("Inside", None);
        store.set_live_position(inside, lat_offset_km(40.0, 100.0), -74.0);
        let exact_distance = hazard.point().distance_km(&crate::geo::GeoPoint::new(lat_offset_km(40.0, 100.0), -74.0));

        // Sweeping the radius across the exact distance: at the boundary the
        // user matches, a hair below it they do not.
        let points = store.points_of_interest().await.unwrap();
        assert_eq!(closest_matches(&hazard, &points, exact_distance).len(), 1);
        assert_eq!(closest_matches(&hazard, &points, exact_distance + 1e-9).len(), 1);
        assert!(closest_matches(&hazard, &points, exact_distance - 1e-9).is_empty());

        let gen = generator(&store).with_radius(MatchRadius::Fixed(exact_distance));
        assert_eq!(gen.run_at(Utc::now()).await.unwrap().alerts_created, 1);
    }

    #[tokio::test]
    async fn test_default_radius_is_fixed_500_km() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_hazard(&hazard_candidate(HazardType::Earthquake, quake_attrs(2.0))).await.unwrap();
        let near = store.add_user("Near", None);
        store.set_live_position(near, lat_offset_km(40.0, 499.0), -74.0);
        let far = store.add_user("Far", None);
        store.set_live_position(far, lat_offset_km(40.0, 501.0), -74.0);

        generator(&store).run_at(Utc::now()).await.unwrap();

        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].user_id, near);
    }

    #[test]
    fn test_scaled_radius_grows_with_magnitude() {
        let radius = MatchRadius::magnitude_scaled();
        let now = Utc::now();
        let hazard = Hazard {
            id: 1,
            hazard_type: HazardType::Earthquake,
            severity: 0.6,
            occurred_at: now,
            lat: 0.0,
            lon: 0.0,
            source: "usgs".to_string(),
            source_event_id: "x".to_string(),
            attributes: quake_attrs(6.0),
            created_at: now,
        };
        assert_eq!(radius.for_hazard(&hazard), 75.0);

        let fire = Hazard {
            hazard_type: HazardType::Wildfire,
            attributes: Map::new(),
            ..hazard
        };
        assert_eq!(radius.for_hazard(&fire), 15.0);
        assert_eq!(MatchRadius::default().for_hazard(&fire), 500.0);
    }

    #[tokio::test]
    async fn test_tie_break_prefers_closest_then_live_position() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_hazard(&hazard_candidate(HazardType::Wildfire, Map::new())).await.unwrap();
        let hazard = stored(&store);
        let user = Uuid::new_v4();
        let at = |km: f64, kind| PointOfInterest {
            user_id: user,
            kind,
            lat: lat_offset_km(40.0, km),
            lon: -74.0,
        };

        let closer_place = vec![at(20.0, PoiKind::LivePosition), at(5.0, PoiKind::SavedPlace)];
        let matches = closest_matches(&hazard, &closer_place, 500.0);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.kind, PoiKind::SavedPlace);
        assert!((matches[0].1.distance_km - 5.0).abs() < 1e-6);

        let tied = vec![at(7.0, PoiKind::SavedPlace), at(7.0, PoiKind::LivePosition)];
        let matches = closest_matches(&hazard, &tied, 500.0);
        assert_eq!(matches[0].1.kind, PoiKind::LivePosition);

        let tied_reversed = vec![at(7.0, PoiKind::LivePosition), at(7.0, PoiKind::SavedPlace)];
        let matches = closest_matches(&hazard, &tied_reversed, 500.0);
        assert_eq!(matches[0].1.kind, PoiKind::LivePosition);
    }

    #[tokio::test]
    async fn test_ttl_sweep_removes_only_expired_alerts() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let (old_user, recent_user) = (Uuid::new_v4(), Uuid::new_v4());
        for user_id in [old_user, recent_user] {
            store
                .insert_alert(&NewAlert {
                    user_id,
                    hazard_id: 1,
                    message: "Flood alert: Emergency detected ~3 km away.".to_string(),
                })
                .await
                .unwrap();
        }
        store.set_alert_created_at(old_user, 1, now - Duration::hours(25));
        store.set_alert_created_at(recent_user, 1, now - Duration::hours(23));

        let report = generator(&store).run_at(now).await.unwrap();

        assert_eq!(report.alerts_expired, 1);
        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].user_id, recent_user);
    }

    #[tokio::test]
    async fn test_hazards_outside_lookback_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut old = hazard_candidate(HazardType::Flood, Map::new());
        old.occurred_at = Utc::now() - Duration::minutes(90);
        store.upsert_hazard(&old).await.unwrap();
        let ana = store.add_user("Ana", None);
        store.set_live_position(ana, 40.0, -74.0);

        let report = generator(&store).run_at(Utc::now()).await.unwrap();
        assert_eq!(report.hazards_scanned, 0);

        let wider = generator(&store).with_lookback_minutes(120).run_at(Utc::now()).await.unwrap();
        assert_eq!(wider.alerts_created, 1);
    }

    #[test]
    fn test_render_message_variants() {
        let now = Utc::now();
        let mut hazard = Hazard {
            id: 1,
            hazard_type: HazardType::Earthquake,
            severity: 0.5,
            occurred_at: now,
            lat: 0.0,
            lon: 0.0,
            source: "usgs".to_string(),
            source_event_id: "x".to_string(),
            attributes: quake_attrs(4.76),
            created_at: now,
        };
        assert_eq!(render_message(&hazard, 41.6), "Earthquake M4.8 detected ~42 km away.");

        hazard.attributes = Map::new();
        assert_eq!(
            render_message(&hazard, 10.2),
            "Earthquake alert: Emergency detected ~10 km away."
        );

        hazard.hazard_type = HazardType::Wildfire;
        hazard.attributes.insert("title".to_string(), json!("Creek Fire"));
        assert_eq!(
            render_message(&hazard, 3.5),
            "Wildfire alert: Creek Fire detected ~4 km away."
        );
    }
}
