//! Push notifications for fresh hazards and the family geofence.
//!
//! Delivery is at-least-once: a hazard that stays inside the proximity scan
//! window across two ticks is pushed twice. Gateway failures drop that
//! hazard's notification for the current cycle only.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::PushGateway;
use crate::alerts::render_message;
use crate::errors::{StoreError, TaskError};
use crate::models::{FamilyContact, Hazard, LivePosition, PushMessage};
use crate::orchestrator::Task;
use crate::store::{HazardStore, UserDirectory};

pub const PROXIMITY_WINDOW_MINUTES: i64 = 2;
pub const PROXIMITY_RADIUS_KM: f64 = 50.0;
pub const GEOFENCE_WINDOW_HOURS: i64 = 6;

const CRITICAL_SEVERITY: f64 = 0.7;
const HIGH_SEVERITY: f64 = 0.4;

/// Danger radius (exclusive) and tier label for a severity, if any.
pub fn geofence_tier(severity: f64) -> Option<(f64, &'static str)> {
    if severity >= CRITICAL_SEVERITY {
        Some((5.0, "CRITICAL"))
    } else if severity >= HIGH_SEVERITY {
        Some((2.0, "HIGH"))
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPass {
    Proximity,
    Geofence,
}

pub struct NotificationDispatcher {
    hazards: Arc<dyn HazardStore>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PushGateway>,
}

impl NotificationDispatcher {
    pub fn new(
        hazards: Arc<dyn HazardStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            hazards,
            users,
            gateway,
        }
    }

    pub fn task(self: &Arc<Self>, pass: DispatchPass) -> DispatchTask {
        DispatchTask {
            dispatcher: self.clone(),
            pass,
        }
    }

    async fn deliver(&self, hazard_id: i64, messages: &[PushMessage]) -> usize {
        match self.gateway.send(messages).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(
                    "Dropping {} of {} pushes for hazard {}: {}",
                    messages.len().saturating_sub(e.accepted()),
                    messages.len(),
                    hazard_id,
                    e
                );
                e.accepted()
            }
        }
    }

    /// Pushes every hazard created in the last two minutes to users with a
    /// live position within 50 km, one gateway request per hazard.
    pub async fn run_proximity_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let hazards = self
            .hazards
            .hazards_created_since(now - Duration::minutes(PROXIMITY_WINDOW_MINUTES))
            .await?;
        if hazards.is_empty() {
            return Ok(0);
        }
        let positions = self.users.live_positions().await?;

        let mut sent = 0;
        for hazard in &hazards {
            let messages = proximity_messages(hazard, &positions);
            if messages.is_empty() {
                continue;
            }
            sent += self.deliver(hazard.id, &messages).await;
        }

        info!("Proximity pass: {} hazards, {} pushes sent", hazards.len(), sent);
        Ok(sent)
    }

    /// Notifies the family of anyone whose live position is inside the
    /// danger radius of a hazard from the last six hours.
    pub async fn run_geofence_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let hazards = self
            .hazards
            .hazards_occurred_since(now - Duration::hours(GEOFENCE_WINDOW_HOURS))
            .await?;
        if hazards.is_empty() {
            return Ok(0);
        }
        let positions = self.users.live_positions().await?;

        let mut families: HashMap<Uuid, Vec<FamilyContact>> = HashMap::new();
        let mut sent = 0;
        for position in &positions {
            for hazard in &hazards {
                let Some((radius_km, tier)) = geofence_tier(hazard.severity) else {
                    continue;
                };
                let distance_km = position.point().distance_km(&hazard.point());
                if distance_km >= radius_km {
                    continue;
                }

                if !families.contains_key(&position.user_id) {
                    match self.users.family_contacts(position.user_id).await {
                        Ok(contacts) => {
                            families.insert(position.user_id, contacts);
                        }
                        Err(e) => {
                            warn!("Failed to load family of user {}: {}", position.user_id, e);
                            continue;
                        }
                    }
                }
                let contacts = &families[&position.user_id];

                let messages = geofence_messages(position, hazard, tier, distance_km, contacts);
                if messages.is_empty() {
                    continue;
                }
                sent += self.deliver(hazard.id, &messages).await;
            }
        }

        info!("Geofence pass: {} family pushes sent", sent);
        Ok(sent)
    }
}

fn proximity_messages(hazard: &Hazard, positions: &[LivePosition]) -> Vec<PushMessage> {
    positions
        .iter()
        .filter_map(|position| {
            let token = position.push_token.as_deref()?;
            let distance_km = position.point().distance_km(&hazard.point());
            if distance_km > PROXIMITY_RADIUS_KM {
                return None;
            }
            Some(PushMessage::new(
                token,
                format!("{} Alert", hazard.hazard_type.label()),
                render_message(hazard, distance_km),
                json!({
                    "kind": "proximity",
                    "hazard_id": hazard.id,
                    "type": hazard.hazard_type.as_str(),
                    "severity": hazard.severity,
                }),
            ))
        })
        .collect()
}

fn geofence_messages(
    position: &LivePosition,
    hazard: &Hazard,
    tier: &str,
    distance_km: f64,
    contacts: &[FamilyContact],
) -> Vec<PushMessage> {
    contacts
        .iter()
        .filter(|contact| contact.user_id != position.user_id)
        .filter_map(|contact| {
            let token = contact.push_token.as_deref()?;
            Some(PushMessage::new(
                token,
                format!("Family Safety Alert: {}", tier),
                format!(
                    "{} is about {:.1} km from a {} ({} danger).",
                    position.display_name,
                    distance_km,
                    hazard.hazard_type.as_str(),
                    tier
                ),
                json!({
                    "kind": "geofence",
                    "hazard_id": hazard.id,
                    "member_id": position.user_id,
                    "type": hazard.hazard_type.as_str(),
                    "severity": hazard.severity,
                    "tier": tier,
                }),
            ))
        })
        .collect()
}

/// One dispatcher pass scheduled as its own task.
pub struct DispatchTask {
    dispatcher: Arc<NotificationDispatcher>,
    pass: DispatchPass,
}

#[async_trait]
impl Task for DispatchTask {
    async fn run(&self) -> Result<usize, TaskError> {
        let now = Utc::now();
        let sent = match self.pass {
            DispatchPass::Proximity => self.dispatcher.run_proximity_at(now).await?,
            DispatchPass::Geofence => self.dispatcher.run_geofence_at(now).await?,
        };
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::lat_offset_km;
    use crate::models::{HazardCandidate, HazardType};
    use crate::notify::push::testing::RecordingPushGateway;
    use crate::store::MemoryStore;
    use serde_json::Map;

    async fn seed_hazard(store: &MemoryStore, severity: f64, occurred_minutes_ago: i64) -> i64 {
        let mut attributes = Map::new();
        attributes.insert("title".to_string(), json!("Creek Fire"));
        store
            .upsert_hazard(&HazardCandidate {
                hazard_type: HazardType::Wildfire,
                severity,
                occurred_at: Utc::now() - Duration::minutes(occurred_minutes_ago),
                lat: 40.0,
                lon: -74.0,
                source: "nifc".to_string(),
                source_event_id: format!("fire-{}", severity),
                attributes,
            })
            .await
            .unwrap()
            .id()
    }

    fn dispatcher(store: &Arc<MemoryStore>, gateway: &Arc<RecordingPushGateway>) -> NotificationDispatcher {
        NotificationDispatcher::new(store.clone(), store.clone(), gateway.clone())
    }

    /// A person 3 km from the hazard with one reachable relative.
    fn seed_family(store: &MemoryStore) -> (Uuid, Uuid) {
        let at_risk = store.add_user("Maria", Some("ExponentPushToken[maria]"));
        store.set_live_position(at_risk, lat_offset_km(40.0, 3.0), -74.0);
        let relative = store.add_user("Jose", Some("ExponentPushToken[jose]"));
        let no_token = store.add_user("Abuela", None);
        store.add_family(&[at_risk, relative, no_token]);
        (at_risk, relative)
    }

    #[test]
    fn test_geofence_tiers() {
        assert_eq!(geofence_tier(0.9), Some((5.0, "CRITICAL")));
        assert_eq!(geofence_tier(0.7), Some((5.0, "CRITICAL")));
        assert_eq!(geofence_tier(0.5), Some((2.0, "HIGH")));
        assert_eq!(geofence_tier(0.4), Some((2.0, "HIGH")));
        assert_eq!(geofence_tier(0.39), None);
    }

    #[tokio::test]
    async fn test_geofence_critical_hazard_notifies_family_once() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        seed_hazard(&store, 0.8, 30).await;
        seed_family(&store);

        let sent = dispatcher(&store, &gateway).run_geofence_at(Utc::now()).await.unwrap();

        assert_eq!(sent, 1);
        let messages = gateway.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].token, "ExponentPushToken[jose]");
        assert_eq!(messages[0].title, "Family Safety Alert: CRITICAL");
        assert!(messages[0].body.starts_with("Maria is about 3.0 km from a wildfire"));
        assert_eq!(messages[0].data["tier"], "CRITICAL");
    }

    #[tokio::test]
    async fn test_geofence_moderate_hazard_needs_to_be_closer() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        seed_hazard(&store, 0.5, 30).await;
        seed_family(&store);

        let sent = dispatcher(&store, &gateway).run_geofence_at(Utc::now()).await.unwrap();

        assert_eq!(sent, 0);
        assert!(gateway.messages().is_empty());
    }

    #[tokio::test]
    async fn test_geofence_ignores_hazards_older_than_window() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        seed_hazard(&store, 0.9, 7 * 60).await;
        seed_family(&store);

        let sent = dispatcher(&store, &gateway).run_geofence_at(Utc::now()).await.unwrap();
        assert_eq!(sent, 0);
    }

    /// Delegates to the memory store but cannot resolve one user's family.
    struct BrokenFamilyLookup {
        store: Arc<MemoryStore>,
        broken: Uuid,
    }

    #[async_trait]
    impl UserDirectory for BrokenFamilyLookup {
        async fn points_of_interest(&self) -> Result<Vec<crate::models::PointOfInterest>, StoreError> {
            self.store.points_of_interest().await
        }

        async fn live_positions(&self) -> Result<Vec<LivePosition>, StoreError> {
            self.store.live_positions().await
        }

        async fn family_contacts(&self, user_id: Uuid) -> Result<Vec<FamilyContact>, StoreError> {
            if user_id == self.broken {
                return Err(StoreError::InvalidHazardType("family lookup failed".to_string()));
            }
            self.store.family_contacts(user_id).await
        }
    }

    #[tokio::test]
    async fn test_geofence_continues_after_failed_family_lookup() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        seed_hazard(&store, 0.8, 30).await;

        let unlucky = store.add_user("Pedro", Some("ExponentPushToken[pedro]"));
        store.set_live_position(unlucky, lat_offset_km(40.0, 1.0), -74.0);
        let cousin = store.add_user("Lucia", Some("ExponentPushToken[lucia]"));
        store.add_family(&[unlucky, cousin]);
        let (at_risk, _) = seed_family(&store);

        let users = Arc::new(BrokenFamilyLookup {
            store: store.clone(),
            broken: unlucky,
        });
        let dispatcher = NotificationDispatcher::new(store.clone(), users, gateway.clone());

        let sent = dispatcher.run_geofence_at(Utc::now()).await.unwrap();

        assert_eq!(sent, 1);
        let messages = gateway.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].token, "ExponentPushToken[jose]");
        assert_eq!(messages[0].data["member_id"], json!(at_risk));
        assert!(messages.iter().all(|m| m.token != "ExponentPushToken[lucia]"));
    }

    #[tokio::test]
    async fn test_proximity_push_batches_per_hazard() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        let hazard_id = seed_hazard(&store, 0.3, 1).await;

        let near = store.add_user("Near", Some("ExponentPushToken[near]"));
        store.set_live_position(near, lat_offset_km(40.0, 10.0), -74.0);
        let edge = store.add_user("Edge", Some("ExponentPushToken[edge]"));
        store.set_live_position(edge, lat_offset_km(40.0, 49.9), -74.0);
        let far = store.add_user("Far", Some("ExponentPushToken[far]"));
        store.set_live_position(far, lat_offset_km(40.0, 60.0), -74.0);
        let silent = store.add_user("Silent", None);
        store.set_live_position(silent, 40.0, -74.0);

        let sent = dispatcher(&store, &gateway).run_proximity_at(Utc::now()).await.unwrap();

        assert_eq!(sent, 2);
        let batches = gateway.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 1);
        let tokens: Vec<&str> = batches[0].iter().map(|m| m.token.as_str()).collect();
        assert_eq!(tokens, vec!["ExponentPushToken[near]", "ExponentPushToken[edge]"]);
        assert_eq!(batches[0][0].title, "Wildfire Alert");
        assert_eq!(batches[0][0].body, "Wildfire alert: Creek Fire detected ~10 km away.");
        assert_eq!(batches[0][0].data["hazard_id"], hazard_id);
    }

    #[tokio::test]
    async fn test_proximity_skips_hazards_created_before_window() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        let hazard_id = seed_hazard(&store, 0.9, 1).await;
        store.set_hazard_created_at(hazard_id, Utc::now() - Duration::minutes(3));
        let near = store.add_user("Near", Some("ExponentPushToken[near]"));
        store.set_live_position(near, 40.0, -74.0);

        let sent = dispatcher(&store, &gateway).run_proximity_at(Utc::now()).await.unwrap();
        assert_eq!(sent, 0);
        assert!(gateway.messages().is_empty());
    }

    #[tokio::test]
    async fn test_proximity_repeats_within_window() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::default());
        seed_hazard(&store, 0.9, 1).await;
        let near = store.add_user("Near", Some("ExponentPushToken[near]"));
        store.set_live_position(near, 40.0, -74.0);

        let d = dispatcher(&store, &gateway);
        d.run_proximity_at(Utc::now()).await.unwrap();
        d.run_proximity_at(Utc::now()).await.unwrap();

        assert_eq!(gateway.messages().len(), 2);
    }

    /// Takes the first message of every send, then fails.
    struct HalfwayGateway;

    #[async_trait]
    impl PushGateway for HalfwayGateway {
        async fn send(&self, _: &[PushMessage]) -> Result<usize, crate::errors::PushError> {
            Err(crate::errors::PushError::Partial {
                accepted: 1,
                source: Box::new(crate::errors::PushError::Rejected(500)),
            })
        }
    }

    #[tokio::test]
    async fn test_partial_delivery_counts_accepted_pushes() {
        let store = Arc::new(MemoryStore::new());
        seed_hazard(&store, 0.9, 1).await;
        for name in ["Near", "Nearer"] {
            let user = store.add_user(name, Some("ExponentPushToken[near]"));
            store.set_live_position(user, 40.0, -74.0);
        }

        let d = NotificationDispatcher::new(store.clone(), store.clone(), Arc::new(HalfwayGateway));
        assert_eq!(d.run_proximity_at(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingPushGateway::failing());
        seed_hazard(&store, 0.9, 1).await;
        let near = store.add_user("Near", Some("ExponentPushToken[near]"));
        store.set_live_position(near, 40.0, -74.0);

        let d = Arc::new(dispatcher(&store, &gateway));
        assert_eq!(d.task(DispatchPass::Proximity).run().await.unwrap(), 0);
    }
}
