//! Storage interfaces injected into every adapter, generator and dispatcher.
//!
//! Concurrency between overlapping task runs is handled entirely by the
//! idempotency of these operations: hazard upserts are keyed by
//! `(source, source_event_id)` and alert inserts ignore `(user_id, hazard_id)`
//! conflicts. Implementations must not add cross-call locking.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{
    FamilyContact, Hazard, HazardCandidate, LivePosition, NewAlert, PointOfInterest, UpsertOutcome,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait HazardStore: Send + Sync {
    /// Inserts the candidate, or overwrites the mutable fields (severity,
    /// occurred_at, lat, lon, attributes) of the row with the same
    /// `(source, source_event_id)`. Identity is never changed.
    async fn upsert_hazard(&self, candidate: &HazardCandidate) -> Result<UpsertOutcome, StoreError>;

    /// Hazards with `occurred_at >= cutoff`, newest first.
    async fn hazards_occurred_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError>;

    /// Hazards first inserted at or after `cutoff`, newest first.
    async fn hazards_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hazard>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Returns `false` when an alert for the same user and hazard already exists.
    async fn insert_alert(&self, alert: &NewAlert) -> Result<bool, StoreError>;

    /// Removes alerts created strictly before `cutoff`, returning how many went.
    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Read-only view of user data owned by the CRUD service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn points_of_interest(&self) -> Result<Vec<PointOfInterest>, StoreError>;

    async fn live_positions(&self) -> Result<Vec<LivePosition>, StoreError>;

    /// Members sharing any family group with `user_id`, excluding the user.
    async fn family_contacts(&self, user_id: Uuid) -> Result<Vec<FamilyContact>, StoreError>;
}
