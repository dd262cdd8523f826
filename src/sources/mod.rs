//! Source adapters: one per upstream provider, each normalizing its payload
//! into [`HazardCandidate`]s and upserting them into the hazard store.
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::errors::{SourceError, StoreError};
use crate::models::HazardCandidate;
use crate::store::HazardStore;

pub mod bulletin;
pub mod flood;
pub mod seismic;
pub mod tsunami;
pub mod wildfire;

pub use flood::{FloodRisk, FloodRiskReport, FloodSource};
pub use seismic::SeismicSource;
pub use tsunami::TsunamiSource;
pub use wildfire::WildfireSource;

/// Upserts issued concurrently per batch.
pub const UPSERT_BATCH_SIZE: usize = 20;

pub fn build_http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("siscom-hazards/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Upserts candidates in fixed-size batches, running each batch concurrently.
///
/// A failed upsert only skips that candidate. The run fails only when every
/// attempted upsert failed, so a store outage is still reported.
pub async fn upsert_in_batches(
    store: &dyn HazardStore,
    source: &str,
    candidates: &[HazardCandidate],
) -> Result<usize, SourceError> {
    let mut written = 0;
    let mut first_error: Option<StoreError> = None;

    for batch in candidates.chunks(UPSERT_BATCH_SIZE) {
        let results = join_all(batch.iter().map(|c| store.upsert_hazard(c))).await;
        for (candidate, result) in batch.iter().zip(results) {
            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!(
                        source,
                        source_event_id = %candidate.source_event_id,
                        "Failed to upsert hazard: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) if written == 0 => Err(e.into()),
        _ => Ok(written),
    }
}
