use thiserror::Error;

/// Errors raised by a hazard/alert/user store.
///
/// A uniqueness conflict is never reported here: upserts and alert inserts
/// treat conflicts as successful no-ops.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Invalid hazard type: {0}")]
    InvalidHazardType(String),
}
