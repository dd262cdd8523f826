use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub user_id: Uuid,
    pub hazard_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub user_id: Uuid,
    pub hazard_id: i64,
    pub message: String,
}
