pub mod alert;
pub mod hazard;
pub mod push;
pub mod user;

pub use alert::{Alert, NewAlert};
pub use hazard::{Hazard, HazardCandidate, HazardType, UpsertOutcome};
pub use push::PushMessage;
pub use user::{FamilyContact, LivePosition, PoiKind, PointOfInterest};
