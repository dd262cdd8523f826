use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiKind {
    SavedPlace,
    LivePosition,
}

/// A saved place or last live position, owned by the CRUD layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    pub user_id: Uuid,
    pub kind: PoiKind,
    pub lat: f64,
    pub lon: f64,
}

impl PointOfInterest {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivePosition {
    pub user_id: Uuid,
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
    pub push_token: Option<String>,
}

impl LivePosition {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Another member of one of a user's family groups.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyContact {
    pub user_id: Uuid,
    pub display_name: String,
    pub push_token: Option<String>,
}
