use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Snaps the point onto a ~1.1 km grid (2 decimal places).
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_coord(self.lat),
            lon: round_coord(self.lon),
        }
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Great-circle distance between two lat/lon pairs, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn round_coord(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Inverse of the haversine along a meridian: the latitude `km` north of `lat`.
/// Used to place points at an exact distance.
pub fn lat_offset_km(lat: f64, km: f64) -> f64 {
    lat + (km / EARTH_RADIUS_KM).to_degrees()
}
