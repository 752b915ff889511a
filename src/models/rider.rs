use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A delivery agent. Riders exist independently of deliveries; a delivery
/// refers to its rider by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub phone: String,
    pub online: bool,
    pub location: GeoPoint,
    /// When `location` was last reported. May be arbitrarily old.
    pub location_updated_at: DateTime<Utc>,
    /// Number of non-terminal deliveries currently assigned.
    pub active_load: u32,
    pub version: u64,
}

impl Rider {
    pub fn is_eligible(&self) -> bool {
        self.online
    }
}
