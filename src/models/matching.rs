use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderMatch {
    pub delivery_id: String,
    pub rider_id: String,
    pub distance_m: f64,
    pub active_load: u32,
    pub location_updated_at: DateTime<Utc>,
    pub location_age_secs: i64,
    pub stale: bool,
}
