use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::delivery::DeliveryStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub delivery_id: String,
    /// `None` when the delivery was just created.
    pub from: Option<DeliveryStatus>,
    pub to: DeliveryStatus,
    pub rider_id: Option<String>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}
