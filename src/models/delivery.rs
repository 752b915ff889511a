use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::rider::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub address: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Assigned,
        DeliveryStatus::PickedUp,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled | DeliveryStatus::Failed
        )
    }

    /// Non-terminal and past `pending`: the delivery counts against its
    /// rider's load.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned | DeliveryStatus::PickedUp | DeliveryStatus::InTransit
        )
    }

    /// Every legal edge of the delivery lifecycle.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        matches!(
            (*self, next),
            (Pending, Assigned)
                | (Assigned, PickedUp)
                | (PickedUp, InTransit)
                | (InTransit, Delivered)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
                | (PickedUp, Failed)
                | (InTransit, Failed)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delivery status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fare {
    pub base: Decimal,
    pub distance: Decimal,
    /// `base + distance` unless an explicit override was supplied.
    pub total: Decimal,
}

impl Fare {
    pub fn new(base: Decimal, distance: Decimal, override_total: Option<Decimal>) -> Self {
        Self {
            base,
            distance,
            total: override_total.unwrap_or(base + distance),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub company_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub status: DeliveryStatus,
    pub fare: Fare,
    pub rider_id: Option<String>,
    /// Free-text reason recorded on cancel or fail.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        company_id: impl Into<String>,
        pickup: Location,
        dropoff: Location,
        fare: Fare,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            company_id: company_id.into(),
            pickup,
            dropoff,
            status: DeliveryStatus::Pending,
            fare,
            rider_id: None,
            reason: None,
            created_at: now,
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
            version: 0,
        }
    }

    /// Latest lifecycle timestamp recorded so far.
    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.delivered_at
            .or(self.picked_up_at)
            .or(self.assigned_at)
            .unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{DeliveryStatus, Fare};

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&DeliveryStatus::PickedUp).unwrap();
        assert_eq!(json, "\"picked_up\"");

        let parsed: DeliveryStatus = serde_json::from_str("\"in_transit\"").unwrap();
        assert_eq!(parsed, DeliveryStatus::InTransit);

        assert!(serde_json::from_str::<DeliveryStatus>("\"lost\"").is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Delivered".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Delivered));
        assert_eq!(" PICKED_UP ".parse::<DeliveryStatus>(), Ok(DeliveryStatus::PickedUp));
        let err = "picked up".parse::<DeliveryStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown delivery status: picked up");
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in DeliveryStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in DeliveryStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn fare_total_is_sum_unless_overridden() {
        let fare = Fare::new(Decimal::new(50000, 2), Decimal::new(125050, 2), None);
        assert_eq!(fare.total, Decimal::new(175050, 2));

        let flat = Fare::new(Decimal::new(500, 0), Decimal::new(1250, 0), Some(Decimal::new(1500, 0)));
        assert_eq!(flat.total, Decimal::new(1500, 0));
    }
}
