//! Pure status transitions: callers pass `now` and persist the result.

use chrono::{DateTime, Utc};

use crate::error::LifecycleError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::rider::Rider;

fn ensure_edge(delivery: &Delivery, to: DeliveryStatus) -> Result<(), LifecycleError> {
    if delivery.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: delivery.status,
            to,
        })
    }
}

/// Lifecycle timestamps never go backwards, even if the caller's clock does.
fn stamp(delivery: &Delivery, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(delivery.last_timestamp())
}

pub fn assign(
    delivery: &Delivery,
    rider: &Rider,
    now: DateTime<Utc>,
) -> Result<Delivery, LifecycleError> {
    ensure_edge(delivery, DeliveryStatus::Assigned)?;

    if !rider.is_eligible() {
        return Err(LifecycleError::RiderUnavailable(rider.id.clone()));
    }

    let mut next = delivery.clone();
    next.status = DeliveryStatus::Assigned;
    next.assigned_at = Some(stamp(delivery, now));
    next.rider_id = Some(rider.id.clone());
    Ok(next)
}

/// Moves one step along the happy path. Only `picked_up`, `in_transit` and
/// `delivered` are valid targets, each from its immediate predecessor.
pub fn advance(
    delivery: &Delivery,
    target: DeliveryStatus,
    now: DateTime<Utc>,
) -> Result<Delivery, LifecycleError> {
    let forward = matches!(
        target,
        DeliveryStatus::PickedUp | DeliveryStatus::InTransit | DeliveryStatus::Delivered
    );
    if !forward {
        return Err(LifecycleError::InvalidTransition {
            from: delivery.status,
            to: target,
        });
    }
    ensure_edge(delivery, target)?;

    let at = stamp(delivery, now);
    let mut next = delivery.clone();
    next.status = target;
    match target {
        DeliveryStatus::PickedUp => {
            next.picked_up_at.get_or_insert(at);
        }
        DeliveryStatus::Delivered => {
            next.delivered_at.get_or_insert(at);
        }
        _ => {}
    }
    Ok(next)
}

pub fn cancel(delivery: &Delivery, reason: &str) -> Result<Delivery, LifecycleError> {
    close(delivery, DeliveryStatus::Cancelled, reason)
}

pub fn fail(delivery: &Delivery, reason: &str) -> Result<Delivery, LifecycleError> {
    close(delivery, DeliveryStatus::Failed, reason)
}

fn close(
    delivery: &Delivery,
    terminal: DeliveryStatus,
    reason: &str,
) -> Result<Delivery, LifecycleError> {
    ensure_edge(delivery, terminal)?;

    let mut next = delivery.clone();
    next.status = terminal;
    next.reason = Some(reason.trim().to_string());
    Ok(next)
}
