use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::engine::matching::match_nearest_rider;
use crate::error::{AppError, LifecycleError, StoreError};
use crate::models::delivery::{Delivery, DeliveryStatus, Fare, Location};
use crate::models::event::DeliveryEvent;
use crate::models::matching::RiderMatch;
use crate::models::rider::Rider;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub id: Option<String>,
    pub company_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub base_fare: Decimal,
    pub distance_fare: Decimal,
    pub total_override: Option<Decimal>,
}

pub fn create_delivery(state: &AppState, request: NewDelivery) -> Result<Delivery, AppError> {
    if request.company_id.trim().is_empty() {
        return Err(AppError::BadRequest("company_id cannot be empty".to_string()));
    }
    validate_location("pickup", &request.pickup)?;
    validate_location("dropoff", &request.dropoff)?;

    let amounts = [
        Some(request.base_fare),
        Some(request.distance_fare),
        request.total_override,
    ];
    if amounts.iter().flatten().any(|amount| amount.is_sign_negative()) {
        return Err(AppError::BadRequest("fare amounts must be >= 0".to_string()));
    }

    let id = match request.id {
        Some(id) if id.trim().is_empty() => {
            return Err(AppError::BadRequest("id cannot be empty".to_string()));
        }
        Some(id) => id.trim().to_string(),
        None => Uuid::new_v4().to_string(),
    };

    let delivery = Delivery::new(
        id,
        request.company_id.trim(),
        request.pickup,
        request.dropoff,
        Fare::new(request.base_fare, request.distance_fare, request.total_override),
        Utc::now(),
    );

    let delivery = state.deliveries.insert(delivery)?;

    info!(delivery_id = %delivery.id, company_id = %delivery.company_id, "delivery created");
    publish(state, None, &delivery);

    Ok(delivery)
}

fn validate_location(field: &str, location: &Location) -> Result<(), AppError> {
    if location.address.trim().is_empty() {
        return Err(AppError::BadRequest(format!(
            "{field}.address cannot be empty"
        )));
    }
    if !location.point.is_valid() {
        return Err(AppError::BadRequest(format!(
            "{field}.point is not a valid coordinate"
        )));
    }
    Ok(())
}

/// Nearest online rider of the delivery's company. Does not assign.
pub fn suggest_rider(state: &AppState, delivery_id: &str) -> Result<RiderMatch, AppError> {
    let start = Instant::now();
    let result = find_match(state, delivery_id);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .match_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

fn find_match(state: &AppState, delivery_id: &str) -> Result<RiderMatch, AppError> {
    let delivery = state.deliveries.get(delivery_id)?;

    if delivery.status != DeliveryStatus::Pending {
        return Err(LifecycleError::InvalidTransition {
            from: delivery.status,
            to: DeliveryStatus::Assigned,
        }
        .into());
    }

    let riders: Vec<_> = state
        .riders
        .list()
        .into_iter()
        .filter(|rider| rider.company_id == delivery.company_id)
        .collect();

    let matched = match_nearest_rider(
        &delivery,
        &riders,
        &state.config.match_policy(),
        Utc::now(),
    )
    .inspect_err(|_| warn!(delivery_id = %delivery.id, "no eligible riders"))?;

    info!(
        delivery_id = %delivery.id,
        rider_id = %matched.rider_id,
        distance_m = matched.distance_m,
        stale = matched.stale,
        "rider matched"
    );

    Ok(matched)
}

/// The rider is claimed first, with a versioned write that also requires
/// them to be online, so going offline concurrently makes the claim fail.
/// The claim is released again if the delivery write does not go through.
pub fn assign_delivery(
    state: &AppState,
    delivery_id: &str,
    rider_id: &str,
) -> Result<Delivery, AppError> {
    let result = claim_and_assign(state, delivery_id, rider_id);
    state.metrics.record_transition("assign", result.is_ok());

    let (before, after) = result?;
    after_commit(state, &before, &after);
    Ok(after)
}

fn claim_and_assign(
    state: &AppState,
    delivery_id: &str,
    rider_id: &str,
) -> Result<(Delivery, Delivery), AppError> {
    let delivery = state.deliveries.get(delivery_id)?;
    let rider = state.riders.get(rider_id)?;

    if rider.company_id != delivery.company_id {
        return Err(AppError::BadRequest(format!(
            "rider {} does not belong to company {}",
            rider.id, delivery.company_id
        )));
    }
    lifecycle::assign(&delivery, &rider, Utc::now())?;

    let claimed = claim_rider(state, rider_id)?;
    commit_assignment(state, delivery_id, &claimed)
}

fn claim_rider(state: &AppState, rider_id: &str) -> Result<Rider, AppError> {
    let claimed = state
        .riders
        .update::<_, AppError>(rider_id, state.config.cas_retries, |rider| {
            if !rider.is_eligible() {
                return Err(LifecycleError::RiderUnavailable(rider.id.clone()).into());
            }
            rider.active_load = rider.active_load.saturating_add(1);
            Ok(())
        })?;

    state
        .metrics
        .rider_load_on_assign
        .observe(f64::from(claimed.active_load));
    Ok(claimed)
}

fn commit_assignment(
    state: &AppState,
    delivery_id: &str,
    rider: &Rider,
) -> Result<(Delivery, Delivery), AppError> {
    let result = commit(state, "assign", delivery_id, |current| {
        Ok(lifecycle::assign(current, rider, Utc::now())?)
    });

    if result.is_err() {
        release_rider(state, &rider.id);
    }
    result
}

pub fn advance_delivery(
    state: &AppState,
    delivery_id: &str,
    target: DeliveryStatus,
) -> Result<Delivery, AppError> {
    transition(state, "advance", delivery_id, |current| {
        Ok(lifecycle::advance(current, target, Utc::now())?)
    })
}

pub fn cancel_delivery(
    state: &AppState,
    delivery_id: &str,
    reason: &str,
) -> Result<Delivery, AppError> {
    require_reason(reason)?;
    transition(state, "cancel", delivery_id, |current| {
        Ok(lifecycle::cancel(current, reason)?)
    })
}

pub fn fail_delivery(
    state: &AppState,
    delivery_id: &str,
    reason: &str,
) -> Result<Delivery, AppError> {
    require_reason(reason)?;
    transition(state, "fail", delivery_id, |current| {
        Ok(lifecycle::fail(current, reason)?)
    })
}

fn require_reason(reason: &str) -> Result<(), AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason cannot be empty".to_string()));
    }
    Ok(())
}

fn transition<F>(
    state: &AppState,
    operation: &'static str,
    delivery_id: &str,
    apply: F,
) -> Result<Delivery, AppError>
where
    F: Fn(&Delivery) -> Result<Delivery, AppError>,
{
    let result = commit(state, operation, delivery_id, apply);
    state.metrics.record_transition(operation, result.is_ok());

    let (before, after) = result?;
    after_commit(state, &before, &after);
    Ok(after)
}

fn commit<F>(
    state: &AppState,
    operation: &'static str,
    delivery_id: &str,
    apply: F,
) -> Result<(Delivery, Delivery), AppError>
where
    F: Fn(&Delivery) -> Result<Delivery, AppError>,
{
    let mut before = None;

    let after = state
        .deliveries
        .update::<_, AppError>(delivery_id, state.config.cas_retries, |current| {
            let next = apply(current)?;
            before = Some(std::mem::replace(current, next));
            Ok(())
        })
        .inspect_err(|err| {
            if matches!(err, AppError::Store(StoreError::ConcurrentModification { .. })) {
                warn!(delivery_id, operation, "delivery kept changing; giving up");
            }
        })?;

    let before = before
        .ok_or_else(|| AppError::Internal(format!("no snapshot read for {delivery_id}")))?;
    Ok((before, after))
}

fn after_commit(state: &AppState, before: &Delivery, after: &Delivery) {
    match (before.status.is_active(), after.status.is_active()) {
        (false, true) => state.metrics.active_deliveries.inc(),
        (true, false) => state.metrics.active_deliveries.dec(),
        _ => {}
    }

    if before.status.is_active() && after.status.is_terminal() {
        if let Some(rider_id) = &after.rider_id {
            release_rider(state, rider_id);
        }
    }

    info!(
        delivery_id = %after.id,
        from = %before.status,
        to = %after.status,
        rider_id = after.rider_id.as_deref().unwrap_or("-"),
        "delivery transitioned"
    );
    publish(state, Some(before.status), after);
}

fn release_rider(state: &AppState, rider_id: &str) {
    let released = state
        .riders
        .update::<_, AppError>(rider_id, state.config.cas_retries, |rider| {
            rider.active_load = rider.active_load.saturating_sub(1);
            Ok(())
        });

    if let Err(err) = released {
        warn!(rider_id, error = %err, "rider load release lost");
    }
}

fn publish(state: &AppState, from: Option<DeliveryStatus>, delivery: &Delivery) {
    let event = DeliveryEvent {
        delivery_id: delivery.id.clone(),
        from,
        to: delivery.status,
        rider_id: delivery.rider_id.clone(),
        reason: delivery.reason.clone(),
        at: Utc::now(),
    };
    let _ = state.events_tx.send(event);
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::Config;
    use crate::engine::roster::{self, NewRider};
    use crate::models::rider::GeoPoint;

    fn state() -> AppState {
        AppState::new(Config::default())
    }

    fn location(lat: f64, lng: f64) -> Location {
        Location {
            address: format!("{lat},{lng}"),
            point: GeoPoint { lat, lng },
        }
    }

    fn new_delivery(id: &str, company: &str) -> NewDelivery {
        NewDelivery {
            id: Some(id.to_string()),
            company_id: company.to_string(),
            pickup: location(6.4531, 3.3958),
            dropoff: location(6.4474, 3.4721),
            base_fare: Decimal::new(500, 0),
            distance_fare: Decimal::new(1_250, 0),
            total_override: None,
        }
    }

    fn add_rider(state: &AppState, id: &str, company: &str, lat: f64, lng: f64) {
        roster::create_rider(
            state,
            NewRider {
                id: Some(id.to_string()),
                company_id: company.to_string(),
                name: format!("rider {id}"),
                phone: "+2348000000000".to_string(),
                location: GeoPoint { lat, lng },
                online: true,
            },
        )
        .unwrap();
    }

    #[test]
    fn create_rejects_bad_input() {
        let state = state();

        let mut blank_address = new_delivery("D1", "acme");
        blank_address.pickup.address = " ".to_string();
        assert!(matches!(
            create_delivery(&state, blank_address),
            Err(AppError::BadRequest(_))
        ));

        let mut negative = new_delivery("D1", "acme");
        negative.base_fare = Decimal::new(-1, 0);
        assert!(matches!(
            create_delivery(&state, negative),
            Err(AppError::BadRequest(_))
        ));

        create_delivery(&state, new_delivery("D1", "acme")).unwrap();
        assert!(matches!(
            create_delivery(&state, new_delivery("D1", "acme")),
            Err(AppError::Store(StoreError::AlreadyExists(_)))
        ));
    }

    #[test]
    fn assignment_tracks_rider_load_until_terminal() {
        let state = state();
        add_rider(&state, "R1", "acme", 6.4540, 3.3960);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let assigned = assign_delivery(&state, "D1", "R1").unwrap();
        assert_eq!(assigned.status, DeliveryStatus::Assigned);
        assert_eq!(assigned.version, 1);
        assert_eq!(state.riders.get("R1").unwrap().active_load, 1);
        assert_eq!(state.metrics.active_deliveries.get(), 1);

        advance_delivery(&state, "D1", DeliveryStatus::PickedUp).unwrap();
        advance_delivery(&state, "D1", DeliveryStatus::InTransit).unwrap();
        let failed = fail_delivery(&state, "D1", "vehicle breakdown").unwrap();

        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);
        assert_eq!(state.metrics.active_deliveries.get(), 0);
        assert!(matches!(
            advance_delivery(&state, "D1", DeliveryStatus::Delivered),
            Err(AppError::Lifecycle(LifecycleError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn cancelling_a_pending_delivery_leaves_riders_alone() {
        let state = state();
        add_rider(&state, "R1", "acme", 6.4540, 3.3960);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let cancelled = cancel_delivery(&state, "D1", "customer request").unwrap();

        assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);
    }

    #[test]
    fn assign_requires_same_company() {
        let state = state();
        add_rider(&state, "R1", "other-co", 6.4540, 3.3960);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        assert!(matches!(
            assign_delivery(&state, "D1", "R1"),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(state.deliveries.get("D1").unwrap().status, DeliveryStatus::Pending);
    }

    #[test]
    fn assign_to_unknown_rider_is_not_found() {
        let state = state();
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        assert!(matches!(
            assign_delivery(&state, "D1", "ghost"),
            Err(AppError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn suggestion_is_scoped_to_company_and_pending_deliveries() {
        let state = state();
        add_rider(&state, "R1", "other-co", 6.4531, 3.3958);
        add_rider(&state, "R2", "acme", 6.4600, 3.4000);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let matched = suggest_rider(&state, "D1").unwrap();
        assert_eq!(matched.rider_id, "R2");

        assign_delivery(&state, "D1", &matched.rider_id).unwrap();
        assert!(matches!(
            suggest_rider(&state, "D1"),
            Err(AppError::Lifecycle(LifecycleError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn concurrent_assigns_have_exactly_one_winner() {
        let state = std::sync::Arc::new(state());
        for i in 0..8 {
            add_rider(&state, &format!("R{i}"), "acme", 6.45, 3.39);
        }
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || assign_delivery(&state, "D1", &format!("R{i}")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(AppError::Lifecycle(LifecycleError::InvalidTransition { .. }))
                    | Err(AppError::Store(StoreError::ConcurrentModification { .. }))
            ));
        }

        let total_load: u32 = state.riders.list().iter().map(|r| r.active_load).sum();
        assert_eq!(total_load, 1);
    }

    #[test]
    fn rider_going_offline_before_the_claim_blocks_assignment() {
        let state = state();
        add_rider(&state, "R1", "acme", 6.4540, 3.3960);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        // Availability flips after the pre-check read the rider as online.
        roster::set_availability(&state, "R1", false).unwrap();
        assert!(matches!(
            claim_rider(&state, "R1"),
            Err(AppError::Lifecycle(LifecycleError::RiderUnavailable(_)))
        ));

        assert!(matches!(
            assign_delivery(&state, "D1", "R1"),
            Err(AppError::Lifecycle(LifecycleError::RiderUnavailable(_)))
        ));
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);
        assert_eq!(state.deliveries.get("D1").unwrap().status, DeliveryStatus::Pending);
    }

    #[test]
    fn failed_delivery_write_releases_the_claim() {
        let state = state();
        add_rider(&state, "R1", "acme", 6.4540, 3.3960);
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let claimed = claim_rider(&state, "R1").unwrap();
        assert_eq!(claimed.active_load, 1);
        cancel_delivery(&state, "D1", "customer request").unwrap();

        assert!(matches!(
            commit_assignment(&state, "D1", &claimed),
            Err(AppError::Lifecycle(LifecycleError::InvalidTransition { .. }))
        ));
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);
    }

    #[test]
    fn company_mismatch_is_reported_before_availability() {
        let state = state();
        add_rider(&state, "R1", "other-co", 6.4540, 3.3960);
        roster::set_availability(&state, "R1", false).unwrap();
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        assert!(matches!(
            assign_delivery(&state, "D1", "R1"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn commit_gives_up_when_retries_are_exhausted() {
        let state = AppState::new(Config {
            cas_retries: 0,
            ..Config::default()
        });
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();

        let err = commit(&state, "cancel", "D1", |current| {
            state.deliveries.save(state.deliveries.get("D1").unwrap()).unwrap();
            Ok(lifecycle::cancel(current, "customer request")?)
        })
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Store(StoreError::ConcurrentModification { expected: 0, found: 1, .. })
        ));
        assert_eq!(state.deliveries.get("D1").unwrap().status, DeliveryStatus::Pending);
    }

    #[test]
    fn commit_retries_against_the_fresh_record() {
        let state = AppState::new(Config {
            cas_retries: 1,
            ..Config::default()
        });
        create_delivery(&state, new_delivery("D1", "acme")).unwrap();
        let calls = std::cell::Cell::new(0);

        let (before, after) = commit(&state, "cancel", "D1", |current| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                state.deliveries.save(state.deliveries.get("D1").unwrap()).unwrap();
            }
            Ok(lifecycle::cancel(current, "customer request")?)
        })
        .unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(before.version, 1);
        assert_eq!(after.version, 2);
        assert_eq!(after.status, DeliveryStatus::Cancelled);
    }

    #[test]
    fn release_never_underflows_or_raises() {
        let state = state();
        add_rider(&state, "R1", "acme", 6.4540, 3.3960);
        claim_rider(&state, "R1").unwrap();

        release_rider(&state, "R1");
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);

        release_rider(&state, "ghost");
        release_rider(&state, "R1");
        assert_eq!(state.riders.get("R1").unwrap().active_load, 0);
    }
}
