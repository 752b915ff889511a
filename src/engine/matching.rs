use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::error::LifecycleError;
use crate::geo::haversine_m;
use crate::models::delivery::Delivery;
use crate::models::matching::RiderMatch;
use crate::models::rider::Rider;

#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Riders within this many meters of the nearest one are considered
    /// equally close and compete on load, then id.
    pub tie_band_m: f64,
    /// Location reports older than this are flagged as stale. Staleness is
    /// reported, never used to exclude a rider.
    pub stale_after_secs: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tie_band_m: 1.0,
            stale_after_secs: 300,
        }
    }
}

struct Candidate<'a> {
    rider: &'a Rider,
    distance_m: f64,
}

/// Picks the online rider closest to the delivery's pickup point.
///
/// Read-only: the caller commits the choice with
/// [`assign`](crate::engine::lifecycle::assign).
pub fn match_nearest_rider(
    delivery: &Delivery,
    riders: &[Rider],
    policy: &MatchPolicy,
    now: DateTime<Utc>,
) -> Result<RiderMatch, LifecycleError> {
    let pickup = &delivery.pickup.point;

    let candidates: Vec<Candidate<'_>> = riders
        .iter()
        .filter(|rider| rider.is_eligible())
        .map(|rider| Candidate {
            rider,
            distance_m: haversine_m(&rider.location, pickup),
        })
        .collect();

    let nearest_m = candidates
        .iter()
        .map(|candidate| candidate.distance_m)
        .min_by(|a, b| a.total_cmp(b))
        .ok_or(LifecycleError::NoRiderAvailable)?;

    let band_limit = nearest_m + policy.tie_band_m.max(0.0);

    let winner = candidates
        .iter()
        .filter(|candidate| candidate.distance_m <= band_limit)
        .min_by(|a, b| tie_break(a, b))
        .ok_or(LifecycleError::NoRiderAvailable)?;

    let location_age_secs = (now - winner.rider.location_updated_at).num_seconds().max(0);

    Ok(RiderMatch {
        delivery_id: delivery.id.clone(),
        rider_id: winner.rider.id.clone(),
        distance_m: winner.distance_m,
        active_load: winner.rider.active_load,
        location_updated_at: winner.rider.location_updated_at,
        location_age_secs,
        stale: location_age_secs > policy.stale_after_secs,
    })
}

fn tie_break(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.rider
        .active_load
        .cmp(&b.rider.active_load)
        .then_with(|| a.rider.id.cmp(&b.rider.id))
}
