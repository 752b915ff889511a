use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::rider::{GeoPoint, Rider};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewRider {
    pub id: Option<String>,
    pub company_id: String,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    pub online: bool,
}

pub fn create_rider(state: &AppState, request: NewRider) -> Result<Rider, AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if request.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }
    if request.company_id.trim().is_empty() {
        return Err(AppError::BadRequest("company_id cannot be empty".to_string()));
    }
    if !request.location.is_valid() {
        return Err(AppError::BadRequest(
            "location is not a valid coordinate".to_string(),
        ));
    }

    let id = match request.id {
        Some(id) if id.trim().is_empty() => {
            return Err(AppError::BadRequest("id cannot be empty".to_string()));
        }
        Some(id) => id.trim().to_string(),
        None => Uuid::new_v4().to_string(),
    };

    let rider = Rider {
        id,
        company_id: request.company_id.trim().to_string(),
        name: request.name.trim().to_string(),
        phone: request.phone.trim().to_string(),
        online: request.online,
        location: request.location,
        location_updated_at: Utc::now(),
        active_load: 0,
        version: 0,
    };

    let rider = state.riders.insert(rider)?;
    info!(rider_id = %rider.id, company_id = %rider.company_id, "rider created");
    Ok(rider)
}

pub fn set_availability(state: &AppState, rider_id: &str, online: bool) -> Result<Rider, AppError> {
    let rider = update_rider(state, rider_id, |rider| rider.online = online)?;
    info!(rider_id = %rider.id, online, "rider availability changed");
    Ok(rider)
}

pub fn update_location(
    state: &AppState,
    rider_id: &str,
    location: GeoPoint,
) -> Result<Rider, AppError> {
    if !location.is_valid() {
        return Err(AppError::BadRequest(
            "location is not a valid coordinate".to_string(),
        ));
    }

    update_rider(state, rider_id, |rider| {
        rider.location = location;
        rider.location_updated_at = Utc::now();
    })
}

fn update_rider<F>(state: &AppState, rider_id: &str, change: F) -> Result<Rider, AppError>
where
    F: Fn(&mut Rider),
{
    state
        .riders
        .update::<_, AppError>(rider_id, state.config.cas_retries, |rider| {
            change(rider);
            Ok(())
        })
}
