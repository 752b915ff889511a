use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::roster::{self, NewRider};
use crate::error::AppError;
use crate::models::rider::{GeoPoint, Rider};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(create_rider).get(list_riders))
        .route("/riders/:id", get(get_rider))
        .route("/riders/:id/availability", patch(update_availability))
        .route("/riders/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct CreateRiderRequest {
    pub id: Option<String>,
    pub company_id: String,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub online: bool,
}

#[derive(Deserialize)]
pub struct ListRidersQuery {
    pub company_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    let rider = roster::create_rider(
        &state,
        NewRider {
            id: payload.id,
            company_id: payload.company_id,
            name: payload.name,
            phone: payload.phone,
            location: payload.location,
            online: payload.online,
        },
    )?;

    Ok(Json(rider))
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRidersQuery>,
) -> Json<Vec<Rider>> {
    let riders = state
        .riders
        .list()
        .into_iter()
        .filter(|rider| {
            query
                .company_id
                .as_deref()
                .is_none_or(|company| rider.company_id == company)
        })
        .collect();

    Json(riders)
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(state.riders.get(&id)?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(roster::set_availability(&state, &id, payload.online)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(roster::update_location(&state, &id, payload.location)?))
}
