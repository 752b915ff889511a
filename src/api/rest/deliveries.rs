use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::engine::dispatch::{self, NewDelivery};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, Location};
use crate::models::matching::RiderMatch;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/match", get(match_rider))
        .route("/deliveries/:id/assign", post(assign))
        .route("/deliveries/:id/advance", post(advance))
        .route("/deliveries/:id/cancel", post(cancel))
        .route("/deliveries/:id/fail", post(fail))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub id: Option<String>,
    pub company_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub base_fare: Decimal,
    pub distance_fare: Decimal,
    pub total_override: Option<Decimal>,
}

#[derive(Deserialize)]
pub struct ListDeliveriesQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub rider_id: String,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = dispatch::create_delivery(
        &state,
        NewDelivery {
            id: payload.id,
            company_id: payload.company_id,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            base_fare: payload.base_fare,
            distance_fare: payload.distance_fare,
            total_override: payload.total_override,
        },
    )?;

    Ok(Json(delivery))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;

    let deliveries = state
        .deliveries
        .list()
        .into_iter()
        .filter(|delivery| status.is_none_or(|status| delivery.status == status))
        .collect();

    Ok(Json(deliveries))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.deliveries.get(&id)?))
}

async fn match_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RiderMatch>, AppError> {
    Ok(Json(dispatch::suggest_rider(&state, &id)?))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(dispatch::assign_delivery(&state, &id, &payload.rider_id)?))
}

async fn advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Delivery>, AppError> {
    let target = parse_status(&payload.status)?;
    Ok(Json(dispatch::advance_delivery(&state, &id, target)?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(dispatch::cancel_delivery(&state, &id, &payload.reason)?))
}

async fn fail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(dispatch::fail_delivery(&state, &id, &payload.reason)?))
}

fn parse_status(raw: &str) -> Result<DeliveryStatus, AppError> {
    raw.parse::<DeliveryStatus>()
        .map_err(|err| AppError::BadRequest(err.to_string()))
}
