use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::errors::ServiceError;
use crate::gateway::GatewayVerdict;
use crate::handlers::actor_from_headers;
use crate::{ApiResponse, AppState};

pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let intent = state.services.payments.initiate_payment(order_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(intent))))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::ok(payment)))
}

/// User-initiated verification. Funnels into the same settlement function as
/// the gateway callback.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state.services.payments.verify_payment(id, &actor).await?;
    let message = if outcome.changed {
        "payment settled"
    } else {
        "no change"
    };
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub status: GatewayVerdict,
}

/// Push-style callback from the gateway carrying the verdict as data.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CallbackRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .payments
        .finalize_payment(id, request.status, &Actor::system())
        .await?;
    let message = if outcome.changed {
        "payment settled"
    } else {
        "no change"
    };
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}
