use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::addresses::SaveAddressRequest;
use crate::{ApiResponse, AppState};

pub async fn add_address(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SaveAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state.services.addresses.add_address(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(address))))
}

pub async fn list_addresses(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state.services.addresses.list_addresses(user_id).await?;
    Ok(Json(ApiResponse::ok(addresses)))
}

pub async fn set_default(
    State(state): State<AppState>,
    Path((user_id, address_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .addresses
        .set_default(user_id, address_id)
        .await?;
    Ok(Json(ApiResponse::ok(address)))
}

pub async fn remove_address(
    State(state): State<AppState>,
    Path((user_id, address_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .addresses
        .remove_address(user_id, address_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
