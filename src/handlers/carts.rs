use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_or_create_cart(user_id).await?;
    let items = state.services.carts.get_items(user_id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({
        "cart": cart,
        "items": items,
    }))))
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .carts
        .add_item(user_id, request.product_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

pub async fn set_item_quantity(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SetQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .carts
        .set_item_quantity(user_id, product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::ok(item)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
