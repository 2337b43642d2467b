use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::actor_from_headers;
use crate::services::orders::{CreateOrderRequest, ShippingDetails};
use crate::{ApiResponse, AppState};

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

/// Shipping comes either inline or from a saved address; omitting both uses
/// the user's default address.
#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub shipping: Option<ShippingDetails>,
    pub address_id: Option<Uuid>,
}

pub async fn checkout_cart(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let shipping = match request.shipping {
        Some(shipping) => shipping,
        None => {
            state
                .services
                .addresses
                .shipping_details(request.user_id, request.address_id)
                .await?
        }
    };
    let order = state
        .services
        .orders
        .checkout_cart(request.user_id, shipping)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    let items = state.services.orders.get_order_items(id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({
        "order": order,
        "items": items,
    }))))
}

pub async fn get_order_by_code(
    State(state): State<AppState>,
    Path(code): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_follow_up_code(code)
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_shipping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(shipping): Json<ShippingDetails>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .services
        .orders
        .update_shipping(id, shipping, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .services
        .order_status
        .cancel_order(id, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}

/// Administrative transition; requires an admin role on the actor headers.
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .services
        .order_status
        .change_order_status(id, request.status, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}
