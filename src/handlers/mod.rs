//! Thin HTTP boundary. Handlers deserialize, call one service method, and
//! wrap the result; every state change routes through the service layer.

pub mod addresses;
pub mod carts;
pub mod orders;
pub mod payments;
pub mod products;

use axum::{
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::errors::ServiceError;
use crate::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(orders::create_order))
        .route("/orders/checkout", post(orders::checkout_cart))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id", delete(orders::delete_order))
        .route("/orders/:id/shipping", put(orders::update_shipping))
        .route("/orders/:id/status", post(orders::change_status))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/payments", post(payments::initiate_payment))
        .route("/orders/by-code/:code", get(orders::get_order_by_code))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/verify", post(payments::verify_payment))
        .route("/payments/:id/callback", post(payments::gateway_callback))
        .route("/products", post(products::create_product))
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/products/:id/active", put(products::set_product_active))
        .route("/products/:id/price", put(products::change_price))
        .route("/products/:id/stock", post(products::adjust_stock))
        .route("/categories", post(products::create_category))
        .route("/categories", get(products::list_categories))
        .route("/users/:user_id/addresses", post(addresses::add_address))
        .route("/users/:user_id/addresses", get(addresses::list_addresses))
        .route(
            "/users/:user_id/addresses/:address_id/default",
            put(addresses::set_default),
        )
        .route(
            "/users/:user_id/addresses/:address_id",
            delete(addresses::remove_address),
        )
        .route("/users/:user_id/cart", get(carts::get_cart))
        .route("/users/:user_id/cart/items", post(carts::add_item))
        .route(
            "/users/:user_id/cart/items/:product_id",
            put(carts::set_item_quantity),
        )
        .route(
            "/users/:user_id/cart/items/:product_id",
            delete(carts::remove_item),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Builds the acting identity from the `X-Actor-Id` / `X-Actor-Roles`
/// headers. Token issuance and verification are an upstream concern; absent
/// headers yield the system actor.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ServiceError> {
    let id = match headers.get("x-actor-id") {
        Some(value) => {
            let raw = value.to_str().map_err(|_| {
                ServiceError::ValidationError("Invalid X-Actor-Id header".to_string())
            })?;
            Some(Uuid::parse_str(raw).map_err(|_| {
                ServiceError::ValidationError("X-Actor-Id must be a UUID".to_string())
            })?)
        }
        None => None,
    };

    let mut actor = Actor {
        id,
        ..Actor::default()
    };

    if let Some(value) = headers.get("x-actor-roles") {
        let raw = value.to_str().map_err(|_| {
            ServiceError::ValidationError("Invalid X-Actor-Roles header".to_string())
        })?;
        for part in raw.split(',').filter(|s| !s.trim().is_empty()) {
            actor.roles.insert(part.parse::<Role>()?);
        }
    }

    Ok(actor)
}
