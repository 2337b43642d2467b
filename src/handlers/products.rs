use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require_any_role, Role};
use crate::errors::ServiceError;
use crate::handlers::actor_from_headers;
use crate::services::catalog::CreateProductRequest;
use crate::{ApiResponse, AppState};

const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::SiteAdmin];

pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let product = state.services.catalog.create_product(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

#[derive(Deserialize)]
pub struct ListProductsQuery {
    pub category_id: Option<Uuid>,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.catalog.list_products(query.category_id).await?;
    Ok(Json(ApiResponse::ok(products)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::ok(product)))
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub async fn set_product_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let product = state
        .services
        .catalog
        .set_product_active(id, request.active, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(product)))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
}

pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    let category = state
        .services
        .catalog
        .create_category(request.name, request.slug, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(category))))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(ApiResponse::ok(categories)))
}

#[derive(Deserialize)]
pub struct ChangePriceRequest {
    pub price: Decimal,
}

pub async fn change_price(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ChangePriceRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    require_any_role(&actor, ADMIN_ROLES)?;

    let product = state
        .services
        .pricing
        .change_price(id, request.price, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(product)))
}

#[derive(Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i32,
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = actor_from_headers(&headers)?;
    require_any_role(&actor, ADMIN_ROLES)?;

    let product = state
        .services
        .stock
        .adjust(id, request.delta, &actor)
        .await?;
    Ok(Json(ApiResponse::ok(product)))
}
