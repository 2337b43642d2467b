//! Product and category management.
//!
//! Catalog writes are administrative. Price changes do not live here: they go
//! through `PricingService` so the history interval bookkeeping cannot be
//! bypassed.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, Actor};
use crate::entities::audit_log::AuditAction;
use crate::entities::{category, product};
use crate::errors::ServiceError;
use crate::services::audit::{self, AuditTarget};
use crate::services::order_status::ADMIN_ROLES;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request, actor), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        auth::require_any_role(actor, ADMIN_ROLES)?;
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Price must be positive, got {}",
                request.price
            )));
        }
        if let Some(category_id) = request.category_id {
            category::Entity::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category {category_id} not found"))
                })?;
        }

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            description: Set(request.description),
            price: Set(request.price),
            stock: Set(request.stock),
            category_id: Set(request.category_id),
            is_active: Set(true),
            ..Default::default()
        };
        let product = model.insert(&*self.db).await?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    /// Active products, optionally narrowed to one category.
    pub async fn list_products(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name);
        if let Some(category_id) = category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        query.all(&*self.db).await.map_err(ServiceError::DatabaseError)
    }

    /// Toggles product visibility. Inactive products stay readable by id so
    /// historical orders can still resolve them, but they no longer list,
    /// sell, or enter carts.
    #[instrument(skip(self, actor), fields(product_id = %product_id, active = active))]
    pub async fn set_product_active(
        &self,
        product_id: Uuid,
        active: bool,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        auth::require_any_role(actor, ADMIN_ROLES)?;

        let product = self.get_product(product_id).await?;
        if product.is_active == active {
            return Ok(product);
        }

        let was_active = product.is_active;
        let mut active_model: product::ActiveModel = product.into();
        active_model.is_active = Set(active);
        let updated = active_model.update(&*self.db).await?;

        audit::record(
            &*self.db,
            actor,
            AuditTarget::Product(product_id),
            Some(json!({ "is_active": was_active })),
            Some(json!({ "is_active": active })),
            AuditAction::Snapshot,
        )
        .await?;

        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(name = %name))]
    pub async fn create_category(
        &self,
        name: String,
        slug: Option<String>,
        actor: &Actor,
    ) -> Result<category::Model, ServiceError> {
        auth::require_any_role(actor, ADMIN_ROLES)?;
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Category name is required".to_string(),
            ));
        }

        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            // Empty slug is filled from the name in before_save.
            slug: Set(slug.unwrap_or_default()),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await?;

        info!(category_id = %created.id, slug = %created.slug, "Category created");
        Ok(created)
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
