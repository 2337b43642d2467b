//! Price history tracker: the only place allowed to change prices and record
//! history.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::audit_log::AuditAction;
use crate::entities::{price_history, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditTarget};

#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Changes a product's price, closing the open history interval and
    /// opening a new one. All four writes (close, open, cached price, audit)
    /// commit together; a reader never observes zero or two open intervals.
    #[instrument(skip(self, actor), fields(product_id = %product_id, new_price = %new_price))]
    pub async fn change_price(
        &self,
        product_id: Uuid,
        new_price: Decimal,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        if new_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Price must be positive, got {new_price}"
            )));
        }

        let txn = self.db.begin().await?;

        let locked = product::Entity::find_by_id(product_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        // No-op guard: avoid spurious history rows and audit entries.
        if locked.price == new_price {
            return Ok(locked);
        }

        let old_price = locked.price;
        let now = Utc::now();

        // Close the currently open interval for this product.
        price_history::Entity::update_many()
            .col_expr(
                price_history::Column::ValidTo,
                sea_orm::sea_query::Expr::value(now),
            )
            .filter(price_history::Column::ProductId.eq(product_id))
            .filter(price_history::Column::ValidTo.is_null())
            .exec(&txn)
            .await?;

        // Open the new interval.
        let entry = price_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            price: Set(new_price),
            valid_from: Set(now),
            valid_to: Set(None),
            created_at: Set(now),
        };
        entry.insert(&txn).await?;

        // Refresh the cached current price.
        let mut active: product::ActiveModel = locked.into();
        active.price = Set(new_price);
        let updated = active.update(&txn).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Product(product_id),
            Some(json!({ "price": old_price })),
            Some(json!({ "price": new_price })),
            AuditAction::PriceChange,
        )
        .await?;

        txn.commit().await?;

        info!(product_id = %product_id, %old_price, %new_price, "Price changed");

        if let Err(e) = self
            .event_sender
            .send(Event::PriceChanged {
                product_id,
                old_price,
                new_price,
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send price changed event");
        }

        Ok(updated)
    }

    /// Current price as a derived read: the open history interval when one
    /// exists, the cached product field otherwise (products created before
    /// their first price change have no history yet).
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn current_price(&self, product_id: Uuid) -> Result<Decimal, ServiceError> {
        let open_entry = price_history::Entity::find()
            .filter(price_history::Column::ProductId.eq(product_id))
            .filter(price_history::Column::ValidTo.is_null())
            .one(&*self.db)
            .await?;

        if let Some(entry) = open_entry {
            return Ok(entry.price);
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        Ok(product.price)
    }
}
