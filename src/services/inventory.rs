//! Stock ledger: the only place stock is allowed to change.
//!
//! Every mutation acquires an exclusive row lock on the product before
//! reading the value it validates against, and holds it until the write
//! commits. Callers never touch the stock column directly, so the locking
//! discipline cannot be bypassed.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::audit_log::AuditAction;
use crate::entities::{order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditTarget};

/// Deducts `quantity` units from a product on the caller's connection.
///
/// Locks the product row, validates against the locked value, and writes the
/// decrement. Fails with a structured `InsufficientStock` when the request
/// exceeds the locked stock; no partial deduction occurs.
pub async fn deduct_in_txn<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Deduction quantity must be positive, got {quantity}"
        )));
    }

    let locked = product::Entity::find_by_id(product_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

    if locked.stock < quantity {
        return Err(ServiceError::InsufficientStock {
            product_id,
            requested: quantity,
            available: locked.stock,
        });
    }

    let new_stock = locked.stock - quantity;
    let mut active: product::ActiveModel = locked.into();
    active.stock = Set(new_stock);
    active.update(conn).await?;

    Ok(())
}

/// Deducts stock for every line of an order on the caller's connection.
/// If any line fails, the error propagates and the caller's transaction
/// rolls back as a whole; partial deduction is never observable.
pub async fn deduct_for_order_in_txn<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for item in items {
        deduct_in_txn(conn, item.product_id, item.quantity).await?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Deducts stock in its own transaction.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn deduct(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        deduct_in_txn(&txn, product_id, quantity).await?;
        txn.commit().await?;

        info!(product_id = %product_id, quantity = quantity, "Stock deducted");

        if let Err(e) = self
            .event_sender
            .send(Event::StockDeducted {
                product_id,
                quantity,
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send stock deducted event");
        }

        Ok(())
    }

    /// Applies a signed manual correction under the same locking discipline.
    /// Does not reject negative results; administrative callers own that
    /// check. Appends a stock-adjustment audit record in the same
    /// transaction.
    #[instrument(skip(self, actor), fields(product_id = %product_id, delta = delta))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        delta: i32,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let locked = product::Entity::find_by_id(product_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let old_stock = locked.stock;
        let new_stock = old_stock + delta;

        let mut active: product::ActiveModel = locked.into();
        active.stock = Set(new_stock);
        let updated = active.update(&txn).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Product(product_id),
            Some(json!({ "stock": old_stock })),
            Some(json!({ "stock": new_stock, "delta": delta })),
            AuditAction::StockAdjustment,
        )
        .await?;

        txn.commit().await?;

        info!(product_id = %product_id, old_stock, new_stock, "Stock adjusted");

        if let Err(e) = self
            .event_sender
            .send(Event::StockAdjusted { product_id, delta })
            .await
        {
            tracing::warn!(error = %e, "Failed to send stock adjusted event");
        }

        Ok(updated)
    }

    /// Current stock for a product.
    pub async fn available(&self, product_id: Uuid) -> Result<i32, ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        Ok(product.stock)
    }
}
