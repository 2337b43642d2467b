//! Order builder and order-level mutations.
//!
//! Creation snapshots each line's unit price from the live product and caches
//! the exact total on the order; stock is deliberately NOT deducted here.
//! Deduction happens at payment settlement, so a pending order never commits
//! inventory.

use std::sync::Arc;

use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Actor;
use crate::entities::audit_log::AuditAction;
use crate::entities::order::{self, OrderStatus};
use crate::entities::{cart, cart_item, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditTarget};
use crate::services::order_status;

/// Follow-up codes are ten-digit numbers. The range is large enough that
/// collisions are rare, but generation still retries on conflict instead of
/// assuming the first draw is free.
const FOLLOW_UP_CODE_MIN: i64 = 1_000_000_000;
const FOLLOW_UP_CODE_MAX: i64 = 9_999_999_999;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

/// Shipping destination copied verbatim onto the order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShippingDetails {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 4, max = 16, message = "Postal code must be 4-16 characters"))]
    pub postal_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[validate]
    pub lines: Vec<OrderLine>,
    #[validate]
    pub shipping: ShippingDetails,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates an order from explicit lines, snapshotting unit prices and the
    /// total. Emits `OrderCreated` and appends a creation snapshot to the
    /// audit trail.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.lines.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one line".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        // Snapshot each line's unit price from the live product.
        let mut priced_lines: Vec<(Uuid, i32, Decimal)> = Vec::with_capacity(request.lines.len());
        let mut total = Decimal::ZERO;
        for line in &request.lines {
            let product = product::Entity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is not available",
                    product.id
                )));
            }
            total += product.price * Decimal::from(line.quantity);
            priced_lines.push((product.id, line.quantity, product.price));
        }

        let order_id = Uuid::new_v4();
        let follow_up_code = generate_follow_up_code(&txn).await?;

        let order_active = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id),
            follow_up_code: Set(follow_up_code),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            shipping_full_name: Set(request.shipping.full_name.clone()),
            shipping_phone: Set(request.shipping.phone.clone()),
            shipping_address: Set(request.shipping.address.clone()),
            shipping_city: Set(request.shipping.city.clone()),
            shipping_postal_code: Set(request.shipping.postal_code.clone()),
            is_paid: Set(false),
            ..Default::default()
        };
        let order = order_active.insert(&txn).await?;

        for (product_id, quantity, price) in &priced_lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(*product_id),
                quantity: Set(*quantity),
                price: Set(*price),
                created_at: Set(chrono::Utc::now()),
            };
            item.insert(&txn).await?;
        }

        audit::record(
            &txn,
            &Actor::user(request.user_id),
            AuditTarget::Order(order_id),
            None,
            Some(json!({
                "follow_up_code": follow_up_code,
                "total_amount": total,
                "lines": priced_lines
                    .iter()
                    .map(|(pid, qty, price)| json!({
                        "product_id": pid,
                        "quantity": qty,
                        "price": price,
                    }))
                    .collect::<Vec<_>>(),
            })),
            AuditAction::Snapshot,
        )
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, follow_up_code, %total, "Order created");

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            tracing::warn!(error = %e, "Failed to send order created event");
        }

        Ok(order)
    }

    /// Converts the user's cart into an order. The cart must be unlocked and
    /// non-empty; its contents are left in place (the cart is locked later,
    /// at settlement).
    #[instrument(skip(self, shipping), fields(user_id = %user_id))]
    pub async fn checkout_cart(
        &self,
        user_id: Uuid,
        shipping: ShippingDetails,
    ) -> Result<order::Model, ServiceError> {
        let cart = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {user_id} not found")))?;

        if cart.is_locked {
            return Err(ServiceError::InvalidStateTransition(format!(
                "Cart {} is locked",
                cart.id
            )));
        }

        let items = cart
            .find_related(cart_item::Entity)
            .all(&*self.db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let lines = items
            .into_iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();

        self.create_order(CreateOrderRequest {
            user_id,
            lines,
            shipping,
        })
        .await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    /// Looks up an order by its externally shareable follow-up code.
    pub async fn get_order_by_follow_up_code(
        &self,
        code: i64,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find()
            .filter(order::Column::FollowUpCode.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order with code {code} not found")))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Replaces the shipping snapshot on an order that is not yet paid.
    #[instrument(skip(self, shipping, actor), fields(order_id = %order_id))]
    pub async fn update_shipping(
        &self,
        order_id: Uuid,
        shipping: ShippingDetails,
        actor: &Actor,
    ) -> Result<order::Model, ServiceError> {
        shipping
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        order_status::ensure_mutable(&order)?;

        let before = shipping_snapshot_json(&order);

        let mut active: order::ActiveModel = order.into();
        active.shipping_full_name = Set(shipping.full_name);
        active.shipping_phone = Set(shipping.phone);
        active.shipping_address = Set(shipping.address);
        active.shipping_city = Set(shipping.city);
        active.shipping_postal_code = Set(shipping.postal_code);
        let updated = active.update(&txn).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Order(order_id),
            Some(before),
            Some(shipping_snapshot_json(&updated)),
            AuditAction::Snapshot,
        )
        .await?;

        txn.commit().await?;

        Ok(updated)
    }

    /// Changes a line's quantity on an order that is not yet paid. The unit
    /// price snapshot is preserved; the cached total is recomputed so it
    /// stays equal to the sum of lines.
    #[instrument(skip(self, actor), fields(order_id = %order_id, item_id = %item_id))]
    pub async fn update_item_quantity(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        actor: &Actor,
    ) -> Result<order_item::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {quantity}"
            )));
        }

        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        order_status::ensure_mutable(&order)?;

        let item = order_item::Entity::find_by_id(item_id)
            .filter(order_item::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {item_id} not found")))?;

        let before = json!({ "quantity": item.quantity });
        let mut active: order_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        let updated = active.update(&txn).await?;

        recompute_total_in_txn(&txn, order).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Order(order_id),
            Some(before),
            Some(json!({ "quantity": quantity })),
            AuditAction::Snapshot,
        )
        .await?;

        txn.commit().await?;

        Ok(updated)
    }

    /// Deletes an order. Permitted only while the order is still pending.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStateTransition(format!(
                "Only pending orders can be deleted; order {} is {}",
                order_id,
                order.status.as_str()
            )));
        }

        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        order::Entity::delete_by_id(order_id).exec(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, "Order deleted");
        Ok(())
    }
}

/// Draws random codes until one is unused. Runs on the caller's connection so
/// the uniqueness check and the insert share a transaction.
async fn generate_follow_up_code<C: ConnectionTrait>(conn: &C) -> Result<i64, ServiceError> {
    loop {
        let code = rand::thread_rng().gen_range(FOLLOW_UP_CODE_MIN..=FOLLOW_UP_CODE_MAX);
        let taken = order::Entity::find()
            .filter(order::Column::FollowUpCode.eq(code))
            .one(conn)
            .await?
            .is_some();
        if !taken {
            return Ok(code);
        }
    }
}

/// Recomputes and stores the cached total from the order's current lines.
async fn recompute_total_in_txn<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<order::Model, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(conn)
        .await?;

    let total: Decimal = items.iter().map(|item| item.subtotal()).sum();

    let mut active: order::ActiveModel = order.into();
    active.total_amount = Set(total);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

fn shipping_snapshot_json(order: &order::Model) -> serde_json::Value {
    json!({
        "shipping_full_name": order.shipping_full_name,
        "shipping_phone": order.shipping_phone,
        "shipping_address": order.shipping_address,
        "shipping_city": order.shipping_city,
        "shipping_postal_code": order.shipping_postal_code,
    })
}
