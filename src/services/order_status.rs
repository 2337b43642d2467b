//! Order lifecycle state machine.
//!
//! Transition rules are enforced here, at the data layer; the HTTP boundary
//! never writes status fields directly. `ensure_mutable` is the single shared
//! guard every mutating operation on an order or its items calls.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{self, Actor, Role};
use crate::entities::audit_log::AuditAction;
use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditTarget};

/// Roles allowed to perform administrative status transitions.
pub const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::SiteAdmin];

/// Whether `from -> to` is a legal lifecycle transition.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match (from, to) {
        (Pending, Paid) => true,
        (Pending, PaymentFailed) => true,
        (Pending, Cancelled) => true,
        (Paid, Shipped) => true,
        (Shipped, Delivered) => true,
        // A failed payment can be retried or the order abandoned.
        (PaymentFailed, Paid) => true,
        (PaymentFailed, Cancelled) => true,
        _ => false,
    }
}

/// Shared mutability guard: once an order is paid, its shipping snapshot and
/// line items are frozen. Called by every mutating operation, not per
/// endpoint.
pub fn ensure_mutable(order: &order::Model) -> Result<(), ServiceError> {
    if order.is_paid
        || matches!(
            order.status,
            OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered
        )
    {
        return Err(ServiceError::InvalidStateTransition(format!(
            "Order {} is paid and cannot be modified",
            order.id
        )));
    }
    Ok(())
}

/// Marks an order paid on the caller's connection. The single authoritative
/// entry point for the success path; stock deduction stays with the
/// settlement service.
pub async fn mark_paid_in_txn<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<order::Model, ServiceError> {
    if !is_valid_transition(order.status, OrderStatus::Paid) {
        return Err(ServiceError::InvalidStateTransition(format!(
            "Order {} cannot move from {} to paid",
            order.id,
            order.status.as_str()
        )));
    }

    let mut active: order::ActiveModel = order.into();
    active.status = Set(OrderStatus::Paid);
    active.is_paid = Set(true);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Sets an order's status on the caller's connection after validating the
/// transition.
pub async fn set_status_in_txn<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    new_status: OrderStatus,
) -> Result<order::Model, ServiceError> {
    if !is_valid_transition(order.status, new_status) {
        return Err(ServiceError::InvalidStateTransition(format!(
            "Order {} cannot move from {} to {}",
            order.id,
            order.status.as_str(),
            new_status.as_str()
        )));
    }

    let mut active: order::ActiveModel = order.into();
    active.status = Set(new_status);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Administrative status transition. Requires membership of one of the
    /// admin roles; validated against the transition table and audited.
    #[instrument(skip(self, actor), fields(order_id = %order_id, new_status = ?new_status))]
    pub async fn change_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &Actor,
    ) -> Result<order::Model, ServiceError> {
        auth::require_any_role(actor, ADMIN_ROLES)?;

        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order.status;
        let updated = set_status_in_txn(&txn, order, new_status).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Order(order_id),
            Some(json!({ "status": old_status })),
            Some(json!({ "status": new_status })),
            AuditAction::StatusChange,
        )
        .await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            old_status = old_status.as_str(),
            new_status = new_status.as_str(),
            "Order status changed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send status changed event");
        }

        Ok(updated)
    }

    /// Abandons an order that has not been paid: status moves to cancelled.
    /// Works for the customer too; no admin role needed, since the transition
    /// table already rejects cancelling a paid order.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: &Actor,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order.status;
        let updated = set_status_in_txn(&txn, order, OrderStatus::Cancelled).await?;

        audit::record(
            &txn,
            actor,
            AuditTarget::Order(order_id),
            Some(json!({ "status": old_status })),
            Some(json!({ "status": OrderStatus::Cancelled })),
            AuditAction::StatusChange,
        )
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, "Order cancelled");

        Ok(updated)
    }
}
