//! Payment settlement: converts a gateway verdict into committed
//! Order/Payment/Stock state.
//!
//! Gateway I/O always happens before the settlement transaction is opened, so
//! row locks are never held across a network round-trip. The gateway-callback
//! entry point and the user-initiated verify both funnel through
//! `finalize_payment`; the two paths cannot diverge.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::audit_log::AuditAction;
use crate::entities::order::{self, OrderStatus};
use crate::entities::payment::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayVerdict, PaymentGateway};
use crate::services::audit::{self, AuditTarget};
use crate::services::{carts, inventory, order_status};

const DEFAULT_METHOD: &str = "transfer";

/// A created payment together with the URL the customer completes it on.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub payment: payment::Model,
    pub payment_url: String,
}

/// Result of a settlement call. `changed` is false when the payment was
/// already terminal and the call was an idempotent no-op.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub payment: payment::Model,
    pub changed: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
        }
    }

    /// Registers a pending payment for an order with the gateway. The
    /// gateway call happens before any transaction; a second call while a
    /// pending payment exists returns that payment unchanged.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn initiate_payment(&self, order_id: Uuid) -> Result<PaymentIntent, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.status != OrderStatus::Pending || order.is_paid {
            return Err(ServiceError::InvalidStateTransition(format!(
                "Order {} is {} and cannot accept a new payment",
                order_id,
                order.status.as_str()
            )));
        }

        if let Some(existing) = order::Entity::find_by_id(order_id)
            .find_also_related(payment::Entity)
            .one(&*self.db)
            .await?
            .and_then(|(_, payment)| payment)
        {
            return match existing.status {
                PaymentStatus::Pending => Ok(PaymentIntent {
                    payment_url: existing.payment_url.clone(),
                    payment: existing,
                }),
                _ => Err(ServiceError::InvalidStateTransition(format!(
                    "Order {order_id} already has a settled payment"
                ))),
            };
        }

        // Gateway round-trip stays outside any transaction.
        let initiation = self.gateway.initiate(order.total_amount).await?;
        let payment_url = initiation.payment_url.clone();

        let payment_active = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(PaymentStatus::Pending),
            transaction_id: Set(initiation.transaction_id),
            payment_url: Set(initiation.payment_url),
            amount: Set(order.total_amount),
            method: Set(DEFAULT_METHOD.to_string()),
            payment_date: Set(None),
            ..Default::default()
        };
        let payment = payment_active.insert(&*self.db).await?;

        info!(payment_id = %payment.id, order_id = %order_id, "Payment initiated");

        Ok(PaymentIntent {
            payment_url,
            payment,
        })
    }

    /// User-initiated verification: re-queries the gateway, then settles.
    /// A gateway error or timeout is treated as a failed verdict so the
    /// order never stays stuck in pending on a dead transaction.
    #[instrument(skip(self, actor), fields(payment_id = %payment_id))]
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        actor: &Actor,
    ) -> Result<SettlementOutcome, ServiceError> {
        let payment = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;

        // Idempotent short-circuit: terminal payments skip the gateway.
        if payment.status.is_terminal() {
            return Ok(SettlementOutcome {
                payment,
                changed: false,
            });
        }

        let verdict = match self.gateway.verify(&payment.transaction_id).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Gateway verification failed; treating as failed verdict");
                GatewayVerdict::Failed
            }
        };

        self.finalize_payment(payment_id, verdict, actor).await
    }

    /// Central settlement: transitions Payment + Order, deducts stock, locks
    /// the cart, and appends the audit record, all in one transaction.
    ///
    /// Idempotent: a terminal payment is returned unchanged. On the success
    /// path an `InsufficientStock` from any line rolls the entire transaction
    /// back, leaving the payment pending; payment success and stock deduction
    /// commit together or not at all.
    #[instrument(skip(self, actor), fields(payment_id = %payment_id, verdict = ?verdict))]
    pub async fn finalize_payment(
        &self,
        payment_id: Uuid,
        verdict: GatewayVerdict,
        actor: &Actor,
    ) -> Result<SettlementOutcome, ServiceError> {
        let payment = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;

        if payment.status.is_terminal() {
            return Ok(SettlementOutcome {
                payment,
                changed: false,
            });
        }

        let txn = self.db.begin().await?;

        // Re-check under the row lock; two racing callbacks serialize here
        // and the loser sees a terminal status.
        let payment = payment::Entity::find_by_id(payment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;
        if payment.status.is_terminal() {
            return Ok(SettlementOutcome {
                payment,
                changed: false,
            });
        }

        let order = order::Entity::find_by_id(payment.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", payment.order_id))
            })?;

        let order_id = order.id;
        let user_id = order.user_id;
        let before_status = order.status;

        let settled = match verdict {
            GatewayVerdict::Success => {
                let mut active: payment::ActiveModel = payment.into();
                active.status = Set(PaymentStatus::Paid);
                active.payment_date = Set(Some(Utc::now()));
                let settled = active.update(&txn).await?;

                let order = order_status::mark_paid_in_txn(&txn, order).await?;

                // The critical step: any line failing rolls everything back.
                inventory::deduct_for_order_in_txn(&txn, order_id).await?;

                carts::lock_in_txn(&txn, user_id).await?;

                audit::record(
                    &txn,
                    actor,
                    AuditTarget::Order(order_id),
                    Some(json!({ "status": before_status })),
                    Some(json!({ "status": order.status })),
                    AuditAction::StatusChange,
                )
                .await?;

                settled
            }
            GatewayVerdict::Failed => {
                let mut active: payment::ActiveModel = payment.into();
                active.status = Set(PaymentStatus::Failed);
                let settled = active.update(&txn).await?;

                let order = set_payment_failed_in_txn(&txn, order).await?;

                audit::record(
                    &txn,
                    actor,
                    AuditTarget::Order(order_id),
                    Some(json!({ "status": before_status })),
                    Some(json!({ "status": order.status })),
                    AuditAction::StatusChange,
                )
                .await?;

                settled
            }
        };

        txn.commit().await?;

        let event = match verdict {
            GatewayVerdict::Success => {
                info!(payment_id = %payment_id, order_id = %order_id, "Payment settled: paid");
                Event::PaymentCaptured {
                    payment_id,
                    order_id,
                }
            }
            GatewayVerdict::Failed => {
                info!(payment_id = %payment_id, order_id = %order_id, "Payment settled: failed");
                Event::PaymentFailed {
                    payment_id,
                    order_id,
                }
            }
        };
        if let Err(e) = self.event_sender.send(event).await {
            tracing::warn!(error = %e, "Failed to send settlement event");
        }

        Ok(SettlementOutcome {
            payment: settled,
            changed: true,
        })
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))
    }
}

async fn set_payment_failed_in_txn<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<order::Model, ServiceError> {
    order_status::set_status_in_txn(conn, order, OrderStatus::PaymentFailed).await
}
