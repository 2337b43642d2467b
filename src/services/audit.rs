//! Append-only audit trail.
//!
//! Records are written on the caller's connection: when the caller is inside
//! a transaction, a failed audit insert aborts that transaction. The trail is
//! the only source of truth for "what happened" in a financial flow, so it is
//! never best-effort.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::audit_log::{self, AuditAction, AuditEntityKind};
use crate::errors::ServiceError;

/// The entity an audit record is about: a closed set of kinds plus an opaque
/// id, so audit readers stay type-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditTarget {
    Order(Uuid),
    Product(Uuid),
    Payment(Uuid),
    Cart(Uuid),
}

impl AuditTarget {
    pub fn kind(&self) -> AuditEntityKind {
        match self {
            AuditTarget::Order(_) => AuditEntityKind::Order,
            AuditTarget::Product(_) => AuditEntityKind::Product,
            AuditTarget::Payment(_) => AuditEntityKind::Payment,
            AuditTarget::Cart(_) => AuditEntityKind::Cart,
        }
    }

    pub fn id(&self) -> Uuid {
        match *self {
            AuditTarget::Order(id)
            | AuditTarget::Product(id)
            | AuditTarget::Payment(id)
            | AuditTarget::Cart(id) => id,
        }
    }
}

/// Appends one audit record on the given connection.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    actor: &Actor,
    target: AuditTarget,
    before: Option<Value>,
    after: Option<Value>,
    action: AuditAction,
) -> Result<audit_log::Model, ServiceError> {
    let entry = audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        entity_kind: Set(target.kind()),
        entity_id: Set(target.id()),
        action: Set(action),
        before: Set(before),
        after: Set(after),
        actor_id: Set(actor.id),
        created_at: Set(Utc::now()),
    };

    entry.insert(conn).await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_maps_to_kind_and_id() {
        let id = Uuid::new_v4();
        let target = AuditTarget::Payment(id);
        assert_eq!(target.kind(), AuditEntityKind::Payment);
        assert_eq!(target.id(), id);

        assert_eq!(AuditTarget::Order(id).kind(), AuditEntityKind::Order);
        assert_eq!(AuditTarget::Product(id).kind(), AuditEntityKind::Product);
        assert_eq!(AuditTarget::Cart(id).kind(), AuditEntityKind::Cart);
    }
}
