use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a state-changing operation: who did what to which
/// entity, with before/after snapshots. Never updated or deleted by normal
/// operation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entity_kind: AuditEntityKind,
    pub entity_id: Uuid,
    pub action: AuditAction,
    #[sea_orm(column_type = "Json", nullable)]
    pub before: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub after: Option<Json>,
    /// None for system-triggered actions (gateway callbacks, jobs).
    #[sea_orm(nullable)]
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// The finite set of auditable entity kinds. A closed enum keeps audit
/// readers type-safe; the id stays opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityKind {
    #[sea_orm(string_value = "order")]
    Order,
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "cart")]
    Cart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[sea_orm(string_value = "status_change")]
    StatusChange,
    #[sea_orm(string_value = "price_change")]
    PriceChange,
    #[sea_orm(string_value = "stock_adjustment")]
    StockAdjustment,
    #[sea_orm(string_value = "snapshot")]
    Snapshot,
}
