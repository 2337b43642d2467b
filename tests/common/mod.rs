#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use storefront_api::{
    entities::{audit_log, product},
    events::{self, EventSender},
    gateway::{MockGateway, PaymentGateway},
    migrator::Migrator,
    AppServices,
};

/// Test harness backed by an in-memory SQLite database with the full schema
/// applied. A single pooled connection keeps the in-memory database shared
/// and serializes transactions the way row locks do on a real server.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub event_sender: EventSender,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .expect("Failed to connect to in-memory database");
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        Self {
            db: Arc::new(db),
            event_sender,
            _event_task: event_task,
        }
    }

    /// Builds the full service set with the given gateway.
    pub fn services_with_gateway(&self, gateway: Arc<dyn PaymentGateway>) -> AppServices {
        AppServices::new(self.db.clone(), self.event_sender.clone(), gateway)
    }

    /// Builds the full service set backed by a gateway that approves
    /// every transaction.
    pub fn services(&self) -> AppServices {
        self.services_with_gateway(Arc::new(MockGateway::succeeding()))
    }

    /// Inserts a product row directly, bypassing the services.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        let model = product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            stock: Set(stock),
            category_id: Set(None),
            is_active: Set(true),
            ..Default::default()
        };
        model
            .insert(&*self.db)
            .await
            .expect("Failed to seed product");
        id
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("Failed to fetch product")
            .expect("Product not found")
    }

    /// Number of audit rows for an entity.
    pub async fn audit_count(&self, entity_id: Uuid) -> u64 {
        audit_log::Entity::find()
            .filter(audit_log::Column::EntityId.eq(entity_id))
            .count(&*self.db)
            .await
            .expect("Failed to count audit rows")
    }

    pub async fn audit_rows(&self, entity_id: Uuid) -> Vec<audit_log::Model> {
        audit_log::Entity::find()
            .filter(audit_log::Column::EntityId.eq(entity_id))
            .all(&*self.db)
            .await
            .expect("Failed to fetch audit rows")
    }
}

/// A shipping destination used across the order tests.
pub fn test_shipping() -> storefront_api::services::orders::ShippingDetails {
    storefront_api::services::orders::ShippingDetails {
        full_name: "Jane Doe".to_string(),
        phone: "555-0100".to_string(),
        address: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
    }
}
