//! Storefront API Library
//!
//! Core of an e-commerce backend: the order/payment/inventory consistency
//! pipeline, with a thin HTTP boundary on top.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::{
    addresses::AddressService, carts::CartService, catalog::CatalogService,
    inventory::StockLedger, order_status::OrderStatusService, orders::OrderService,
    payments::PaymentService, pricing::PricingService,
};

/// The service set the HTTP boundary dispatches into.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub stock: Arc<StockLedger>,
    pub pricing: Arc<PricingService>,
    pub carts: Arc<CartService>,
    pub catalog: Arc<CatalogService>,
    pub addresses: Arc<AddressService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            order_status: Arc::new(OrderStatusService::new(db.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(
                db.clone(),
                event_sender.clone(),
                gateway,
            )),
            stock: Arc::new(StockLedger::new(db.clone(), event_sender.clone())),
            pricing: Arc::new(PricingService::new(db.clone(), event_sender.clone())),
            carts: Arc::new(CartService::new(db.clone(), event_sender)),
            catalog: Arc::new(CatalogService::new(db.clone())),
            addresses: Arc::new(AddressService::new(db)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

/// Common response wrapper for the HTTP boundary.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}
