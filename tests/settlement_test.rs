mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::{test_shipping, TestApp};
use storefront_api::auth::Actor;
use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::payment::PaymentStatus;
use storefront_api::entities::{cart, order};
use storefront_api::errors::ServiceError;
use storefront_api::gateway::{GatewayVerdict, MockGateway};
use storefront_api::services::orders::{CreateOrderRequest, OrderLine};
use storefront_api::services::payments::PaymentIntent;
use storefront_api::AppServices;

async fn place_order(
    services: &AppServices,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> (order::Model, PaymentIntent) {
    let order = services
        .orders
        .create_order(CreateOrderRequest {
            user_id,
            lines: vec![OrderLine {
                product_id,
                quantity,
            }],
            shipping: test_shipping(),
        })
        .await
        .unwrap();
    let intent = services.payments.initiate_payment(order.id).await.unwrap();
    assert_eq!(intent.payment.status, PaymentStatus::Pending);
    assert!(!intent.payment_url.is_empty());
    (order, intent)
}

async fn cart_for(app: &TestApp, user_id: Uuid) -> Option<cart::Model> {
    cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(&*app.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn successful_settlement_commits_everything_together() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    // Go through the cart so settlement has one to lock.
    services.carts.add_item(user_id, product_id, 4).await.unwrap();
    let order = services
        .orders
        .checkout_cart(user_id, test_shipping())
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec!(100.00));

    let intent = services.payments.initiate_payment(order.id).await.unwrap();
    let outcome = services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.payment.status, PaymentStatus::Paid);
    assert!(outcome.payment.payment_date.is_some());

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.is_paid);

    assert_eq!(app.product(product_id).await.stock, 6);

    let cart = cart_for(&app, user_id).await.unwrap();
    assert!(cart.is_locked);

    // Creation snapshot plus the settlement status change.
    assert_eq!(app.audit_count(order.id).await, 2);
}

#[tokio::test]
async fn settlement_is_idempotent() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, intent) =
        place_order(&services, Uuid::new_v4(), product_id, 4).await;

    let first = services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();
    assert!(first.changed);

    // Retried callbacks and user refreshes settle nothing twice.
    let second = services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();
    assert!(!second.changed);
    assert_eq!(second.payment.status, PaymentStatus::Paid);

    let third = services
        .payments
        .finalize_payment(intent.payment.id, GatewayVerdict::Success, &actor)
        .await
        .unwrap();
    assert!(!third.changed);

    // Stock deducted exactly once, one settlement audit row.
    assert_eq!(app.product(product_id).await.stock, 6);
    assert_eq!(app.audit_count(order.id).await, 2);
}

#[tokio::test]
async fn failed_verdict_leaves_stock_untouched() {
    let app = TestApp::new().await;
    let services = app.services_with_gateway(Arc::new(MockGateway::failing()));
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, intent) =
        place_order(&services, Uuid::new_v4(), product_id, 4).await;

    let outcome = services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
    assert!(outcome.payment.payment_date.is_none());

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::PaymentFailed);
    assert!(!order.is_paid);

    assert_eq!(app.product(product_id).await.stock, 10);
    assert_eq!(app.audit_count(order.id).await, 2);
}

#[tokio::test]
async fn insufficient_stock_at_settlement_rolls_back() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, intent) =
        place_order(&services, Uuid::new_v4(), product_id, 4).await;

    // Stock drains between order placement and settlement.
    services.stock.deduct(product_id, 8).await.unwrap();

    let err = services
        .payments
        .finalize_payment(intent.payment.id, GatewayVerdict::Success, &actor)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 4,
            available: 2,
            ..
        }
    );

    // Nothing from the settlement survived, the payment can be retried.
    let payment = services
        .payments
        .get_payment(intent.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.is_paid);
    assert_eq!(app.product(product_id).await.stock, 2);
}

#[tokio::test]
async fn last_units_settle_exactly_once() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 1).await;

    let (_, first) = place_order(&services, Uuid::new_v4(), product_id, 1).await;
    let (_, second) = place_order(&services, Uuid::new_v4(), product_id, 1).await;

    let (a, b) = tokio::join!(
        services
            .payments
            .finalize_payment(first.payment.id, GatewayVerdict::Success, &actor),
        services
            .payments
            .finalize_payment(second.payment.id, GatewayVerdict::Success, &actor),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let loser = if a.is_err() { a } else { b };
    assert_matches!(loser.unwrap_err(), ServiceError::InsufficientStock { .. });

    assert_eq!(app.product(product_id).await.stock, 0);
}

#[tokio::test]
async fn initiate_payment_is_reusable_while_pending() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, first) = place_order(&services, Uuid::new_v4(), product_id, 2).await;

    // A second initiation returns the same pending payment and URL rather
    // than opening a second gateway transaction.
    let second = services.payments.initiate_payment(order.id).await.unwrap();
    assert_eq!(second.payment.id, first.payment.id);
    assert_eq!(second.payment_url, first.payment_url);
}

#[tokio::test]
async fn initiate_payment_rejects_settled_orders() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, intent) =
        place_order(&services, Uuid::new_v4(), product_id, 2).await;
    services
        .payments
        .finalize_payment(intent.payment.id, GatewayVerdict::Success, &actor)
        .await
        .unwrap();

    let err = services.payments.initiate_payment(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));
}

#[tokio::test]
async fn gateway_error_during_verify_fails_the_payment() {
    let app = TestApp::new().await;
    let services = app.services_with_gateway(Arc::new(MockGateway::erroring()));
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(25.00), 10).await;

    let (order, intent) =
        place_order(&services, Uuid::new_v4(), product_id, 2).await;

    let outcome = services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.payment.status, PaymentStatus::Failed);

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::PaymentFailed);
}
