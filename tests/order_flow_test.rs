mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{test_shipping, TestApp};
use storefront_api::auth::Actor;
use storefront_api::entities::order::OrderStatus;
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::{CreateOrderRequest, OrderLine, ShippingDetails};

fn one_line_request(user_id: Uuid, product_id: Uuid, quantity: i32) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id,
        lines: vec![OrderLine {
            product_id,
            quantity,
        }],
        shipping: test_shipping(),
    }
}

#[tokio::test]
async fn create_order_snapshots_prices_and_total() {
    let app = TestApp::new().await;
    let services = app.services();
    let user_id = Uuid::new_v4();
    let widget = app.seed_product("Widget", dec!(100.00), 10).await;
    let gadget = app.seed_product("Gadget", dec!(40.00), 10).await;

    let order = services
        .orders
        .create_order(CreateOrderRequest {
            user_id,
            lines: vec![
                OrderLine {
                    product_id: widget,
                    quantity: 3,
                },
                OrderLine {
                    product_id: gadget,
                    quantity: 1,
                },
            ],
            shipping: test_shipping(),
        })
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.is_paid);
    assert_eq!(order.total_amount, dec!(340.00));
    assert_eq!(order.shipping_city, "Springfield");

    let items = services.orders.get_order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 2);
    let widget_line = items.iter().find(|i| i.product_id == widget).unwrap();
    assert_eq!(widget_line.quantity, 3);
    assert_eq!(widget_line.price, dec!(100.00));

    // Order creation does not touch stock; deduction happens at settlement.
    assert_eq!(app.product(widget).await.stock, 10);
}

#[tokio::test]
async fn follow_up_code_is_ten_digits_and_resolvable() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    assert!(order.follow_up_code >= 1_000_000_000);
    assert!(order.follow_up_code <= 9_999_999_999);

    let found = services
        .orders
        .get_order_by_follow_up_code(order.follow_up_code)
        .await
        .unwrap();
    assert_eq!(found.id, order.id);
}

#[tokio::test]
async fn create_order_rejects_bad_input() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;
    let user_id = Uuid::new_v4();

    // Zero quantity.
    let err = services
        .orders
        .create_order(one_line_request(user_id, product_id, 0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // No lines.
    let err = services
        .orders
        .create_order(CreateOrderRequest {
            user_id,
            lines: vec![],
            shipping: test_shipping(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Unknown product.
    let err = services
        .orders
        .create_order(one_line_request(user_id, Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn later_price_change_leaves_snapshot_untouched() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(100.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 3))
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec!(300.00));

    services
        .pricing
        .change_price(product_id, dec!(150.00), &actor)
        .await
        .unwrap();

    let items = services.orders.get_order_items(order.id).await.unwrap();
    assert_eq!(items[0].price, dec!(100.00));
    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.total_amount, dec!(300.00));
}

#[tokio::test]
async fn update_item_quantity_recomputes_total_with_snapshot_price() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(100.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 2))
        .await
        .unwrap();

    // Price changes after creation must not leak into the recomputation.
    services
        .pricing
        .change_price(product_id, dec!(999.00), &actor)
        .await
        .unwrap();

    let items = services.orders.get_order_items(order.id).await.unwrap();
    let updated = services
        .orders
        .update_item_quantity(order.id, items[0].id, 5, &actor)
        .await
        .unwrap();
    assert_eq!(updated.quantity, 5);
    assert_eq!(updated.price, dec!(100.00));

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.total_amount, dec!(500.00));
}

#[tokio::test]
async fn update_shipping_replaces_snapshot_and_audits() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    let updated = services
        .orders
        .update_shipping(
            order.id,
            ShippingDetails {
                full_name: "John Roe".to_string(),
                phone: "555-0199".to_string(),
                address: "9 Side St".to_string(),
                city: "Shelbyville".to_string(),
                postal_code: "54321".to_string(),
            },
            &actor,
        )
        .await
        .unwrap();

    assert_eq!(updated.shipping_full_name, "John Roe");
    assert_eq!(updated.shipping_city, "Shelbyville");

    // Creation snapshot plus the shipping update.
    assert_eq!(app.audit_count(order.id).await, 2);
}

#[tokio::test]
async fn paid_order_is_immutable() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    let intent = services.payments.initiate_payment(order.id).await.unwrap();
    services
        .payments
        .verify_payment(intent.payment.id, &actor)
        .await
        .unwrap();

    let err = services
        .orders
        .update_shipping(order.id, test_shipping(), &actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));

    let items = services.orders.get_order_items(order.id).await.unwrap();
    let err = services
        .orders
        .update_item_quantity(order.id, items[0].id, 2, &actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));

    let err = services.orders.delete_order(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));
}

#[tokio::test]
async fn pending_order_can_be_deleted() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    services.orders.delete_order(order.id).await.unwrap();

    let err = services.orders.get_order(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert!(services
        .orders
        .get_order_items(order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn status_transitions_follow_the_lifecycle() {
    let app = TestApp::new().await;
    let services = app.services();
    let admin = Actor::with_roles(Uuid::new_v4(), [storefront_api::auth::Role::SiteAdmin]);
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    // Pending orders cannot jump straight to shipped.
    let err = services
        .order_status
        .change_order_status(order.id, OrderStatus::Shipped, &admin)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));

    let intent = services.payments.initiate_payment(order.id).await.unwrap();
    services
        .payments
        .verify_payment(intent.payment.id, &admin)
        .await
        .unwrap();

    let order = services
        .order_status
        .change_order_status(order.id, OrderStatus::Shipped, &admin)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);

    let order = services
        .order_status
        .change_order_status(order.id, OrderStatus::Delivered, &admin)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn cancellation_works_until_payment_and_not_after() {
    let app = TestApp::new().await;
    let services = app.services();
    let customer = Actor::user(Uuid::new_v4());
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    let cancelled = services
        .order_status
        .cancel_order(order.id, &customer)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // A paid order cannot be cancelled.
    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();
    let intent = services.payments.initiate_payment(order.id).await.unwrap();
    services
        .payments
        .verify_payment(intent.payment.id, &customer)
        .await
        .unwrap();

    let err = services
        .order_status
        .cancel_order(order.id, &customer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));
}

#[tokio::test]
async fn status_change_requires_an_admin_role() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    let order = services
        .orders
        .create_order(one_line_request(Uuid::new_v4(), product_id, 1))
        .await
        .unwrap();

    let customer = Actor::user(Uuid::new_v4());
    let err = services
        .order_status
        .change_order_status(order.id, OrderStatus::Cancelled, &customer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let order = services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}
