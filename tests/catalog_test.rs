mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;
use storefront_api::auth::{Actor, Role};
use storefront_api::errors::ServiceError;
use storefront_api::services::addresses::SaveAddressRequest;
use storefront_api::services::catalog::CreateProductRequest;

fn admin() -> Actor {
    Actor::with_roles(Uuid::new_v4(), [Role::SiteAdmin])
}

fn save_address(label: &str, is_default: bool) -> SaveAddressRequest {
    SaveAddressRequest {
        label: label.to_string(),
        full_name: "Jane Doe".to_string(),
        phone: "555-0100".to_string(),
        line1: format!("{label} street 1"),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
        is_default,
    }
}

#[tokio::test]
async fn create_product_under_a_category() {
    let app = TestApp::new().await;
    let services = app.services();
    let admin = admin();

    let category = services
        .catalog
        .create_category("Home & Garden".to_string(), None, &admin)
        .await
        .unwrap();
    assert_eq!(category.slug, "home-garden");

    let product = services
        .catalog
        .create_product(
            CreateProductRequest {
                name: "Trowel".to_string(),
                description: Some("Hand trowel".to_string()),
                price: dec!(12.00),
                stock: 30,
                category_id: Some(category.id),
            },
            &admin,
        )
        .await
        .unwrap();
    assert!(product.is_active);

    let listed = services
        .catalog
        .list_products(Some(category.id))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, product.id);
}

#[tokio::test]
async fn catalog_writes_require_an_admin_role() {
    let app = TestApp::new().await;
    let services = app.services();
    let customer = Actor::user(Uuid::new_v4());

    let err = services
        .catalog
        .create_category("Books".to_string(), None, &customer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = services
        .catalog
        .create_product(
            CreateProductRequest {
                name: "Novel".to_string(),
                description: None,
                price: dec!(8.00),
                stock: 5,
                category_id: None,
            },
            &customer,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn deactivated_product_stops_listing_and_selling() {
    let app = TestApp::new().await;
    let services = app.services();
    let admin = admin();
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    services
        .catalog
        .set_product_active(product_id, false, &admin)
        .await
        .unwrap();

    assert!(services.catalog.list_products(None).await.unwrap().is_empty());

    // Still readable by id for historical orders.
    let product = services.catalog.get_product(product_id).await.unwrap();
    assert!(!product.is_active);

    let err = services
        .carts
        .add_item(user_id, product_id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn first_address_becomes_the_default() {
    let app = TestApp::new().await;
    let services = app.services();
    let user_id = Uuid::new_v4();

    let home = services
        .addresses
        .add_address(user_id, save_address("home", false))
        .await
        .unwrap();
    assert!(home.is_default);

    let work = services
        .addresses
        .add_address(user_id, save_address("work", false))
        .await
        .unwrap();
    assert!(!work.is_default);
}

#[tokio::test]
async fn promoting_a_default_demotes_the_previous_one() {
    let app = TestApp::new().await;
    let services = app.services();
    let user_id = Uuid::new_v4();

    let home = services
        .addresses
        .add_address(user_id, save_address("home", false))
        .await
        .unwrap();
    let work = services
        .addresses
        .add_address(user_id, save_address("work", true))
        .await
        .unwrap();
    assert!(work.is_default);

    services.addresses.set_default(user_id, home.id).await.unwrap();

    let addresses = services.addresses.list_addresses(user_id).await.unwrap();
    let defaults: Vec<_> = addresses.iter().filter(|a| a.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, home.id);
}

#[tokio::test]
async fn default_address_cannot_be_deleted() {
    let app = TestApp::new().await;
    let services = app.services();
    let user_id = Uuid::new_v4();

    let home = services
        .addresses
        .add_address(user_id, save_address("home", false))
        .await
        .unwrap();

    let err = services
        .addresses
        .remove_address(user_id, home.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition(_));

    // Another user cannot touch it either.
    let err = services
        .addresses
        .remove_address(Uuid::new_v4(), home.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn checkout_snapshots_the_default_address() {
    let app = TestApp::new().await;
    let services = app.services();
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Widget", dec!(10.00), 10).await;

    services
        .addresses
        .add_address(user_id, save_address("home", false))
        .await
        .unwrap();
    services.carts.add_item(user_id, product_id, 2).await.unwrap();

    let shipping = services
        .addresses
        .shipping_details(user_id, None)
        .await
        .unwrap();
    let order = services
        .orders
        .checkout_cart(user_id, shipping)
        .await
        .unwrap();
    assert_eq!(order.shipping_address, "home street 1");
    assert_eq!(order.shipping_city, "Springfield");

    // No saved address and no explicit shipping is an error, not a guess.
    let other_user = Uuid::new_v4();
    let err = services
        .addresses
        .shipping_details(other_user, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
