mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use common::TestApp;
use storefront_api::auth::Actor;
use storefront_api::entities::price_history;
use storefront_api::errors::ServiceError;

async fn history_rows(app: &TestApp, product_id: uuid::Uuid) -> Vec<price_history::Model> {
    price_history::Entity::find()
        .filter(price_history::Column::ProductId.eq(product_id))
        .order_by_asc(price_history::Column::ValidFrom)
        .all(&*app.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn change_price_opens_interval_and_updates_cached_price() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    let updated = services
        .pricing
        .change_price(product_id, dec!(12.50), &actor)
        .await
        .unwrap();
    assert_eq!(updated.price, dec!(12.50));

    let rows = history_rows(&app, product_id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].price, dec!(12.50));
    assert!(rows[0].valid_to.is_none());

    assert_eq!(
        services.pricing.current_price(product_id).await.unwrap(),
        dec!(12.50)
    );
}

#[tokio::test]
async fn repeated_changes_keep_exactly_one_open_interval() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    for price in [dec!(11.00), dec!(12.00), dec!(9.50), dec!(14.25)] {
        services
            .pricing
            .change_price(product_id, price, &actor)
            .await
            .unwrap();
    }

    let rows = history_rows(&app, product_id).await;
    assert_eq!(rows.len(), 4);

    let open: Vec<_> = rows.iter().filter(|r| r.valid_to.is_none()).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].price, dec!(14.25));

    // Closed intervals never overlap the interval that follows them.
    for pair in rows.windows(2) {
        let closed_at = pair[0].valid_to.expect("Earlier interval must be closed");
        assert!(closed_at <= pair[1].valid_from);
    }
}

#[tokio::test]
async fn same_price_is_a_no_op() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    let updated = services
        .pricing
        .change_price(product_id, dec!(10.00), &actor)
        .await
        .unwrap();
    assert_eq!(updated.price, dec!(10.00));

    assert!(history_rows(&app, product_id).await.is_empty());
    assert_eq!(app.audit_count(product_id).await, 0);
}

#[tokio::test]
async fn rejects_non_positive_price() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    let err = services
        .pricing
        .change_price(product_id, dec!(0.00), &actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services
        .pricing
        .change_price(product_id, dec!(-3.00), &actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert_eq!(app.product(product_id).await.price, dec!(10.00));
}

#[tokio::test]
async fn price_change_is_audited() {
    let app = TestApp::new().await;
    let services = app.services();
    let actor = Actor::system();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    services
        .pricing
        .change_price(product_id, dec!(15.00), &actor)
        .await
        .unwrap();

    let rows = app.audit_rows(product_id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].before, Some(serde_json::json!({ "price": "10.00" })));
    assert_eq!(rows[0].after, Some(serde_json::json!({ "price": "15.00" })));
}

#[tokio::test]
async fn current_price_falls_back_to_cached_price() {
    let app = TestApp::new().await;
    let services = app.services();
    let product_id = app.seed_product("Widget", dec!(10.00), 5).await;

    // No history yet: the product's own column is authoritative.
    assert_eq!(
        services.pricing.current_price(product_id).await.unwrap(),
        dec!(10.00)
    );
}
