//! User carts: the staging area in front of the order builder.
//!
//! A cart is locked by the settlement service once an order for its user is
//! paid; after that no line mutation is accepted.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{cart, cart_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Locks the user's cart on the caller's connection. Missing carts are fine:
/// orders can be created without ever staging a cart.
pub async fn lock_in_txn<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<(), ServiceError> {
    let cart = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?;

    if let Some(cart) = cart {
        if !cart.is_locked {
            let mut active: cart::ActiveModel = cart.into();
            active.is_locked = Set(true);
            active.update(conn).await?;
        }
    }

    Ok(())
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the user's cart, creating an empty one on first use.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            is_locked: Set(false),
            ..Default::default()
        };
        cart.insert(&*self.db).await.map_err(ServiceError::DatabaseError)
    }

    /// Adds a product to the cart. There is one line per product per cart:
    /// adding an already-present product accumulates its quantity.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id, quantity = quantity))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {quantity}"
            )));
        }

        let cart = self.get_or_create_cart(user_id).await?;
        ensure_unlocked(&cart)?;

        // The product must exist and be purchasable.
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        if !product.is_active {
            return Err(ServiceError::ValidationError(format!(
                "Product {product_id} is not available"
            )));
        }

        let txn = self.db.begin().await?;

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let item = match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(new_quantity);
                active.update(&txn).await?
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(chrono::Utc::now()),
                };
                item.insert(&txn).await?
            }
        };

        txn.commit().await?;

        info!(cart_id = %cart.id, product_id = %product_id, "Cart item added");
        Ok(item)
    }

    /// Sets the quantity of an existing cart line.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn set_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {quantity}"
            )));
        }

        let cart = self.require_cart(user_id).await?;
        ensure_unlocked(&cart)?;

        let item = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {product_id} is not in the cart"))
            })?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.update(&*self.db).await.map_err(ServiceError::DatabaseError)
    }

    /// Removes a product's line from the cart.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let cart = self.require_cart(user_id).await?;
        ensure_unlocked(&cart)?;

        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {product_id} is not in the cart"
            )));
        }
        Ok(())
    }

    pub async fn get_items(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let cart = self.require_cart(user_id).await?;
        cart.find_related(cart_item::Entity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Locks the cart in its own transaction (administrative path; settlement
    /// uses `lock_in_txn` inside its own transaction).
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn lock_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        lock_in_txn(&txn, user_id).await?;
        txn.commit().await?;

        if let Err(e) = self.event_sender.send(Event::CartLocked(user_id)).await {
            tracing::warn!(error = %e, "Failed to send cart locked event");
        }
        Ok(())
    }

    async fn require_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {user_id} not found")))
    }
}

fn ensure_unlocked(cart: &cart::Model) -> Result<(), ServiceError> {
    if cart.is_locked {
        return Err(ServiceError::InvalidStateTransition(format!(
            "Cart {} is locked and cannot be modified",
            cart.id
        )));
    }
    Ok(())
}
