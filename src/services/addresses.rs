//! Saved shipping addresses, one default per user.
//!
//! Orders copy address fields at checkout and never reference the row again,
//! so edits and deletions here cannot rewrite order history.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::address;
use crate::errors::ServiceError;
use crate::services::orders::ShippingDetails;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAddressRequest {
    #[validate(length(min = 1, max = 50, message = "Label must be 1-50 characters"))]
    pub label: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub line1: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 4, max = 16, message = "Postal code must be 4-16 characters"))]
    pub postal_code: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Saves a new address. The user's first address becomes the default
    /// regardless of the flag; an explicit default demotes the previous one
    /// in the same transaction.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn add_address(
        &self,
        user_id: Uuid,
        request: SaveAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;

        let has_any = address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .is_some();
        let make_default = request.is_default || !has_any;

        if make_default && has_any {
            clear_default_in_txn(&txn, user_id).await?;
        }

        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            label: Set(request.label),
            full_name: Set(request.full_name),
            phone: Set(request.phone),
            line1: Set(request.line1),
            city: Set(request.city),
            postal_code: Set(request.postal_code),
            is_default: Set(make_default),
            ..Default::default()
        };
        let created = model.insert(&txn).await?;

        txn.commit().await?;

        info!(address_id = %created.id, user_id = %user_id, "Address saved");
        Ok(created)
    }

    pub async fn list_addresses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<address::Model>, ServiceError> {
        address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_asc(address::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Promotes one address to default, demoting the rest atomically so the
    /// user never has zero or two defaults.
    #[instrument(skip(self), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let target = address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {address_id} not found")))?;

        if !target.is_default {
            clear_default_in_txn(&txn, user_id).await?;
            let mut active: address::ActiveModel = target.into();
            active.is_default = Set(true);
            let promoted = active.update(&txn).await?;
            txn.commit().await?;
            return Ok(promoted);
        }

        txn.commit().await?;
        Ok(target)
    }

    /// Deletes a non-default address. The default can only be replaced, not
    /// removed, so a user with addresses always has a usable default.
    #[instrument(skip(self), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn remove_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<(), ServiceError> {
        let address = address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {address_id} not found")))?;

        if address.is_default {
            return Err(ServiceError::InvalidStateTransition(
                "Cannot delete the default address; set another default first".to_string(),
            ));
        }

        address.delete(&*self.db).await?;
        Ok(())
    }

    /// Resolves the shipping snapshot for a checkout: a specific address when
    /// one is named, the user's default otherwise.
    pub async fn shipping_details(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<ShippingDetails, ServiceError> {
        let address = match address_id {
            Some(id) => address::Entity::find_by_id(id)
                .filter(address::Column::UserId.eq(user_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Address {id} not found")))?,
            None => address::Entity::find()
                .filter(address::Column::UserId.eq(user_id))
                .filter(address::Column::IsDefault.eq(true))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("User {user_id} has no default address"))
                })?,
        };

        Ok(ShippingDetails {
            full_name: address.full_name,
            phone: address.phone,
            address: address.line1,
            city: address.city,
            postal_code: address.postal_code,
        })
    }
}

async fn clear_default_in_txn<C: sea_orm::ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    address::Entity::update_many()
        .col_expr(
            address::Column::IsDefault,
            sea_orm::sea_query::Expr::value(false),
        )
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}
