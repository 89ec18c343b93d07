//! Shopping cart. One row per (user, product); every write path keeps the
//! quantity within 1..=10. Reads join the catalog so lines whose product was
//! deleted simply disappear instead of erroring.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{cart_item, CartItem, CartItemModel, Product, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub const MIN_QUANTITY: i32 = 1;
pub const MAX_QUANTITY: i32 = 10;

/// A cart line joined with its product.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product: ProductModel,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// All of a user's cart lines with product detail. Lines whose product no
    /// longer exists are dropped by the join.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, product)| {
                product.map(|product| CartLine {
                    product,
                    quantity: item.quantity,
                })
            })
            .collect())
    }

    /// Add a product to the cart. A fresh line takes the requested quantity;
    /// an existing line absorbs it, saturating at the per-line maximum.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        validate_quantity(quantity)?;

        // The product must exist before it can be carted.
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;

        let existing = self.find_line(user_id, product_id).await?;
        let line = match existing {
            Some(line) => {
                let combined = (line.quantity + quantity).min(MAX_QUANTITY);
                let mut model: cart_item::ActiveModel = line.into();
                model.quantity = Set(combined);
                model.updated_at = Set(Utc::now());
                model.update(&*self.db).await?
            }
            None => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id,
            })
            .await;
        Ok(line)
    }

    /// Set the quantity of an existing line, clamped into 1..=10.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        let line = self
            .find_line(user_id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item".to_string()))?;

        let mut model: cart_item::ActiveModel = line.into();
        model.quantity = Set(quantity.clamp(MIN_QUANTITY, MAX_QUANTITY));
        model.updated_at = Set(Utc::now());
        Ok(model.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item".to_string()));
        }
        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                user_id,
                product_id,
            })
            .await;
        Ok(())
    }

    /// Add the product if it is not in the cart, remove it if it is. Returns
    /// whether the product ends up in the cart.
    #[instrument(skip(self))]
    pub async fn toggle_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        match self.find_line(user_id, product_id).await? {
            Some(line) => {
                line.delete(&*self.db).await?;
                self.event_sender
                    .send_or_log(Event::CartItemRemoved {
                        user_id,
                        product_id,
                    })
                    .await;
                Ok(false)
            }
            None => {
                self.add_item(user_id, product_id, quantity).await?;
                Ok(true)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;
        Ok(result.rows_affected)
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }
}

fn validate_quantity(quantity: i32) -> Result<(), ServiceError> {
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_bounds_are_inclusive() {
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(10).is_ok());
        assert!(validate_quantity(11).is_err());
        assert!(validate_quantity(-3).is_err());
    }
}
