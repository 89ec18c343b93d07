//! Product catalog: browse for the storefront, full CRUD for the admin
//! panel, and the conditional stock decrement used by checkout.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{product, Product, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub price: Decimal,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[serde(default)]
    pub stock: i32,
    #[validate(length(min = 1))]
    pub image: String,
    pub secondary_image1: Option<String>,
    pub secondary_image2: Option<String>,
    pub secondary_image3: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
}

/// Partial update; absent fields keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub size: Option<String>,
    pub stock: Option<i32>,
    pub image: Option<String>,
    pub secondary_image1: Option<String>,
    pub secondary_image2: Option<String>,
    pub secondary_image3: Option<String>,
    pub category: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Newest-first product listing, optionally filtered by category and
    /// paginated. Returns the page plus the total match count.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        category: Option<String>,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }

        match limit {
            Some(limit) if limit > 0 => {
                let page = page.unwrap_or(1).max(1);
                let paginator = query.paginate(&*self.db, limit);
                let total = paginator.num_items().await?;
                let products = paginator.fetch_page(page - 1).await?;
                Ok((products, total))
            }
            _ => {
                let products = query.all(&*self.db).await?;
                let total = products.len() as u64;
                Ok((products, total))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product".to_string()))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        validate_price_and_stock(input.price, input.stock)?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            size: Set(input.size),
            stock: Set(input.stock),
            image: Set(input.image),
            secondary_image1: Set(input.secondary_image1),
            secondary_image2: Set(input.secondary_image2),
            secondary_image3: Set(input.secondary_image3),
            category: Set(input.category),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = self.get_product(id).await?;

        if let Some(price) = input.price {
            validate_price_and_stock(price, input.stock.unwrap_or(existing.stock))?;
        } else if let Some(stock) = input.stock {
            validate_price_and_stock(existing.price, stock)?;
        }

        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(description) = input.description {
            model.description = Set(description);
        }
        if let Some(price) = input.price {
            model.price = Set(price);
        }
        if let Some(size) = input.size {
            model.size = Set(size);
        }
        if let Some(stock) = input.stock {
            model.stock = Set(stock);
        }
        if let Some(image) = input.image {
            model.image = Set(image);
        }
        if let Some(image) = input.secondary_image1 {
            model.secondary_image1 = Set(Some(image));
        }
        if let Some(image) = input.secondary_image2 {
            model.secondary_image2 = Set(Some(image));
        }
        if let Some(image) = input.secondary_image3 {
            model.secondary_image3 = Set(Some(image));
        }
        if let Some(category) = input.category {
            model.category = Set(category);
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Product".to_string()));
        }
        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;
        Ok(())
    }
}

fn validate_price_and_stock(price: Decimal, stock: i32) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price must be positive".to_string(),
        ));
    }
    if stock < 0 {
        return Err(ServiceError::ValidationError(
            "stock cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Atomically decrement stock, guarded so the row is only touched while
/// enough stock remains. Zero rows affected means another buyer got there
/// first (or stock was already short); the caller must roll back.
pub async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product: &ProductModel,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product.id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(product.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive_price() {
        assert!(validate_price_and_stock(dec!(0), 5).is_err());
        assert!(validate_price_and_stock(dec!(-1), 5).is_err());
        assert!(validate_price_and_stock(dec!(0.01), 5).is_ok());
    }

    #[test]
    fn rejects_negative_stock() {
        assert!(validate_price_and_stock(dec!(10), -1).is_err());
        assert!(validate_price_and_stock(dec!(10), 0).is_ok());
    }
}
