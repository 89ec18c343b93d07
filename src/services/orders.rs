//! Order history and administration: per-user history, the admin order list,
//! dashboard stats, and status advancement along the fixed lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    order, order_item, payment, product, Order, OrderItem, OrderItemModel, OrderModel, Payment,
    PaymentModel, Product, ProductModel, User, UserModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Order line enriched with current product detail. `name` and `image` are
/// best effort: a since-deleted product leaves them empty while the captured
/// size, quantity and price remain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineDetail {
    pub product_id: Uuid,
    pub name: Option<String>,
    pub image: Option<String>,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// An order as shown to its owner. `payment_status` is derived from the
/// payment record, never stored on the order itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub id: Uuid,
    pub total_amount: Decimal,
    pub order_status: order::OrderStatus,
    pub payment_status: String,
    pub payment_method: order::PaymentMethod,
    pub transaction_id: Option<String>,
    pub items: Vec<OrderLineDetail>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub address: String,
    pub phone: String,
}

/// Admin view: the order plus who placed it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderDetail {
    #[serde(flatten)]
    pub order: OrderDetail,
    pub customer: Option<CustomerSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: u64,
    pub total_users: u64,
    pub total_orders: u64,
    pub total_sales: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// A user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn my_orders(&self, user_id: Uuid) -> Result<Vec<OrderDetail>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let details = self.assemble(orders).await?;
        Ok(details.into_iter().map(|d| d.order).collect())
    }

    /// All orders with customer detail, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<AdminOrderDetail>, ServiceError> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        self.assemble(orders).await
    }

    /// Aggregate counts and revenue plus the five most recent orders.
    #[instrument(skip(self))]
    pub async fn dashboard_stats(
        &self,
    ) -> Result<(DashboardStats, Vec<AdminOrderDetail>), ServiceError> {
        let total_products = Product::find().count(&*self.db).await?;
        let total_users = User::find().count(&*self.db).await?;
        let total_orders = Order::find().count(&*self.db).await?;

        let total_sales: Option<Decimal> = Order::find()
            .select_only()
            .column_as(order::Column::TotalAmount.sum(), "total_sales")
            .into_tuple()
            .one(&*self.db)
            .await?
            .flatten();

        let recent_orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .limit(5)
            .all(&*self.db)
            .await?;
        let recent = self.assemble(recent_orders).await?;

        Ok((
            DashboardStats {
                total_products,
                total_users,
                total_orders,
                total_sales: total_sales.unwrap_or_default(),
            },
            recent,
        ))
    }

    /// Advance an order along the lifecycle. Rejects any transition the
    /// lifecycle does not allow; delivery stamps `delivered_at`.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: order::OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        let old_status = existing.order_status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "{old_status:?} -> {new_status:?}"
            )));
        }

        let mut model: order::ActiveModel = existing.into();
        model.order_status = Set(new_status);
        if new_status == order::OrderStatus::Delivered {
            model.delivered_at = Set(Some(Utc::now()));
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{old_status:?}"),
                new_status: format!("{new_status:?}"),
            })
            .await;
        Ok(updated)
    }

    /// Join orders with their items, products, payments and customers.
    async fn assemble(
        &self,
        orders: Vec<OrderModel>,
    ) -> Result<Vec<AdminOrderDetail>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .all(&*self.db)
            .await?;

        let product_ids: HashSet<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, ProductModel> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let payments: HashMap<Uuid, PaymentModel> = Payment::find()
            .filter(payment::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.order_id, p))
            .collect();

        let user_ids: HashSet<Uuid> = orders.iter().map(|o| o.user_id).collect();
        let customers: HashMap<Uuid, UserModel> = User::find()
            .filter(crate::entities::user::Column::Id.is_in(user_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let lines = items_by_order
                    .remove(&order.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|item| {
                        let product = products.get(&item.product_id);
                        OrderLineDetail {
                            product_id: item.product_id,
                            name: product.map(|p| p.name.clone()),
                            image: product.map(|p| p.image.clone()),
                            size: item.size,
                            quantity: item.quantity,
                            unit_price: item.unit_price,
                        }
                    })
                    .collect();

                let payment = payments.get(&order.id);
                let customer = customers.get(&order.user_id).map(|u| CustomerSummary {
                    id: u.id,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    address: u.address.clone(),
                    phone: u.phone.clone(),
                });

                AdminOrderDetail {
                    order: OrderDetail {
                        id: order.id,
                        total_amount: order.total_amount,
                        order_status: order.order_status,
                        payment_status: payment
                            .map(|p| p.payment_status.as_order_display())
                            .unwrap_or("Pending")
                            .to_string(),
                        payment_method: order.payment_method,
                        transaction_id: payment.map(|p| p.transaction_id.clone()),
                        items: lines,
                        delivered_at: order.delivered_at,
                        created_at: order.created_at,
                    },
                    customer,
                }
            })
            .collect())
    }
}
