//! Checkout orchestration: payment intent creation up front, then a single
//! transactional finalize that creates the order, its lines and payment
//! record, decrements stock, and clears the cart. Any failure inside the
//! transaction rolls everything back, so stock and orders never drift apart.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    cart_item, order, order_item, payment, CartItem, Order, OrderItem, OrderItemModel,
    OrderModel, Payment, PaymentModel, Product, ProductModel, User,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog;
use crate::services::gateway::{IntentMetadata, PaymentGateway};
use crate::services::pricing::{LineItem, PricingRules, Quote};

/// Direct purchase of a single product, bypassing the cart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyNowItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Result of intent creation: the secret the browser needs plus the totals
/// the intent was priced from.
#[derive(Debug, Clone)]
pub struct PaymentIntentOutcome {
    pub client_secret: String,
    pub totals: Quote,
}

#[derive(Debug, Clone)]
pub struct FinalizeInput {
    pub payment_method: order::PaymentMethod,
    /// Whether the caller reported the gateway payment as settled.
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub buy_now: Option<BuyNowItem>,
}

/// A finished checkout, returned both for fresh orders and idempotent
/// replays of an already-recorded transaction id.
#[derive(Debug, Clone)]
pub struct CompletedCheckout {
    pub order: OrderModel,
    pub payment: PaymentModel,
    pub items: Vec<OrderItemModel>,
}

struct ResolvedLine {
    product: ProductModel,
    quantity: i32,
}

impl ResolvedLine {
    fn line_item(&self) -> LineItem {
        LineItem {
            unit_price: self.product.price,
            quantity: self.quantity,
        }
    }
}

pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
    rules: PricingRules,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        rules: PricingRules,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            rules,
            currency,
        }
    }

    /// Price the order (cart or buy-now) and open a payment intent for the
    /// exact total. Nothing is persisted here.
    #[instrument(skip(self), fields(buy_now = buy_now.is_some()))]
    pub async fn create_payment_intent(
        &self,
        user_id: Uuid,
        buy_now: Option<BuyNowItem>,
    ) -> Result<PaymentIntentOutcome, ServiceError> {
        self.ensure_user(user_id).await?;

        let lines = self.resolve_lines(&*self.db, user_id, buy_now.as_ref()).await?;
        let totals = self.quote(&lines);
        let amount = totals
            .total_minor_units()
            .ok_or_else(|| ServiceError::InternalError("order total out of range".to_string()))?;

        let metadata = IntentMetadata {
            user_id,
            buy_now: buy_now.is_some(),
        };
        let intent = self
            .gateway
            .create_intent(amount, &self.currency, &metadata)
            .await?;

        info!(%user_id, amount_minor_units = amount, intent_id = %intent.id, "payment intent created");
        Ok(PaymentIntentOutcome {
            client_secret: intent.client_secret,
            totals,
        })
    }

    /// Finalize a checkout in one transaction. If the reported transaction id
    /// was already recorded, the existing order is returned unchanged.
    #[instrument(skip(self, input), fields(method = ?input.payment_method, buy_now = input.buy_now.is_some()))]
    pub async fn finalize(
        &self,
        user_id: Uuid,
        input: FinalizeInput,
    ) -> Result<CompletedCheckout, ServiceError> {
        self.ensure_user(user_id).await?;

        let txn = self.db.begin().await?;

        if let Some(transaction_id) = input.transaction_id.as_deref() {
            if let Some(existing) = self.find_recorded(&txn, user_id, transaction_id).await? {
                txn.commit().await?;
                info!(%transaction_id, order_id = %existing.order.id, "transaction already recorded, returning existing order");
                return Ok(existing);
            }
        }

        let from_cart = input.buy_now.is_none();
        let lines = self
            .resolve_lines(&txn, user_id, input.buy_now.as_ref())
            .await?;
        let totals = self.quote(&lines);
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total_amount: Set(totals.total),
            order_status: Set(order::OrderStatus::Processing),
            payment_method: Set(input.payment_method),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product.id),
                size: Set(line.product.size.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.product.price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let payment_status = if input.paid {
            payment::PaymentStatus::Success
        } else {
            payment::PaymentStatus::Pending
        };
        let transaction_id = input
            .transaction_id
            .unwrap_or_else(generate_transaction_id);

        let payment = match (payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            payment_method: Set(input.payment_method),
            payment_status: Set(payment_status),
            amount_paid: Set(totals.total),
            transaction_id: Set(transaction_id.clone()),
            payment_date: Set(now),
            created_at: Set(now),
        })
        .insert(&txn)
        .await
        {
            Ok(payment) => payment,
            // Lost a race against a concurrent finalize carrying the same
            // transaction id: the unique index fired after our replay check.
            // Surface the committed order instead of a constraint error.
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                return match self
                    .find_recorded(&*self.db, user_id, &transaction_id)
                    .await?
                {
                    Some(existing) => {
                        info!(%transaction_id, order_id = %existing.order.id, "transaction recorded concurrently, returning existing order");
                        Ok(existing)
                    }
                    None => Err(err.into()),
                };
            }
            Err(err) => return Err(err.into()),
        };

        // Guarded decrement per line: a concurrent order that drained stock
        // first aborts this whole transaction.
        for line in &lines {
            catalog::decrement_stock(&txn, &line.product, line.quantity).await?;
        }

        if from_cart {
            CartItem::delete_many()
                .filter(cart_item::Column::UserId.eq(user_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                order_id: order.id,
                transaction_id: payment.transaction_id.clone(),
                amount: payment.amount_paid,
            })
            .await;
        for item in &items {
            self.event_sender
                .send_or_log(Event::StockDecremented {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .await;
        }
        if from_cart {
            self.event_sender
                .send_or_log(Event::CartCleared(user_id))
                .await;
        }

        info!(order_id = %order.id, total = %order.total_amount, "checkout finalized");
        Ok(CompletedCheckout {
            order,
            payment,
            items,
        })
    }

    fn quote(&self, lines: &[ResolvedLine]) -> Quote {
        let priced: Vec<LineItem> = lines.iter().map(ResolvedLine::line_item).collect();
        Quote::for_lines(&priced, &self.rules)
    }

    async fn ensure_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;
        Ok(())
    }

    /// Lines for this checkout, each re-validated against current stock.
    async fn resolve_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        buy_now: Option<&BuyNowItem>,
    ) -> Result<Vec<ResolvedLine>, ServiceError> {
        let lines: Vec<ResolvedLine> = match buy_now {
            Some(item) => {
                if !(crate::services::cart::MIN_QUANTITY..=crate::services::cart::MAX_QUANTITY)
                    .contains(&item.quantity)
                {
                    return Err(ServiceError::ValidationError(
                        "quantity must be between 1 and 10".to_string(),
                    ));
                }
                let product = Product::find_by_id(item.product_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;
                vec![ResolvedLine {
                    product,
                    quantity: item.quantity,
                }]
            }
            None => {
                let rows = CartItem::find()
                    .filter(cart_item::Column::UserId.eq(user_id))
                    .find_also_related(Product)
                    .all(conn)
                    .await?;
                rows.into_iter()
                    .filter_map(|(item, product)| {
                        product.map(|product| ResolvedLine {
                            product,
                            quantity: item.quantity,
                        })
                    })
                    .collect()
            }
        };

        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        for line in &lines {
            if line.product.stock < line.quantity {
                return Err(ServiceError::InsufficientStock(line.product.name.clone()));
            }
        }
        Ok(lines)
    }

    /// Look up an already-settled transaction id. A hit belonging to another
    /// user is a conflict, never a replay: the caller must not see someone
    /// else's order.
    async fn find_recorded<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<CompletedCheckout>, ServiceError> {
        let Some(payment) = Payment::find()
            .filter(payment::Column::TransactionId.eq(transaction_id))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        let order = Order::find_by_id(payment.order_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("payment without matching order".to_string())
            })?;
        if order.user_id != user_id {
            return Err(ServiceError::Conflict(
                "Transaction id is already recorded for another account".to_string(),
            ));
        }
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(conn)
            .await?;

        Ok(Some(CompletedCheckout {
            order,
            payment,
            items,
        }))
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

fn generate_transaction_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("TXN-{}", suffix.to_uppercase())
}
