//! End-to-end checkout behavior: pricing, atomic stock handling,
//! idempotency, and the cart/buy-now split.

mod common;

use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use boutique_api::entities::order::{OrderStatus, PaymentMethod};
use boutique_api::entities::payment::PaymentStatus;
use boutique_api::entities::{Order, Product};
use boutique_api::errors::ServiceError;
use boutique_api::services::checkout::{BuyNowItem, FinalizeInput};
use common::{seed_product, seed_user, TestApp};

fn card_payment(transaction_id: &str) -> FinalizeInput {
    FinalizeInput {
        payment_method: PaymentMethod::Card,
        paid: true,
        transaction_id: Some(transaction_id.to_string()),
        buy_now: None,
    }
}

#[tokio::test]
async fn cart_checkout_prices_decrements_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "shopper@example.com", false).await;
    let product = seed_product(&app.db, "Linen Shirt", dec!(50), 10).await;

    app.services
        .carts
        .add_item(user.id, product.id, 2)
        .await
        .unwrap();

    let completed = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-CART-1"))
        .await
        .unwrap();

    // 100 subtotal + 15 shipping + 5 tax
    assert_eq!(completed.order.total_amount, dec!(120.00));
    assert_eq!(completed.order.order_status, OrderStatus::Processing);
    assert_eq!(completed.payment.payment_status, PaymentStatus::Success);
    assert_eq!(completed.payment.amount_paid, dec!(120.00));
    assert_eq!(completed.items.len(), 1);
    assert_eq!(completed.items[0].quantity, 2);
    assert_eq!(completed.items[0].unit_price, dec!(50));

    let product = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 8);

    let cart = app.services.carts.get_cart(user.id).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn free_shipping_above_threshold() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "bulk@example.com", false).await;
    let product = seed_product(&app.db, "Wool Coat", dec!(80), 5).await;

    app.services
        .carts
        .add_item(user.id, product.id, 2)
        .await
        .unwrap();
    let completed = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-FREE-SHIP"))
        .await
        .unwrap();

    // 160 subtotal, free shipping, 8 tax
    assert_eq!(completed.order.total_amount, dec!(168.00));
}

#[tokio::test]
async fn insufficient_stock_rolls_back_everything() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "late@example.com", false).await;
    let product = seed_product(&app.db, "Last Scarf", dec!(20), 1).await;

    app.services
        .carts
        .add_item(user.id, product.id, 2)
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-SHORT"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(name) if name == "Last Scarf"));

    // Nothing persisted: no order, stock untouched, cart intact.
    assert_eq!(Order::find().all(&*app.db).await.unwrap().len(), 0);
    let product = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 1);
    assert_eq!(app.services.carts.get_cart(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_is_idempotent_per_transaction_id() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "retry@example.com", false).await;
    let product = seed_product(&app.db, "Denim Jacket", dec!(60), 5).await;

    app.services
        .carts
        .add_item(user.id, product.id, 1)
        .await
        .unwrap();

    let first = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-RETRY"))
        .await
        .unwrap();

    // The retry must not need the (now cleared) cart.
    let second = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-RETRY"))
        .await
        .unwrap();

    assert_eq!(first.order.id, second.order.id);
    assert_eq!(Order::find().all(&*app.db).await.unwrap().len(), 1);

    let product = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 4);
}

#[tokio::test]
async fn replaying_anothers_transaction_is_rejected() {
    let app = TestApp::new().await;
    let victim = seed_user(&app.db, "victim@example.com", false).await;
    let attacker = seed_user(&app.db, "attacker@example.com", false).await;
    let product = seed_product(&app.db, "Cashmere Sweater", dec!(70), 10).await;

    app.services
        .carts
        .add_item(victim.id, product.id, 1)
        .await
        .unwrap();
    let victims = app
        .services
        .checkout
        .finalize(victim.id, card_payment("TXN-SHARED"))
        .await
        .unwrap();

    // A different account replaying the settled id must get a conflict,
    // never the victim's order — with or without a cart of its own.
    let err = app
        .services
        .checkout
        .finalize(attacker.id, card_payment("TXN-SHARED"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    app.services
        .carts
        .add_item(attacker.id, product.id, 1)
        .await
        .unwrap();
    let err = app
        .services
        .checkout
        .finalize(attacker.id, card_payment("TXN-SHARED"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Only the victim's order exists, and the attacker's cart survived the
    // rolled-back attempt.
    let orders = Order::find().all(&*app.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, victims.order.id);
    assert_eq!(orders[0].user_id, victim.id);
    assert_eq!(
        app.services.carts.get_cart(attacker.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn concurrent_same_transaction_id_yields_one_order() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "double-click@example.com", false).await;
    let product = seed_product(&app.db, "Trench Coat", dec!(110), 5).await;

    app.services
        .carts
        .add_item(user.id, product.id, 1)
        .await
        .unwrap();

    let checkout = app.services.checkout.clone();
    let a = {
        let checkout = checkout.clone();
        let user_id = user.id;
        tokio::spawn(async move { checkout.finalize(user_id, card_payment("TXN-DOUBLE")).await })
    };
    let b = {
        let user_id = user.id;
        tokio::spawn(async move { checkout.finalize(user_id, card_payment("TXN-DOUBLE")).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];

    // However the race lands, exactly one order exists and every success
    // refers to it.
    let orders = Order::find().all(&*app.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    for completed in results.into_iter().flatten() {
        assert_eq!(completed.order.id, orders[0].id);
    }

    let product = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 4);
}

#[tokio::test]
async fn buy_now_leaves_cart_untouched() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "direct@example.com", false).await;
    let carted = seed_product(&app.db, "Carted Tee", dec!(25), 5).await;
    let direct = seed_product(&app.db, "Impulse Hat", dec!(30), 5).await;

    app.services
        .carts
        .add_item(user.id, carted.id, 1)
        .await
        .unwrap();

    let completed = app
        .services
        .checkout
        .finalize(
            user.id,
            FinalizeInput {
                payment_method: PaymentMethod::Card,
                paid: true,
                transaction_id: Some("TXN-BUYNOW".to_string()),
                buy_now: Some(BuyNowItem {
                    product_id: direct.id,
                    quantity: 1,
                }),
            },
        )
        .await
        .unwrap();

    assert_eq!(completed.items.len(), 1);
    assert_eq!(completed.items[0].product_id, direct.id);
    // 30 subtotal + 15 shipping + 1.50 tax
    assert_eq!(completed.order.total_amount, dec!(46.50));

    let cart = app.services.carts.get_cart(user.id).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].product.id, carted.id);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "empty@example.com", false).await;

    let err = app
        .services
        .checkout
        .finalize(user.id, card_payment("TXN-EMPTY"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmptyCart));
}

#[tokio::test]
async fn unsettled_payment_is_recorded_as_pending() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "cod@example.com", false).await;
    let product = seed_product(&app.db, "Canvas Bag", dec!(40), 3).await;

    app.services
        .carts
        .add_item(user.id, product.id, 1)
        .await
        .unwrap();

    let completed = app
        .services
        .checkout
        .finalize(
            user.id,
            FinalizeInput {
                payment_method: PaymentMethod::Cod,
                paid: false,
                transaction_id: None,
                buy_now: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(completed.payment.payment_status, PaymentStatus::Pending);
    assert!(completed.payment.transaction_id.starts_with("TXN-"));

    let orders = app.services.orders.my_orders(user.id).await.unwrap();
    assert_eq!(orders[0].payment_status, "Pending");
}

#[tokio::test]
async fn payment_intent_is_priced_from_the_cart() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "intent@example.com", false).await;
    let product = seed_product(&app.db, "Silk Scarf", dec!(50), 10).await;

    app.services
        .carts
        .add_item(user.id, product.id, 2)
        .await
        .unwrap();

    let outcome = app
        .services
        .checkout
        .create_payment_intent(user.id, None)
        .await
        .unwrap();

    assert_eq!(outcome.totals.total, dec!(120.00));
    assert_eq!(outcome.client_secret, "pi_test_12000_secret");
    assert_eq!(*app.gateway.amounts.lock().unwrap(), vec![12000]);
}

#[tokio::test]
async fn concurrent_finalizes_never_oversell() {
    let app = TestApp::new().await;
    let first = seed_user(&app.db, "racer1@example.com", false).await;
    let second = seed_user(&app.db, "racer2@example.com", false).await;
    let product = seed_product(&app.db, "Limited Sneaker", dec!(90), 1).await;

    for user in [&first, &second] {
        app.services
            .carts
            .add_item(user.id, product.id, 1)
            .await
            .unwrap();
    }

    let checkout = app.services.checkout.clone();
    let a = {
        let checkout = checkout.clone();
        let user_id = first.id;
        tokio::spawn(async move { checkout.finalize(user_id, card_payment("TXN-RACE-A")).await })
    };
    let b = {
        let user_id = second.id;
        tokio::spawn(async move { checkout.finalize(user_id, card_payment("TXN-RACE-B")).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert!(successes <= 1, "both buyers got the last unit");

    let product = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(product.stock >= 0);
    assert_eq!(
        Order::find().all(&*app.db).await.unwrap().len(),
        successes
    );
}
