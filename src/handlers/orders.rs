//! Checkout and order-history endpoints; all require authentication.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok};
use crate::services::checkout::{BuyNowItem, FinalizeInput};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/", post(place_order))
        .route("/myorders", get(my_orders))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentRequest {
    buy_now_item: Option<BuyNowItem>,
}

async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PaymentIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .create_payment_intent(user.user_id, req.buy_now_item)
        .await?;
    Ok(ok(json!({
        "success": true,
        "clientSecret": outcome.client_secret,
        "totals": outcome.totals,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest {
    payment_method: Option<String>,
    payment_status: Option<String>,
    transaction_id: Option<String>,
    buy_now_item: Option<BuyNowItem>,
}

async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = FinalizeInput {
        payment_method: parse_payment_method(req.payment_method.as_deref())?,
        paid: req
            .payment_status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("paid"))
            .unwrap_or(false),
        transaction_id: req.transaction_id,
        buy_now: req.buy_now_item,
    };

    let completed = state.services.checkout.finalize(user.user_id, input).await?;
    Ok(created(json!({
        "success": true,
        "order": completed.order,
        "items": completed.items,
        "payment": completed.payment,
    })))
}

async fn my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.my_orders(user.user_id).await?;
    Ok(ok(json!({ "success": true, "orders": orders })))
}

fn parse_payment_method(raw: Option<&str>) -> Result<PaymentMethod, ServiceError> {
    match raw {
        None => Ok(PaymentMethod::Card),
        Some(s) if s.eq_ignore_ascii_case("card") => Ok(PaymentMethod::Card),
        Some(s) if s.eq_ignore_ascii_case("cod") => Ok(PaymentMethod::Cod),
        Some(s) if s.eq_ignore_ascii_case("upi") => Ok(PaymentMethod::Upi),
        Some(s) if s.eq_ignore_ascii_case("netbanking") => Ok(PaymentMethod::NetBanking),
        Some(other) => Err(ServiceError::ValidationError(format!(
            "unknown payment method: {other}"
        ))),
    }
}
