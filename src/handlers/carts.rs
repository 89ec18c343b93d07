//! Cart endpoints; all require an authenticated user.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::ok;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route(
            "/items/{product_id}",
            put(update_quantity).delete(remove_item),
        )
        .route("/toggle", post(toggle_item))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartItemRequest {
    product_id: Uuid,
    #[serde(default = "default_quantity")]
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct QuantityRequest {
    quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(user.user_id).await?;
    Ok(ok(json!({ "success": true, "cart": cart })))
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state
        .services
        .carts
        .add_item(user.user_id, req.product_id, req.quantity)
        .await?;
    Ok(ok(json!({ "success": true, "item": line })))
}

async fn update_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(req): Json<QuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state
        .services
        .carts
        .update_quantity(user.user_id, product_id, req.quantity)
        .await?;
    Ok(ok(json!({ "success": true, "item": line })))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .carts
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(ok(json!({ "success": true, "message": "Item removed from cart" })))
}

async fn toggle_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let in_cart = state
        .services
        .carts
        .toggle_item(user.user_id, req.product_id, req.quantity)
        .await?;
    Ok(ok(json!({ "success": true, "inCart": in_cart })))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let removed = state.services.carts.clear_cart(user.user_id).await?;
    Ok(ok(json!({ "success": true, "removed": removed })))
}
