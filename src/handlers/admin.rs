//! Admin panel endpoints: dashboard stats, the full order list, order status
//! advancement, and product CRUD. The whole router is mounted behind the
//! `admin` role.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok};
use crate::services::catalog::{CreateProductInput, UpdateProductInput};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(dashboard_stats))
        .route("/orders", get(list_orders))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product).delete(delete_product))
}

async fn dashboard_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let (stats, recent) = state.services.orders.dashboard_stats().await?;
    Ok(ok(json!({
        "success": true,
        "stats": stats,
        "recentOrders": recent,
    })))
}

async fn list_orders(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_orders().await?;
    Ok(ok(json!({ "success": true, "orders": orders })))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = parse_order_status(&req.status)?;
    let order = state.services.orders.update_status(id, status).await?;
    Ok(ok(json!({ "success": true, "order": order })))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create_product(input).await?;
    Ok(created(json!({ "success": true, "product": product })))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.update_product(id, input).await?;
    Ok(ok(json!({ "success": true, "product": product })))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.delete_product(id).await?;
    Ok(ok(json!({ "success": true, "message": "Product deleted" })))
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.to_ascii_lowercase().as_str() {
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::ValidationError(format!(
            "unknown order status: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_parsing_is_case_insensitive() {
        assert_eq!(parse_order_status("Shipped").unwrap(), OrderStatus::Shipped);
        assert_eq!(
            parse_order_status("CANCELLED").unwrap(),
            OrderStatus::Cancelled
        );
        assert!(parse_order_status("lost").is_err());
    }
}
