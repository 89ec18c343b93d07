//! Boutique API Library
//!
//! Storefront backend: catalog, cart, checkout with card payment, order
//! history, and an admin surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::{AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::gateway::PaymentGateway;
use crate::services::{
    AccountService, CartService, CatalogService, CheckoutService, OrderService,
};

/// All domain services, shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<AccountService>,
    pub carts: Arc<CartService>,
    pub catalog: Arc<CatalogService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        event_sender: EventSender,
        auth_service: Arc<AuthService>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(
                db.clone(),
                auth_service,
                event_sender.clone(),
            )),
            carts: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            catalog: Arc::new(CatalogService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                gateway,
                config.pricing_rules(),
                config.currency.clone(),
            )),
            orders: Arc::new(OrderService::new(db, event_sender)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub auth_service: Arc<AuthService>,
    pub services: AppServices,
}

/// The `/api` route tree. Public catalog and account routes, authenticated
/// cart/order/profile routes, and the role-guarded admin panel.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", handlers::products::routes())
        .nest(
            "/auth",
            handlers::auth::routes()
                .merge(handlers::auth::me_routes().with_auth()),
        )
        .nest("/profile", handlers::auth::profile_routes().with_auth())
        .nest("/cart", handlers::carts::routes().with_auth())
        .nest("/orders", handlers::orders::routes().with_auth())
        .nest("/admin", handlers::admin::routes().with_role("admin"))
}

/// Full application router with middleware applied. The auth service rides in
/// request extensions so the auth middleware can reach it from any nesting
/// depth.
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(handlers::health::routes())
        .nest("/api", api_routes())
        .layer(Extension(state.auth_service.clone()))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::timeout::TimeoutLayer::new(
            std::time::Duration::from_secs(30),
        ))
        .with_state(state)
}

/// Permissive CORS unless origins are pinned in config.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) => {
            let parsed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
