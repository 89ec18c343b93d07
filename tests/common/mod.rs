//! Shared harness: application services backed by a throwaway SQLite
//! database, a fake payment gateway, and seed helpers.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Database, Set};
use tempfile::TempDir;
use uuid::Uuid;

use boutique_api::auth::{self, AuthConfig, AuthService};
use boutique_api::config::AppConfig;
use boutique_api::db::{self, DbPool};
use boutique_api::entities::{product, user, ProductModel, UserModel};
use boutique_api::errors::ServiceError;
use boutique_api::events::{self, EventSender};
use boutique_api::services::gateway::{IntentMetadata, PaymentGateway, PaymentIntent};
use boutique_api::services::pricing::PricingRules;
use boutique_api::services::{
    AccountService, CartService, CatalogService, CheckoutService, OrderService,
};
use boutique_api::{AppServices, AppState};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_PASSWORD: &str = "password123";

/// Gateway double that records every requested amount.
pub struct FakeGateway {
    pub amounts: Mutex<Vec<i64>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            amounts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor_units: i64,
        _currency: &str,
        _metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        self.amounts.lock().unwrap().push(amount_minor_units);
        Ok(PaymentIntent {
            id: format!("pi_test_{amount_minor_units}"),
            client_secret: format!("pi_test_{amount_minor_units}_secret"),
        })
    }
}

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub auth_service: Arc<AuthService>,
    pub event_sender: EventSender,
    pub gateway: Arc<FakeGateway>,
    _event_task: tokio::task::JoinHandle<()>,
    _tmp: TempDir,
}

impl TestApp {
    /// Fresh database file per test, fully migrated.
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = tmp.path().join("boutique_test.db");
        let pool = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations failed");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            issuer: "boutique-api".to_string(),
            audience: "boutique-storefront".to_string(),
            token_expiration: Duration::from_secs(3600),
        }));

        let gateway = FakeGateway::new();
        let services = AppServices {
            accounts: Arc::new(AccountService::new(
                db.clone(),
                auth_service.clone(),
                event_sender.clone(),
            )),
            carts: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            catalog: Arc::new(CatalogService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                gateway.clone(),
                PricingRules::default(),
                "usd".to_string(),
            )),
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
        };

        Self {
            db,
            services,
            auth_service,
            event_sender,
            gateway,
            _event_task: event_task,
            _tmp: tmp,
        }
    }

    /// Full router for HTTP-level tests.
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            db: self.db.clone(),
            config: Arc::new(test_config()),
            event_sender: self.event_sender.clone(),
            auth_service: self.auth_service.clone(),
            services: self.services.clone(),
        };
        boutique_api::app_router(state)
    }

    pub fn token_for(&self, user: &UserModel) -> String {
        self.auth_service.issue_token(user).expect("token")
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiration: 3600,
        auth_issuer: "boutique-api".to_string(),
        auth_audience: "boutique-storefront".to_string(),
        host: "127.0.0.1".to_string(),
        port: 18080,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_acquire_timeout_secs: 5,
        stripe_secret_key: None,
        stripe_api_base: "https://api.stripe.com".to_string(),
        currency: "usd".to_string(),
        free_shipping_threshold: dec!(150),
        flat_shipping_fee: dec!(15),
        tax_rate: dec!(0.05),
    }
}

pub async fn seed_product(db: &DbPool, name: &str, price: Decimal, stock: i32) -> ProductModel {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(format!("{name} description")),
        price: Set(price),
        size: Set("M".to_string()),
        stock: Set(stock),
        image: Set(format!("https://img.example/{name}.jpg")),
        secondary_image1: Set(None),
        secondary_image2: Set(None),
        secondary_image3: Set(None),
        category: Set("apparel".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

pub async fn seed_user(db: &DbPool, email: &str, is_admin: bool) -> UserModel {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Test Shopper".to_string()),
        email: Set(email.to_string()),
        password_hash: Set(auth::hash_password(TEST_PASSWORD).expect("hash")),
        image: Set(None),
        address: Set(String::new()),
        phone: Set(String::new()),
        is_admin: Set(is_admin),
        reset_password_token: Set(None),
        reset_password_expires: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}
