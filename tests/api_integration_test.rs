//! HTTP-level tests through the full router: auth enforcement, the success
//! envelope, and the role guard on the admin surface.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{seed_product, seed_user, TestApp};

async fn send(
    router: axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let app = TestApp::new().await;
    let (status, body) = send(app.router(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn catalog_is_public_and_enveloped() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "Window Tee", dec!(25), 5).await;

    let (status, body) = send(app.router(), Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["products"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        app.router(),
        Method::GET,
        &format!("/api/products/{}", product.id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product"]["name"], "Window Tee");

    let (status, body) = send(
        app.router(),
        Method::GET,
        &format!("/api/products/{}", uuid::Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;
    let (status, _) = send(app.router(), Method::GET, "/api/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let user = seed_user(&app.db, "bearer@example.com", false).await;
    let token = app.token_for(&user);
    let (status, body) = send(app.router(), Method::GET, "/api/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn register_then_fetch_profile() {
    let app = TestApp::new().await;
    let (status, body) = send(
        app.router(),
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Wire Shopper",
            "email": "wire@example.com",
            "password": "sup3rsecret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(app.router(), Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "wire@example.com");

    let (status, body) = send(app.router(), Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Wire Shopper");
}

#[tokio::test]
async fn admin_surface_is_role_guarded() {
    let app = TestApp::new().await;
    let customer = seed_user(&app.db, "plain@example.com", false).await;
    let admin = seed_user(&app.db, "admin@example.com", true).await;

    let (status, _) = send(app.router(), Method::GET, "/api/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.token_for(&customer);
    let (status, _) = send(
        app.router(),
        Method::GET,
        "/api/admin/stats",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = app.token_for(&admin);
    let (status, body) = send(
        app.router(),
        Method::GET,
        "/api/admin/stats",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalUsers"], 2);
}

#[tokio::test]
async fn place_order_over_http() {
    let app = TestApp::new().await;
    let user = seed_user(&app.db, "wire-order@example.com", false).await;
    let product = seed_product(&app.db, "Wire Shirt", dec!(50), 10).await;
    let token = app.token_for(&user);

    let (status, _) = send(
        app.router(),
        Method::POST,
        "/api/cart/items",
        Some(&token),
        Some(json!({ "productId": product.id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app.router(),
        Method::POST,
        "/api/orders",
        Some(&token),
        Some(json!({
            "paymentMethod": "card",
            "paymentStatus": "Success",
            "transactionId": "TXN-WIRE-1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["total_amount"], "120.00");
    assert_eq!(body["payment"]["payment_status"], "Success");

    let (status, body) = send(
        app.router(),
        Method::GET,
        "/api/orders/myorders",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
    assert_eq!(body["orders"][0]["paymentStatus"], "Paid");
}

#[tokio::test]
async fn admin_can_create_products_over_http() {
    let app = TestApp::new().await;
    let admin = seed_user(&app.db, "creator@example.com", true).await;
    let token = app.token_for(&admin);

    let (status, body) = send(
        app.router(),
        Method::POST,
        "/api/admin/products",
        Some(&token),
        Some(json!({
            "name": "Posted Coat",
            "description": "Warm",
            "price": "120.00",
            "size": "L",
            "stock": 4,
            "image": "https://img.example/coat.jpg",
            "category": "outerwear",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["product"]["name"], "Posted Coat");

    let (status, _) = send(
        app.router(),
        Method::POST,
        "/api/admin/products",
        Some(&token),
        Some(json!({
            "name": "Bad Coat",
            "description": "Priced wrong",
            "price": "-1",
            "size": "L",
            "image": "https://img.example/coat.jpg",
            "category": "outerwear",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
