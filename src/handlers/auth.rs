//! Account endpoints: register, login, password reset, and the
//! authenticated profile routes.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok};
use crate::services::accounts::{LoginInput, RegisterInput, UpdateProfileInput};
use crate::AppState;

/// Public routes, mounted at `/auth`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// Authenticated route mounted under `/auth`: who am I.
pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(profile))
}

/// Authenticated routes, mounted at `/profile`.
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/", get(profile).put(update_profile))
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let account = state.services.accounts.register(input).await?;
    Ok(created(json!({
        "success": true,
        "user": account.user,
        "token": account.token,
    })))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let account = state.services.accounts.login(input).await?;
    Ok(ok(json!({
        "success": true,
        "user": account.user,
        "token": account.token,
    })))
}

#[derive(Debug, Deserialize)]
struct ForgotPasswordRequest {
    email: String,
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = state.services.accounts.forgot_password(&req.email).await?;
    // Mail delivery is out of process; surface the token in the logs so
    // operators can complete the flow in environments without a mailer.
    info!(email = %req.email, reset_token = %token, "password reset token issued");
    Ok(ok(json!({
        "success": true,
        "message": format!("Password reset instructions sent to {}", req.email),
    })))
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    email: String,
    token: String,
    password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .accounts
        .reset_password(&req.email, &req.token, &req.password)
        .await?;
    Ok(ok(json!({
        "success": true,
        "message": "Password has been reset",
    })))
}

async fn profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state.services.accounts.profile(user.user_id).await?;
    Ok(ok(json!({ "success": true, "user": profile })))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state
        .services
        .accounts
        .update_profile(user.user_id, input)
        .await?;
    Ok(ok(json!({ "success": true, "user": profile })))
}
