//! HTTP surface. Handlers stay thin: decode the request, call a service,
//! shape the `{ "success": true, ... }` envelope the storefront expects.

pub mod admin;
pub mod auth;
pub mod carts;
pub mod common;
pub mod health;
pub mod orders;
pub mod products;
