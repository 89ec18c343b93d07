//! Business logic, one service per domain area. Services own no HTTP
//! concerns; handlers translate their results and [`crate::errors::ServiceError`]
//! values onto the wire.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod gateway;
pub mod orders;
pub mod pricing;

pub use accounts::AccountService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
