//! HTTP server module for the TOU backend.
//!
//! An axum REST layer over the service layer. Handlers parse requests, take
//! the acting user from the `X-User` header and map [`ServiceError`] kinds to
//! status codes; all business rules live in [`crate::services`].
//!
//! [`ServiceError`]: crate::services::ServiceError

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
