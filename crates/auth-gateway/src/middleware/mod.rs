//! HTTP middleware for the auth gateway.
//!
//! Layer order, outermost first:
//!
//! ```text
//! http_metrics -> timeout -> trace -> session -> auth pipeline -> handler
//! ```

pub mod auth;
pub mod http_metrics;
pub mod session;

pub use auth::authenticate_request;
pub use http_metrics::http_metrics_middleware;
pub use session::{session_middleware, SessionSettings};
