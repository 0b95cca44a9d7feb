//! HTTP request handlers for the auth gateway.

pub mod account;
pub mod health;
pub mod login;
pub mod metrics;

pub use account::{exchange_tokens, get_account};
pub use health::{health_check, readiness_check};
pub use login::{authorize, login, logout};
pub use metrics::metrics_handler;
