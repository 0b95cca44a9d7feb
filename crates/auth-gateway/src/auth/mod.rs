//! Token validation and identity types.

pub mod claims;
pub mod identity;
pub mod jwks;
pub mod validator;

pub use claims::Claims;
pub use identity::Identity;
pub use jwks::JwksClient;
pub use validator::{TokenKind, TokenValidator, ValidationFailure};
