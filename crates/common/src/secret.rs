//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. The gateway handles three kinds of secret
//! material: the OIDC client secret, bearer tokens in flight, and session
//! identifiers. Configuration holds the client secret as a [`SecretString`];
//! any struct that derives `Debug` around it stays safe to log.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ClientCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = ClientCredentials {
//!     client_id: "gateway".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Redacted stand-in used by hand-written `Debug` impls.
pub const REDACTED: &str = "[REDACTED]";
