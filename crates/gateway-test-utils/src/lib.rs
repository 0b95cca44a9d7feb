//! # Gateway Test Utilities
//!
//! Shared test utilities for the auth gateway.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs and JWK documents (`TestKeypair`)
//! - Fluent claim builders (`TestTokenBuilder`)
//! - A wiremock-backed identity provider (`MockIdp`)
//! - Server test harness (`TestGatewayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let idp = MockIdp::start().await;
//!     let server = TestGatewayServer::spawn(&idp).await?;
//!
//!     let token = idp.keypair().sign(&TestTokenBuilder::new().with_authorities(&["user"]).build());
//!     let response = server
//!         .client()
//!         .get(format!("{}/api/v1/account", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
