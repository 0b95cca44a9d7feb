//! Auth Gateway Library
//!
//! An OpenID Connect gateway that sits in front of downstream handlers and
//! decides, per request, who the caller is and whether they may proceed:
//!
//! - Authorization code login flow with CSRF state and session renewal
//! - Server-side sessions (in-memory or Redis) behind an HttpOnly cookie
//! - Stateless `Authorization: Bearer` access tokens
//! - Signature and time-window validation against the IdP JWKS
//! - Transparent access token refresh for session identities
//! - Path-scoped policies (anonymous, authenticated, authority required)
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware (session, auth) -> pipeline/*.rs -> handlers/*.rs
//!                                                    |
//!                                     auth/*.rs, oauth/*.rs, session/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Claims, identities, JWKS cache and token validation
//! - `config` - Gateway configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - Login flow, account and operational endpoints
//! - `middleware` - Session, authentication and HTTP metrics middleware
//! - `oauth` - IdP token and logout endpoint client
//! - `observability` - Prometheus metrics
//! - `pipeline` - Identity resolvers, policy chain and failure responses
//! - `routes` - Axum router setup
//! - `session` - Session records and stores

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod observability;
pub mod pipeline;
pub mod routes;
pub mod session;
