//! Common utilities shared across the gateway crates.

#![warn(clippy::pedantic)]

/// Module for JWT pre-validation helpers (size, header, time window)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
