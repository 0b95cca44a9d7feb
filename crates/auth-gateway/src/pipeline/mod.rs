//! Authentication pipeline.
//!
//! Every request runs through:
//!
//! ```text
//! IdentityResolvers (session, header) -> PolicyChain -> handler
//!                                             |
//!                                             +-> FailureResponder (deny)
//! ```
//!
//! Per-request state travels in an [`AuthContext`] stored in the request
//! extensions; handlers read it with the `AuthContext` extractor.

pub mod failure;
pub mod policy;
pub mod resolvers;

pub use failure::FailureResponder;
pub use policy::{Decision, DenyReason, PathPattern, Policy, PolicyChain, PolicyStage, StageMatcher};
pub use resolvers::{HeaderIdentityResolver, IdentityResolvers, Resolution, SessionIdentityResolver};

use crate::auth::Identity;
use crate::session::Session;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::convert::Infallible;

/// Authentication state of one request.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    identity: Option<Identity>,
    identity_resolved: bool,
    authorization_checked: bool,
}

impl AuthContext {
    /// Identity of the caller, if one was resolved.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Set once a resolver has produced an identity; later resolvers skip.
    pub fn identity_resolved(&self) -> bool {
        self.identity_resolved
    }

    /// Set once a policy stage has allowed the request.
    pub fn authorization_checked(&self) -> bool {
        self.authorization_checked
    }

    /// Whether the resolved identity carries `authority`.
    pub fn has_authority(&self, authority: &str) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.has_authority(authority))
    }

    pub(crate) fn resolve(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.identity_resolved = true;
    }

    pub(crate) fn mark_authorized(&mut self) {
        self.authorization_checked = true;
    }
}

/// Anonymous context when the pipeline did not run for this route.
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned().unwrap_or_default())
    }
}

/// Resolvers, policy chain and failure responder, wired together.
pub struct AuthPipeline {
    resolvers: IdentityResolvers,
    policies: PolicyChain,
    failure: FailureResponder,
}

impl AuthPipeline {
    pub fn new(resolvers: IdentityResolvers, policies: PolicyChain, failure: FailureResponder) -> Self {
        Self {
            resolvers,
            policies,
            failure,
        }
    }

    /// Resolve the caller and apply the policy chain.
    ///
    /// Returns `Ok(())` when the request may proceed, or the response to
    /// send instead.
    pub async fn run(
        &self,
        ctx: &mut AuthContext,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        session: Option<&Session>,
    ) -> Result<(), Response> {
        self.resolvers.resolve_all(ctx, session, headers).await;

        match self.policies.authorize(ctx, method, uri.path()) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::debug!(
                    target: "gw.pipeline",
                    method = %method,
                    path = %uri.path(),
                    reason = ?reason,
                    "Request denied"
                );
                Err(self.failure.respond(reason, headers, uri, session).await)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use serde_json::json;

    fn identity(authorities: &[&str]) -> Identity {
        let claims: Claims =
            serde_json::from_value(json!({"sub": "u", "authorities": authorities})).unwrap();
        Identity::bearer("token".to_string(), claims)
    }

    #[test]
    fn test_default_context_is_anonymous() {
        let ctx = AuthContext::default();

        assert!(!ctx.is_authenticated());
        assert!(!ctx.identity_resolved());
        assert!(!ctx.authorization_checked());
        assert!(!ctx.has_authority("user"));
    }

    #[test]
    fn test_resolve_sets_flag() {
        let mut ctx = AuthContext::default();
        ctx.resolve(identity(&["user"]));

        assert!(ctx.identity_resolved());
        assert!(ctx.has_authority("user"));
        assert!(!ctx.has_authority("admin"));
    }

    #[tokio::test]
    async fn test_extractor_defaults_to_anonymous() {
        let (mut parts, ()) = axum::http::Request::new(()).into_parts();

        let ctx = AuthContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_extractor_reads_extension() {
        let (mut parts, ()) = axum::http::Request::new(()).into_parts();
        let mut ctx = AuthContext::default();
        ctx.resolve(identity(&[]));
        parts.extensions.insert(ctx);

        let extracted = AuthContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(extracted.is_authenticated());
    }
}
