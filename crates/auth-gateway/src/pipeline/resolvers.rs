//! Identity resolvers.
//!
//! Each resolver looks for an identity in one place. Resolvers run in the
//! configured order and are guarded by [`AuthContext::identity_resolved`]:
//! once one produces an identity, the rest skip.

use super::AuthContext;
use crate::auth::{Identity, TokenValidator};
use crate::config::ResolverKind;
use crate::oauth::OAuthClient;
use crate::observability::metrics::record_identity_resolution;
use crate::session::Session;
use axum::http::{header, HeaderMap};
use std::sync::Arc;
use tracing::instrument;

const BEARER_PREFIX: &str = "Bearer ";

/// Result of one resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An identity was found and validated.
    Resolved(Identity),
    /// Nothing usable was found.
    Absent,
    /// An earlier resolver already produced an identity.
    Skipped,
}

/// Identity stored in the server-side session, refreshed when its access
/// token has expired.
pub struct SessionIdentityResolver {
    access_validator: Arc<TokenValidator>,
    refresh_validator: Arc<TokenValidator>,
    oauth: Arc<OAuthClient>,
}

impl SessionIdentityResolver {
    pub fn new(
        access_validator: Arc<TokenValidator>,
        refresh_validator: Arc<TokenValidator>,
        oauth: Arc<OAuthClient>,
    ) -> Self {
        Self {
            access_validator,
            refresh_validator,
            oauth,
        }
    }

    #[instrument(skip_all)]
    pub async fn resolve(&self, ctx: &mut AuthContext, session: Option<&Session>) -> Resolution {
        if ctx.identity_resolved() {
            return Resolution::Skipped;
        }
        let Some(session) = session else {
            return Resolution::Absent;
        };
        let Some(identity) = session.load().await.identity else {
            return Resolution::Absent;
        };

        if let Ok(claims) = self.access_validator.validate(&identity.access_token).await {
            let identity = identity.with_claims(claims);
            ctx.resolve(identity.clone());
            record_identity_resolution("session");
            return Resolution::Resolved(identity);
        }

        let Some(refresh_token) = identity.refresh_token.as_deref() else {
            return Resolution::Absent;
        };
        if let Err(failure) = self.refresh_validator.validate(refresh_token).await {
            tracing::debug!(target: "gw.pipeline", failure = ?failure, "Stored refresh token not usable");
            return Resolution::Absent;
        }

        // Runs to completion even if this request is dropped
        let task = tokio::spawn(refresh_and_store(
            self.oauth.clone(),
            self.access_validator.clone(),
            session.clone(),
            identity,
        ));

        match task.await {
            Ok(Some(identity)) => {
                ctx.resolve(identity.clone());
                record_identity_resolution("refreshed");
                Resolution::Resolved(identity)
            }
            Ok(None) => Resolution::Absent,
            Err(e) => {
                tracing::error!(target: "gw.pipeline", error = %e, "Session refresh task failed");
                Resolution::Absent
            }
        }
    }
}

/// Refresh `identity`, validate the new access token and persist it.
///
/// Returns the refreshed identity with claims, or `None` on any failure.
async fn refresh_and_store(
    oauth: Arc<OAuthClient>,
    access_validator: Arc<TokenValidator>,
    session: Session,
    identity: Identity,
) -> Option<Identity> {
    let refreshed = match oauth.refresh(&identity).await {
        Ok(refreshed) => refreshed,
        Err(e) => {
            tracing::warn!(target: "gw.pipeline", error = %e, "Token refresh failed");
            return None;
        }
    };

    let claims = match access_validator.validate(&refreshed.access_token).await {
        Ok(claims) => claims,
        Err(failure) => {
            tracing::warn!(target: "gw.pipeline", failure = ?failure, "Refreshed access token failed validation");
            return None;
        }
    };

    let stored = refreshed.clone();
    if let Err(e) = session.update(move |record| record.identity = Some(stored)).await {
        tracing::warn!(target: "gw.pipeline", error = %e, "Failed to persist refreshed identity");
        return None;
    }

    tracing::debug!(target: "gw.pipeline", "Session identity refreshed");
    Some(refreshed.with_claims(claims))
}

/// Stateless identity from `Authorization: Bearer <token>`.
pub struct HeaderIdentityResolver {
    access_validator: Arc<TokenValidator>,
}

impl HeaderIdentityResolver {
    pub fn new(access_validator: Arc<TokenValidator>) -> Self {
        Self { access_validator }
    }

    #[instrument(skip_all)]
    pub async fn resolve(&self, ctx: &mut AuthContext, headers: &HeaderMap) -> Resolution {
        if ctx.identity_resolved() {
            return Resolution::Skipped;
        }

        // Prefix match is exact and case-sensitive
        let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        else {
            return Resolution::Absent;
        };

        match self.access_validator.validate(token).await {
            Ok(claims) => {
                let identity = Identity::bearer(token.to_string(), claims);
                ctx.resolve(identity.clone());
                record_identity_resolution("header");
                Resolution::Resolved(identity)
            }
            Err(failure) => {
                tracing::debug!(target: "gw.pipeline", failure = ?failure, "Bearer token rejected");
                Resolution::Absent
            }
        }
    }
}

/// All resolvers in their configured order.
pub struct IdentityResolvers {
    session: SessionIdentityResolver,
    header: HeaderIdentityResolver,
    order: Vec<ResolverKind>,
}

impl IdentityResolvers {
    pub fn new(
        session: SessionIdentityResolver,
        header: HeaderIdentityResolver,
        order: Vec<ResolverKind>,
    ) -> Self {
        Self {
            session,
            header,
            order,
        }
    }

    /// Run every resolver in order; the first identity wins.
    pub async fn resolve_all(
        &self,
        ctx: &mut AuthContext,
        session: Option<&Session>,
        headers: &HeaderMap,
    ) {
        for kind in &self.order {
            let resolution = match kind {
                ResolverKind::Session => self.session.resolve(ctx, session).await,
                ResolverKind::Header => self.header.resolve(ctx, headers).await,
            };
            if matches!(resolution, Resolution::Resolved(_)) {
                tracing::debug!(target: "gw.pipeline", resolver = ?kind, "Identity resolved");
            }
        }

        if !ctx.identity_resolved() {
            record_identity_resolution("none");
        }
    }
}
