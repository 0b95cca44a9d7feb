//! Authentication middleware.
//!
//! Runs the [`AuthPipeline`] and either forwards the request with its
//! [`AuthContext`] in the extensions or returns the failure response.

use crate::pipeline::{AuthContext, AuthPipeline};
use crate::session::Session;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Resolve the caller and enforce the policy chain.
///
/// # Response
///
/// - Browsers failing a policy get a 303 to `/login`
/// - Other clients get 401 with `X-Login-Path: /login`
/// - Allowed requests continue with `AuthContext` in extensions
#[instrument(skip_all, name = "gw.middleware.auth", fields(method = %req.method(), path = %req.uri().path()))]
pub async fn authenticate_request(
    State(pipeline): State<Arc<AuthPipeline>>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let mut ctx = req
        .extensions_mut()
        .remove::<AuthContext>()
        .unwrap_or_default();

    if let Err(response) = pipeline
        .run(&mut ctx, req.method(), req.uri(), req.headers(), session.as_ref())
        .await
    {
        return response;
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
