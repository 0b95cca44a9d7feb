//! Session middleware.
//!
//! Reads the session cookie, attaches a [`Session`] to the request and
//! writes the cookie back when the session was created, renewed or
//! invalidated.

use crate::session::{CookieAction, Session, SessionStore};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

/// Cookie and store settings for the session middleware.
#[derive(Clone)]
pub struct SessionSettings {
    pub store: Arc<dyn SessionStore>,
    pub cookie_name: String,
    pub secure: bool,
}

impl SessionSettings {
    fn session_cookie(&self, id: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build()
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(self.cookie_name.clone()).path("/").build()
    }
}

/// Attach a [`Session`] to every request.
pub async fn session_middleware(
    State(settings): State<Arc<SessionSettings>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let id = jar
        .get(&settings.cookie_name)
        .map(|cookie| cookie.value().to_string());
    let session = Session::new(settings.store.clone(), id);
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    match session.cookie_action().await {
        CookieAction::Set(id) => (jar.add(settings.session_cookie(id)), response).into_response(),
        CookieAction::Remove => (jar.remove(settings.removal_cookie()), response).into_response(),
        CookieAction::Keep => response,
    }
}
