//! Session guard middleware.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::{Session, SessionGate};
use crate::error::{AuthError, ServerError};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "lanshare_session";

/// Every value of `cookie_name` in one `Cookie` header, in order.
pub fn tokens_from_cookie_header<'a>(
    cookie_header: &'a str,
    cookie_name: &'a str,
) -> impl Iterator<Item = &'a str> {
    cookie_header.split(';').map(str::trim).filter_map(move |pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Candidate session tokens from the request's cookies.
///
/// Browsers may send several `lanshare_session` cookies (a stale one from
/// another path or host alias alongside the live one), so callers try each.
pub fn session_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookie_header| tokens_from_cookie_header(cookie_header, SESSION_COOKIE))
}

/// `Set-Cookie` value for a new session. No `Max-Age`: the session lasts
/// until logout or server restart, the cookie until the browser closes.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// The session of an authenticated request.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(ServerError::Auth(AuthError::Unauthenticated))
    }
}

fn wants_html(req: &Request) -> bool {
    req.method() == Method::GET
        && req
            .headers()
            .get(header::ACCEPT)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}

/// Reject requests without a live session.
///
/// Browsers navigating to a page are redirected to `/login`; everything else
/// gets a 401.
pub async fn require_session(
    State(gate): State<SessionGate>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = session_tokens(req.headers()).find_map(|token| gate.session(Some(token)));

    let Some(session) = session else {
        debug!("Unauthenticated request to {}", req.uri().path());
        if wants_html(&req) {
            return Redirect::to("/login").into_response();
        }
        return ServerError::Auth(AuthError::Unauthenticated).into_response();
    };

    req.extensions_mut().insert(CurrentSession(session));
    next.run(req).await
}
