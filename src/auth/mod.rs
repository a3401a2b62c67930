//! Authentication module.
//!
//! A single shared username/password pair, checked by [`SessionGate`], and
//! a middleware that guards every route except login with a session cookie.

mod gate;
mod middleware;

pub use gate::{Session, SessionGate, SessionToken};
pub use middleware::{
    CurrentSession, SESSION_COOKIE, clear_session_cookie, require_session, session_cookie,
    session_tokens, tokens_from_cookie_header,
};
