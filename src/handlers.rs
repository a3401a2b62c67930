//! HTTP handlers.
//!
//! Browser routes answer failures with an HTML page, `/api/*` routes with
//! the JSON body of [`ServerError`]. Either way the status code is the same.

use axum::{
    Form, Json,
    extract::{Multipart, Query, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AppState;
use crate::auth::{CurrentSession, clear_session_cookie, session_cookie, session_tokens};
use crate::error::{IoError, PathError, ServerError, TransferError};
use crate::listing::{Listing, list_directory};
use crate::storage::StorageRoot;
use crate::transfer::{Download, StoredFile, UploadOptions, open_download, store_upload};
use crate::view;

// ============================================================================
// Request types
// ============================================================================

/// `?path=` on browse, download, upload and the JSON listing.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub roots: Vec<String>,
}

// ============================================================================
// HTML errors
// ============================================================================

/// A [`ServerError`] rendered as an HTML page.
#[derive(Debug)]
pub struct HtmlError(pub ServerError);

impl From<ServerError> for HtmlError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl From<PathError> for HtmlError {
    fn from(err: PathError) -> Self {
        Self(err.into())
    }
}

impl From<IoError> for HtmlError {
    fn from(err: IoError) -> Self {
        Self(err.into())
    }
}

impl From<TransferError> for HtmlError {
    fn from(err: TransferError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        let (status, _) = self.0.status_and_code();
        (
            status,
            Html(view::error_page(status.as_u16(), &self.0.to_string())),
        )
            .into_response()
    }
}

fn multipart_error(err: MultipartError) -> TransferError {
    TransferError::Multipart(err.body_text())
}

// ============================================================================
// Public routes
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        roots: state
            .resolver
            .roots()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// GET /login
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if session_tokens(&headers).any(|token| state.sessions.authorize(Some(token))) {
        return Redirect::to("/browse").into_response();
    }
    Html(view::login_page(None)).into_response()
}

/// POST /login
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.sessions.login(&form.username, &form.password) {
        Ok(token) => (
            AppendHeaders([(header::SET_COOKIE, session_cookie(token.as_str()))]),
            Redirect::to("/browse"),
        )
            .into_response(),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Html(view::login_page(Some(&e.to_string()))),
        )
            .into_response(),
    }
}

/// GET|POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    for token in session_tokens(&headers) {
        state.sessions.logout(token);
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Redirect::to("/login"),
    )
        .into_response()
}

// ============================================================================
// Protected routes
// ============================================================================

/// GET /
pub async fn index() -> Redirect {
    Redirect::to("/browse")
}

/// Resolve `path` to a directory and list it off the async runtime.
async fn list_path(state: &AppState, path: Option<String>) -> Result<Listing, ServerError> {
    let resolver = state.resolver.clone();
    let show_hidden = state.config.show_hidden;

    tokio::task::spawn_blocking(move || -> Result<Listing, ServerError> {
        let dir = resolver.resolve(path.as_deref())?.expect_dir()?;
        Ok(list_directory(&dir, resolver.roots(), show_hidden)?)
    })
    .await?
}

/// GET /browse?path=P
pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Html<String>, HtmlError> {
    let listing = list_path(&state, query.path).await?;
    debug!(
        "Listed {} ({} entries)",
        listing.path.display(),
        listing.entries.len()
    );
    Ok(Html(view::browse_page(&listing, state.resolver.roots())))
}

/// GET /download?path=P
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Download, HtmlError> {
    let target = state.resolver.resolve(query.path.as_deref())?;
    Ok(open_download(&target).await?)
}

/// POST /upload
///
/// Stores every file part of the multipart body. The target directory is
/// the `?path=` query parameter if given, otherwise the latest `path` field
/// seen before the file, otherwise the default root.
pub async fn upload(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<Redirect, HtmlError> {
    let options = UploadOptions {
        on_collision: state.config.on_collision,
        max_size: state.config.max_upload_size,
    };

    let mut form_path: Option<String> = None;
    let mut stored: Vec<StoredFile> = Vec::new();
    let mut last_dir = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            if field.name() == Some("path") {
                let value = field.text().await.map_err(multipart_error)?;
                form_path = Some(value).filter(|v| !v.is_empty());
            } else {
                debug!("Ignoring form field {:?}", field.name());
            }
            continue;
        };

        if file_name.is_empty() {
            continue;
        }

        let requested = query.path.as_deref().or(form_path.as_deref());
        let dir = state.resolver.resolve(requested)?.expect_dir()?;
        let file = store_upload(&dir, &file_name, Box::pin(field), options).await?;
        stored.push(file);
        last_dir = Some(dir);
    }

    let Some(dir) = last_dir else {
        return Err(TransferError::Multipart("No file in upload".to_string()).into());
    };

    info!(
        user = %session.username,
        "Stored {} file(s) in {}",
        stored.len(),
        dir.path().display()
    );

    Ok(Redirect::to(&format!(
        "/browse?path={}",
        urlencoding::encode(&dir.path().to_string_lossy())
    )))
}

/// GET /api/list?path=P
pub async fn api_list(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Listing>, ServerError> {
    Ok(Json(list_path(&state, query.path).await?))
}

/// GET /api/roots
pub async fn api_roots(State(state): State<AppState>) -> Json<Vec<StorageRoot>> {
    Json(state.resolver.roots().iter().cloned().collect())
}
