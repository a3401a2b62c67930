use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failures while turning a client-supplied path into a [`crate::paths::ResolvedPath`].
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path is outside every shared root")]
    OutsideRoot,

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Malformed path: {0}")]
    Malformed(String),

    #[error("Directory operation not allowed on file")]
    NotADirectory,

    #[error("File operation not allowed on directory")]
    NotAFile,
}

/// Filesystem failures after a path has been resolved.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Permission denied: {0}")]
    PermissionDenied(#[source] std::io::Error),

    #[error("Read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

impl IoError {
    /// Classify a read-side error, keeping permission problems distinct.
    pub fn read(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => IoError::PermissionDenied(err),
            _ => IoError::ReadFailed(err),
        }
    }

    /// Classify a write-side error, keeping permission problems distinct.
    pub fn write(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => IoError::PermissionDenied(err),
            _ => IoError::WriteFailed(err),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    /// Username or password did not match. Deliberately does not say which.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Login required")]
    Unauthenticated,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid filename: {0:?}")]
    InvalidName(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Malformed upload: {0}")]
    Multipart(String),
}

/// Errors returned by [`crate::service::Service::start`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("Port {0} is already in use")]
    PortInUse(u16),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("No storage roots available to share")]
    NoStorageRoots,

    #[error("Failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}

/// Everything a request handler can fail with.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Path(err) => match err {
                PathError::OutsideRoot => (StatusCode::FORBIDDEN, "OUTSIDE_ROOT"),
                PathError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                PathError::Malformed(_) => (StatusCode::BAD_REQUEST, "MALFORMED_PATH"),
                PathError::NotADirectory => (StatusCode::BAD_REQUEST, "NOT_A_DIRECTORY"),
                PathError::NotAFile => (StatusCode::BAD_REQUEST, "NOT_A_FILE"),
            },
            ServerError::Io(err) => match err {
                IoError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
                IoError::ReadFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "READ_FAILED"),
                IoError::WriteFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED"),
            },
            ServerError::Auth(err) => match err {
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
                AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            },
            ServerError::Transfer(err) => match err {
                TransferError::InvalidName(_) => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
                TransferError::FileTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
                }
                TransferError::Multipart(_) => (StatusCode::BAD_REQUEST, "MALFORMED_UPLOAD"),
            },
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
