//! Local-network file sharing over HTTP.
//!
//! The crate discovers the directories a device can share, serves them to
//! browsers on the same network behind a single shared login, and lets
//! clients browse, download and upload files. Every client path goes through
//! [`paths::PathResolver`] before it touches the filesystem.
//!
//! [`service::Service`] owns the listener and is what a shell (the bundled
//! CLI, or anything embedding the library) starts and stops.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod paths;
pub mod routes;
pub mod service;
pub mod storage;
pub mod transfer;
pub mod view;

use std::sync::Arc;

pub use auth::SessionGate;
pub use config::Config;
pub use error::{ServerError, ServiceError};
pub use paths::{PathResolver, ResolvedPath};
pub use service::{Service, ServiceState};
pub use storage::{StorageRoot, StorageRoots};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The only way from a client path to a filesystem path
    pub resolver: Arc<PathResolver>,
    /// Credential check and live sessions
    pub sessions: SessionGate,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create state over `roots`, taking credentials from `config`.
    pub fn new(config: Config, roots: StorageRoots) -> Self {
        let sessions = SessionGate::new(config.username.clone(), config.password.clone());
        Self::with_sessions(config, roots, sessions)
    }

    /// Create state with an existing session gate.
    pub fn with_sessions(config: Config, roots: StorageRoots, sessions: SessionGate) -> Self {
        Self {
            resolver: Arc::new(PathResolver::new(roots)),
            sessions,
            config: Arc::new(config),
        }
    }
}
