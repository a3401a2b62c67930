use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::StorageProbe;

/// What to do when an upload's name already exists in the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Atomically replace the existing file. Last writer wins.
    #[default]
    Overwrite,
    /// Store as `name (1).ext`, `name (2).ext`, ... never clobbering.
    Rename,
}

/// An explicitly configured share root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSpec {
    pub name: String,
    pub path: PathBuf,
}

impl std::str::FromStr for RootSpec {
    type Err = String;

    /// Parse `NAME=PATH`, or a bare `PATH` named after its last component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty root".to_string());
        }

        if let Some((name, path)) = s.split_once('=') {
            let name = name.trim();
            let path = path.trim();
            if name.is_empty() || path.is_empty() {
                return Err(format!("expected NAME=PATH, got {s:?}"));
            }
            return Ok(RootSpec {
                name: name.to_string(),
                path: PathBuf::from(path),
            });
        }

        let path = PathBuf::from(s);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Root".to_string());
        Ok(RootSpec { name, path })
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared login username
    #[serde(default = "default_username")]
    pub username: String,

    /// Shared login password
    #[serde(default = "default_password")]
    pub password: String,

    /// Maximum size of a single uploaded file (in bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    #[serde(default)]
    pub on_collision: CollisionPolicy,

    /// Timeout for non-streaming routes, 0 disables it
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Include dot-files in listings
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,

    /// Explicit roots. When non-empty, storage discovery is skipped.
    #[serde(default)]
    pub roots: Vec<RootSpec>,

    /// Candidate locations probed by storage discovery
    #[serde(default)]
    pub storage: StorageProbe,
}

fn default_port() -> u16 {
    8000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "123456".to_string()
}

fn default_max_upload_size() -> u64 {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_show_hidden() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            username: default_username(),
            password: default_password(),
            max_upload_size: default_max_upload_size(),
            on_collision: CollisionPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            show_hidden: default_show_hidden(),
            roots: Vec::new(),
            storage: StorageProbe::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// True when the credentials are still the well-known defaults.
    pub fn uses_default_credentials(&self) -> bool {
        self.username == default_username() && self.password == default_password()
    }
}
