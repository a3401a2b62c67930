//! Storage discovery.
//!
//! Finds the directories this device can share: one "internal" root, any
//! removable volumes mounted next to it, and a degraded fallback when nothing
//! else is usable. Discovery only reads the filesystem.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RootSpec;
use crate::paths::normalize_lexically;

/// A directory declared servable.
///
/// Constructed only by discovery, after a listing probe succeeded. Immutable
/// for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageRoot {
    pub name: String,
    /// Absolute path as discovered (may itself be a symlink such as `/sdcard`).
    pub path: PathBuf,
    /// Fully resolved form of `path`, used for symlink escape checks.
    #[serde(skip)]
    pub canonical: PathBuf,
}

/// Ordered set of roots. The first root is the default browse location.
#[derive(Debug, Clone, Default)]
pub struct StorageRoots {
    roots: Vec<StorageRoot>,
}

impl StorageRoots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageRoot> {
        self.roots.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&StorageRoot> {
        self.roots.iter().find(|r| r.name == name)
    }

    /// The root browsed when a request carries no path.
    pub fn default_root(&self) -> Option<&StorageRoot> {
        self.roots.first()
    }

    /// Add a root after probing it. Returns false when the path is not a
    /// listable directory or duplicates an existing root's path or name.
    pub fn insert_probed(&mut self, name: &str, path: &Path) -> bool {
        if !is_listable_dir(path) {
            return false;
        }
        self.insert_unchecked(name, path)
    }

    fn insert_unchecked(&mut self, name: &str, path: &Path) -> bool {
        let absolute = normalize_lexically(&absolutize(path));
        let canonical = absolute
            .canonicalize()
            .unwrap_or_else(|_| absolute.clone());

        if self
            .roots
            .iter()
            .any(|r| r.path == absolute || r.canonical == canonical)
        {
            debug!("Skipping duplicate root {}", absolute.display());
            return false;
        }
        if self.get(name).is_some() {
            warn!("Skipping root {}: name {:?} already used", absolute.display(), name);
            return false;
        }

        self.roots.push(StorageRoot {
            name: name.to_string(),
            path: absolute,
            canonical,
        });
        true
    }

    /// Build roots from explicit configuration, probing each like discovery does.
    pub fn from_specs(specs: &[RootSpec]) -> Self {
        let mut roots = Self::new();
        for spec in specs {
            if !roots.insert_probed(&spec.name, &spec.path) {
                warn!(
                    "Configured root {:?} at {} is not usable, skipping",
                    spec.name,
                    spec.path.display()
                );
            }
        }
        roots
    }
}

/// Candidate locations probed by [`discover`]. Defaults are platform specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProbe {
    /// Ordered candidates for the internal root; the first listable one wins.
    #[serde(default)]
    pub internal: Vec<PathBuf>,
    /// Directories whose children are removable volumes.
    #[serde(default)]
    pub removable_parents: Vec<PathBuf>,
    /// Child names under a removable parent that alias internal storage.
    #[serde(default)]
    pub removable_exclude: Vec<String>,
    /// Prefix for removable root names.
    #[serde(default)]
    pub removable_prefix: String,
    /// Last-resort candidates, checked for existence only.
    #[serde(default)]
    pub fallback: Vec<PathBuf>,
}

impl Default for StorageProbe {
    #[cfg(target_os = "android")]
    fn default() -> Self {
        Self {
            internal: vec![
                PathBuf::from("/storage/emulated/0"),
                PathBuf::from("/storage/self/primary"),
                PathBuf::from("/sdcard"),
            ],
            removable_parents: vec![PathBuf::from("/storage")],
            removable_exclude: vec!["emulated".to_string(), "self".to_string()],
            removable_prefix: "SD_".to_string(),
            fallback: vec![PathBuf::from("/sdcard"), PathBuf::from("/storage/emulated/0")],
        }
    }

    #[cfg(target_os = "macos")]
    fn default() -> Self {
        Self {
            internal: dirs::home_dir().into_iter().collect(),
            removable_parents: vec![PathBuf::from("/Volumes")],
            removable_exclude: vec!["Macintosh HD".to_string()],
            removable_prefix: String::new(),
            fallback: vec![PathBuf::from("/Users/Shared")],
        }
    }

    #[cfg(not(any(target_os = "android", target_os = "macos")))]
    fn default() -> Self {
        let user = std::env::var("USER").unwrap_or_default();
        let removable_parents = if user.is_empty() {
            Vec::new()
        } else {
            vec![
                PathBuf::from("/media").join(&user),
                PathBuf::from("/run/media").join(&user),
            ]
        };

        Self {
            internal: dirs::home_dir().into_iter().collect(),
            removable_parents,
            removable_exclude: Vec::new(),
            removable_prefix: String::new(),
            fallback: std::env::current_dir().into_iter().collect(),
        }
    }
}

/// Discover shareable roots.
///
/// Permission errors are swallowed per candidate. An empty result means
/// nothing was usable; callers treat that as a configuration error.
pub fn discover(probe: &StorageProbe) -> StorageRoots {
    let mut roots = StorageRoots::new();

    match probe.internal.iter().find(|p| is_listable_dir(p)) {
        Some(path) => {
            roots.insert_unchecked("Internal", path);
        }
        None => debug!("No internal storage candidate is listable"),
    }

    for parent in &probe.removable_parents {
        let entries = match std::fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot scan {}: {}", parent.display(), e);
                continue;
            }
        };

        let mut volumes: Vec<(String, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if probe.removable_exclude.iter().any(|x| *x == name) {
                    return None;
                }
                Some((name, entry.path()))
            })
            .collect();
        volumes.sort();

        for (name, path) in volumes {
            let root_name = format!("{}{}", probe.removable_prefix, name);
            if roots.insert_probed(&root_name, &path) {
                debug!("Found removable volume {} at {}", root_name, path.display());
            }
        }
    }

    if roots.is_empty() {
        if let Some(path) = probe.fallback.iter().find(|p| p.exists()) {
            warn!("Falling back to {} for storage", path.display());
            roots.insert_unchecked("Storage", path);
        }
    }

    info!("Discovered storage roots: {:?}", roots.names());
    roots
}

/// A directory counts only if it can actually be enumerated. Existence alone
/// passes for directories the process is not allowed to read.
fn is_listable_dir(path: &Path) -> bool {
    path.is_dir() && std::fs::read_dir(path).is_ok()
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
