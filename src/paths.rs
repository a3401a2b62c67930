//! Path resolution.
//!
//! This is the only place a client-supplied path string becomes something the
//! filesystem code will touch. Handlers, the lister and the transfer code all
//! take a [`ResolvedPath`], which cannot be built outside this module.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PathError;
use crate::storage::{StorageRoot, StorageRoots};

/// A path proven to lie inside one of the shared roots, and to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    root: StorageRoot,
    is_dir: bool,
}

impl ResolvedPath {
    /// Absolute path, expressed under the owning root's declared path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_root(&self) -> bool {
        self.path == self.root.path
    }

    /// The direct parent, or `None` at the owning root. The result is a plain
    /// path: it goes back to the client and must be resolved again on use.
    pub fn parent(&self) -> Option<PathBuf> {
        if self.is_root() {
            return None;
        }
        self.path.parent().map(Path::to_path_buf)
    }

    /// Path relative to the owning root, `/`-separated.
    pub fn relative(&self) -> String {
        relative_to(&self.root.path, &self.path)
    }

    /// Fail unless this is a directory.
    pub fn expect_dir(self) -> Result<Self, PathError> {
        if self.is_dir {
            Ok(self)
        } else {
            Err(PathError::NotADirectory)
        }
    }

    /// Fail unless this is a regular file.
    pub fn expect_file(self) -> Result<Self, PathError> {
        if self.is_dir {
            Err(PathError::NotAFile)
        } else {
            Ok(self)
        }
    }
}

/// Resolves client paths against a fixed set of roots.
#[derive(Debug, Clone)]
pub struct PathResolver {
    roots: StorageRoots,
}

impl PathResolver {
    pub fn new(roots: StorageRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Resolve a client path.
    ///
    /// An empty path means the default (first) root. Relative paths are taken
    /// relative to the default root. `.` and `..` are collapsed lexically,
    /// then the result must sit under a root on component boundaries, exist,
    /// and still sit under that root after symlinks are followed.
    pub fn resolve(&self, client_path: Option<&str>) -> Result<ResolvedPath, PathError> {
        let default_root = self.roots.default_root().ok_or(PathError::OutsideRoot)?;

        let raw = client_path.map(str::trim).unwrap_or_default();
        if raw.contains('\0') {
            warn!("Path contains null byte");
            return Err(PathError::Malformed("null byte in path".to_string()));
        }

        let candidate = if raw.is_empty() {
            default_root.path.clone()
        } else if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            default_root.path.join(raw)
        };

        let normalized = normalize_lexically(&candidate);

        // Most specific root wins when roots nest.
        let root = self
            .roots
            .iter()
            .filter(|r| normalized.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
            .ok_or_else(|| {
                warn!("Path outside shared roots: {}", normalized.display());
                PathError::OutsideRoot
            })?;

        let canonical = normalized
            .canonicalize()
            .map_err(|_| PathError::NotFound(normalized.display().to_string()))?;

        // A symlink may lead into a different root; that is still inside.
        let (root, inside) = match canonical.strip_prefix(&root.canonical) {
            Ok(inside) => (root, inside),
            Err(_) => self
                .roots
                .iter()
                .find_map(|r| canonical.strip_prefix(&r.canonical).ok().map(|i| (r, i)))
                .ok_or_else(|| {
                    warn!(
                        "Symlink escape attempt: {} resolved to {} which is outside {}",
                        normalized.display(),
                        canonical.display(),
                        root.canonical.display()
                    );
                    PathError::OutsideRoot
                })?,
        };

        let path = if inside.as_os_str().is_empty() {
            root.path.clone()
        } else {
            root.path.join(inside)
        };
        let is_dir = std::fs::metadata(&canonical)
            .map(|m| m.is_dir())
            .map_err(|_| PathError::NotFound(normalized.display().to_string()))?;

        debug!("Resolved {:?} to {}", raw, path.display());

        Ok(ResolvedPath {
            path,
            root: root.clone(),
            is_dir,
        })
    }
}

/// Collapse `.` and `..` without touching the filesystem. `..` at the top
/// stays at the top, like the kernel does for `/..`.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let at_top = !result.components().any(|c| matches!(c, Component::Normal(_)));
                if !at_top {
                    result.pop();
                }
            }
            Component::Normal(name) => result.push(name),
        }
    }
    result
}

/// Relative path from `root` to `full_path`, always `/`-separated.
fn relative_to(root: &Path, full_path: &Path) -> String {
    let Ok(relative) = full_path.strip_prefix(root) else {
        return String::new();
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().to_string());
        }
    }

    parts.join("/")
}
