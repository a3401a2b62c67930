//! Directory listing.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::IoError;
use crate::paths::ResolvedPath;
use crate::storage::StorageRoots;
use crate::transfer::UPLOAD_TEMP_PREFIX;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "heic"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus"];
const DOCUMENT_EXTS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "md", "csv"];
const ARCHIVE_EXTS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "apk"];

/// Coarse type used by the view to pick an icon.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Directory,
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension() else {
            return FileKind::Other;
        };
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        let ext = ext.as_str();

        if IMAGE_EXTS.contains(&ext) {
            FileKind::Image
        } else if VIDEO_EXTS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTS.contains(&ext) {
            FileKind::Audio
        } else if DOCUMENT_EXTS.contains(&ext) {
            FileKind::Document
        } else if ARCHIVE_EXTS.contains(&ext) {
            FileKind::Archive
        } else {
            FileKind::Other
        }
    }
}

/// One child of a listed directory.
#[derive(Debug, Serialize, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    /// Present only for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub kind: FileKind,
}

impl DirectoryEntry {
    pub fn display_size(&self) -> String {
        self.size.map(human_size).unwrap_or_default()
    }
}

/// Result of listing one directory.
#[derive(Debug, Serialize)]
pub struct Listing {
    pub path: PathBuf,
    pub root: String,
    /// `None` at the owning root. Untrusted on the way back in.
    pub parent: Option<PathBuf>,
    pub entries: Vec<DirectoryEntry>,
}

fn system_time_to_chrono(time: SystemTime) -> Option<DateTime<Utc>> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    DateTime::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
}

/// Whether a symlink's target stays inside one of `roots`.
fn link_stays_inside(path: &Path, roots: &StorageRoots) -> bool {
    match std::fs::canonicalize(path) {
        Ok(target) => roots.iter().any(|root| target.starts_with(&root.canonical)),
        Err(_) => false,
    }
}

/// List a resolved directory.
///
/// Children that cannot be stat'ed (broken symlinks, revoked permissions)
/// are skipped, as are uploads still in flight and symlinks whose target
/// lies outside every root. Entries are ordered directories first, then by
/// name, case-insensitively.
pub fn list_directory(
    dir: &ResolvedPath,
    roots: &StorageRoots,
    show_hidden: bool,
) -> Result<Listing, IoError> {
    let read_dir = std::fs::read_dir(dir.path()).map_err(IoError::read)?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {}", dir.path().display(), e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(UPLOAD_TEMP_PREFIX) || (!show_hidden && name.starts_with('.')) {
            continue;
        }

        let path = entry.path();
        let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if is_symlink && !link_stays_inside(&path, roots) {
            debug!("Skipping {}: link target is outside every root", path.display());
            continue;
        }

        // Follows symlinks so a link to a directory lists as a directory.
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let is_dir = metadata.is_dir();
        let modified = metadata.modified().ok().and_then(system_time_to_chrono);

        entries.push(DirectoryEntry {
            kind: if is_dir {
                FileKind::Directory
            } else {
                FileKind::from_path(&path)
            },
            size: if is_dir { None } else { Some(metadata.len()) },
            name,
            path,
            is_dir,
            modified,
        });
    }

    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(Listing {
        path: dir.path().to_path_buf(),
        root: dir.root().name.clone(),
        parent: dir.parent(),
        entries,
    })
}

/// Format a byte count as e.g. `1.5 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
