//! Downloads and uploads.

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::CollisionPolicy;
use crate::error::{IoError, PathError, ServerError, TransferError};
use crate::paths::{ResolvedPath, normalize_lexically};

/// Prefix of in-progress upload files. Listings hide them.
pub const UPLOAD_TEMP_PREFIX: &str = ".lanshare-upload-";

const MAX_FILENAME_BYTES: usize = 255;
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a client-supplied filename.
///
/// Keeps only the last path component, drops control characters, replaces
/// characters that are unsafe on common filesystems, and trims leading and
/// trailing dots and spaces, which also disposes of `.` and `..`.
pub fn sanitize_filename(filename: &str) -> Result<String, TransferError> {
    let invalid = || TransferError::InvalidName(filename.to_string());

    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let sanitized: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ');
    if sanitized.is_empty() {
        return Err(invalid());
    }

    // Windows device names stay usable as `_aux.txt` on every platform.
    let upper = sanitized.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    let sanitized = if RESERVED_DEVICE_NAMES.contains(&stem) {
        format!("_{}", sanitized)
    } else {
        sanitized.to_string()
    };

    if sanitized.len() <= MAX_FILENAME_BYTES {
        return Ok(sanitized);
    }

    let mut end = MAX_FILENAME_BYTES;
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    Ok(sanitized[..end].to_string())
}

// ============================================================================
// Download
// ============================================================================

/// An opened file ready to stream to a client.
#[derive(Debug)]
pub struct Download {
    pub file: fs::File,
    pub file_name: String,
    pub size: u64,
    pub mime: String,
}

/// Open a resolved regular file for download.
pub async fn open_download(target: &ResolvedPath) -> Result<Download, ServerError> {
    if target.is_dir() {
        return Err(PathError::NotAFile.into());
    }

    let path = target.path();
    let metadata = fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ServerError::from(PathError::NotFound(path.display().to_string())),
        _ => IoError::read(e).into(),
    })?;
    if !metadata.is_file() {
        return Err(PathError::NotFound(path.display().to_string()).into());
    }

    let file = fs::File::open(path).await.map_err(IoError::read)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    debug!("Downloading file: {}", path.display());

    Ok(Download {
        file,
        file_name,
        size: metadata.len(),
        mime,
    })
}

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987 name.
fn attachment_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

impl IntoResponse for Download {
    fn into_response(self) -> Response {
        // Dropping the body on disconnect drops the reader and closes the file.
        let body = Body::from_stream(ReaderStream::new(self.file));

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.mime),
                (header::CONTENT_LENGTH, self.size.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    attachment_disposition(&self.file_name),
                ),
            ],
            body,
        )
            .into_response()
    }
}

// ============================================================================
// Upload
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub on_collision: CollisionPolicy,
    pub max_size: u64,
}

/// A file that was written into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Store `content` as `supplied_name` inside `dir`.
///
/// The bytes go to a temporary file in `dir` first and are moved into place
/// only once complete, so readers never see a partial file and two uploads to
/// the same name cannot interleave.
pub async fn store_upload<S, E>(
    dir: &ResolvedPath,
    supplied_name: &str,
    content: S,
    options: UploadOptions,
) -> Result<StoredFile, ServerError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    if !dir.is_dir() {
        return Err(PathError::NotADirectory.into());
    }

    let name = sanitize_filename(supplied_name).inspect_err(|_| {
        warn!("Rejected invalid filename: {:?}", supplied_name);
    })?;
    let target = contained_child(dir.path(), &name)
        .ok_or_else(|| TransferError::InvalidName(supplied_name.to_string()))?;

    if options.on_collision == CollisionPolicy::Overwrite {
        refuse_unsafe_overwrite(&target).await?;
    }

    let temp_path = dir
        .path()
        .join(format!("{}{}.part", UPLOAD_TEMP_PREFIX, uuid::Uuid::new_v4().simple()));

    let size = match write_temp(&temp_path, content, options.max_size).await {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    let final_path = match options.on_collision {
        CollisionPolicy::Overwrite => fs::rename(&temp_path, &target)
            .await
            .map(|_| target)
            .map_err(IoError::write),
        CollisionPolicy::Rename => place_without_clobber(&temp_path, dir.path(), &name).await,
    };
    let final_path = match final_path {
        Ok(path) => path,
        Err(e) => {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
    };

    let stored_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());

    info!("Uploaded file: {} ({} bytes)", final_path.display(), size);

    Ok(StoredFile {
        path: final_path,
        name: stored_name,
        size,
    })
}

/// Join `name` onto `dir` and confirm the result is a direct child.
fn contained_child(dir: &Path, name: &str) -> Option<PathBuf> {
    let dir = normalize_lexically(dir);
    let joined = normalize_lexically(&dir.join(name));
    if joined.parent() == Some(dir.as_path()) && joined.file_name().is_some() {
        Some(joined)
    } else {
        None
    }
}

async fn refuse_unsafe_overwrite(target: &Path) -> Result<(), ServerError> {
    let Ok(metadata) = fs::symlink_metadata(target).await else {
        return Ok(());
    };
    if metadata.file_type().is_symlink() {
        warn!("Refusing to overwrite symlink: {}", target.display());
        return Err(PathError::OutsideRoot.into());
    }
    if metadata.is_dir() {
        return Err(PathError::NotAFile.into());
    }
    Ok(())
}

async fn write_temp<S, E>(temp_path: &Path, mut content: S, limit: u64) -> Result<u64, ServerError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await
        .map_err(IoError::write)?;

    let mut total_size = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk.map_err(|e| TransferError::Multipart(e.to_string()))?;
        total_size = total_size.saturating_add(chunk.len() as u64);
        if total_size > limit {
            return Err(TransferError::FileTooLarge {
                size: total_size,
                limit,
            }
            .into());
        }
        file.write_all(&chunk).await.map_err(IoError::write)?;
    }

    file.flush().await.map_err(IoError::write)?;
    file.sync_all().await.map_err(IoError::write)?;
    Ok(total_size)
}

/// Candidate name for the n-th collision: `report (2).txt`.
fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Move `temp_path` to the first free numbered name. Hard links fail on an
/// existing destination, which makes the claim atomic where supported.
async fn place_without_clobber(
    temp_path: &Path,
    dir: &Path,
    name: &str,
) -> Result<PathBuf, IoError> {
    for n in 0..MAX_RENAME_ATTEMPTS {
        let candidate = dir.join(numbered_name(name, n));

        match fs::hard_link(temp_path, &candidate).await {
            Ok(()) => {
                let _ = fs::remove_file(temp_path).await;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                // Filesystems without hard links (FAT on SD cards).
                debug!("hard_link unavailable ({}), falling back to rename", e);
                if fs::symlink_metadata(&candidate).await.is_ok() {
                    continue;
                }
                fs::rename(temp_path, &candidate)
                    .await
                    .map_err(IoError::write)?;
                return Ok(candidate);
            }
        }
    }

    Err(IoError::WriteFailed(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {}", name),
    )))
}
