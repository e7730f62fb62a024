//! Local durable storage.
//!
//! Files live under `<root>/<category>/` with collision-free names. Callers
//! persist the storage-relative path and resolve it to an absolute path only
//! when a subprocess or the filesystem needs it.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use reel_models::is_remote_url;

use crate::error::{StorageError, StorageResult};

/// Category for downloaded reference images.
pub const CATEGORY_IMAGES: &str = "images";
/// Category for localized generation results.
pub const CATEGORY_VIDEOS: &str = "videos";
/// Category for compositor output.
pub const CATEGORY_MERGED: &str = "videos/merged";

/// Path segment under which the API serves the storage root.
const STATIC_SEGMENT: &str = "/static/";

/// A file slot inside storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Path relative to the storage root, with `/` separators
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Public URL under the static base
    pub url: String,
}

/// Local filesystem storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::config_error(format!(
                "failed to create storage root {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Collision-free file name: `[prefix_]YYYYmmdd_HHMMSS_<8 hex>.<ext>`.
    pub fn unique_name(prefix: Option<&str>, ext: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        let ext = ext.trim_start_matches('.');
        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{}_{}_{}.{}", prefix, timestamp, &suffix[..8], ext),
            None => format!("{}_{}.{}", timestamp, &suffix[..8], ext),
        }
    }

    /// Reserve a new file slot in `category`, creating the directory.
    pub async fn allocate(
        &self,
        category: &str,
        prefix: Option<&str>,
        ext: &str,
    ) -> StorageResult<StoredFile> {
        let category = category.trim_matches('/');
        let relative_path = format!("{}/{}", category, Self::unique_name(prefix, ext));
        let absolute_path = self.absolute_path(&relative_path)?;
        if let Some(parent) = absolute_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(path = %relative_path, "Allocated storage slot");
        Ok(StoredFile {
            url: self.public_url(&relative_path),
            relative_path,
            absolute_path,
        })
    }

    /// Resolve a storage-relative path. Anything that could escape the root is rejected.
    pub fn absolute_path(&self, path: &str) -> StorageResult<PathBuf> {
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::invalid_path(path));
        }
        Ok(self.root.join(candidate))
    }

    /// Storage-relative form of an absolute path under the root.
    pub fn relative_path(&self, absolute: &Path) -> Option<String> {
        absolute.strip_prefix(&self.root).ok().map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
    }

    /// Public URL for a relative path.
    pub fn public_url(&self, relative_path: &str) -> String {
        format!("{}/{}", self.base_url, relative_path.trim_start_matches('/'))
    }

    /// Storage-relative path for a `/static/` URL (or a relative path), if it points into storage.
    pub fn relative_from_reference(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("data:") || is_remote_url(reference) {
            return None;
        }
        if let Some(rest) = reference.strip_prefix(&format!("{}/", self.base_url)) {
            return Some(strip_query(rest).to_string());
        }
        if let Some(idx) = reference.find(STATIC_SEGMENT) {
            return Some(strip_query(&reference[idx + STATIC_SEGMENT.len()..]).to_string());
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return None;
        }
        let path = Path::new(reference);
        if path.is_absolute() {
            return self.relative_path(path);
        }
        Some(reference.trim_start_matches("./").to_string())
    }

    /// Local file backing a reference, if it exists on disk inside the root.
    ///
    /// Absolute paths are honoured only when they lie under the storage root.
    pub fn resolve_local(&self, reference: &str) -> Option<PathBuf> {
        let relative = self.relative_from_reference(reference.trim())?;
        let absolute = self.absolute_path(&relative).ok()?;
        absolute.is_file().then_some(absolute)
    }

    /// Whether a file exists at the relative path.
    pub async fn exists(&self, relative_path: &str) -> bool {
        match self.absolute_path(relative_path) {
            Ok(path) => tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete a stored file.
    pub async fn delete(&self, relative_path: &str) -> StorageResult<()> {
        let path = self.absolute_path(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(relative_path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write and remove a probe file to confirm the root is writable.
    pub async fn check_writable(&self) -> StorageResult<()> {
        let probe = self.root.join(format!(".write-check-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }
}

fn strip_query(value: &str) -> &str {
    value.split(['?', '#']).next().unwrap_or(value)
}

/// File extension from a URL path, ignoring query strings.
pub(crate) fn extension_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

/// File extension from a Content-Type header.
pub(crate) fn extension_from_content_type(content_type: &str) -> &'static str {
    const KNOWN: [(&str, &str); 7] = [
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/gif", "gif"),
        ("image/webp", "webp"),
        ("video/mp4", "mp4"),
        ("video/webm", "webm"),
        ("video/quicktime", "mov"),
    ];
    let ct = content_type.to_ascii_lowercase();
    KNOWN
        .iter()
        .find(|(mime, _)| ct.contains(mime))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}
