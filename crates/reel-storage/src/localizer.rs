//! Media localizer: downloads remote media into storage, probes it, and
//! produces inline `data:` encodings for providers that need them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use reel_media::{MediaError, MediaResult, SourceResolver};

use crate::error::{StorageError, StorageResult};
use crate::local::{extension_from_content_type, extension_from_url, LocalStorage};

/// Default hard deadline for one download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A remote file stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    /// Storage-relative path, for persistence
    pub relative_path: String,
    /// Absolute path, for immediate subprocess use
    pub absolute_path: PathBuf,
    pub byte_size: u64,
}

/// URL → stored file mapping scoped to one batch of work.
///
/// Pass the same cache to several fetches so a URL that appears more than
/// once is downloaded only once. Drop it when the batch ends.
#[derive(Debug, Default)]
pub struct UrlCache {
    entries: Mutex<HashMap<String, FetchedMedia>>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<FetchedMedia> {
        self.entries.lock().ok()?.get(url).cloned()
    }

    pub fn insert(&self, url: impl Into<String>, media: FetchedMedia) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(url.into(), media);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Localizer configuration.
#[derive(Debug, Clone)]
pub struct LocalizerConfig {
    pub download_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Downloads, probes and inline-encodes media.
#[derive(Debug, Clone)]
pub struct Localizer {
    storage: LocalStorage,
    client: reqwest::Client,
    config: LocalizerConfig,
}

impl Localizer {
    pub fn new(storage: LocalStorage, config: LocalizerConfig) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StorageError::config_error(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            storage,
            client,
            config,
        })
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    fn timeout_secs(&self) -> u64 {
        self.config.download_timeout.as_secs()
    }

    async fn get(&self, url: &str) -> StorageResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(url, e, self.timeout_secs()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Stream `response` into `dest` through a `.part` sibling.
    async fn stream_to(
        &self,
        url: &str,
        response: reqwest::Response,
        dest: &Path,
    ) -> StorageResult<u64> {
        let part = dest.with_extension("part");
        let result = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut written = 0u64;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk =
                    chunk.map_err(|e| StorageError::from_reqwest(url, e, self.timeout_secs()))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            tokio::fs::rename(&part, dest).await?;
            Ok::<u64, StorageError>(written)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }

    /// Download `url` into `category` under a collision-free name.
    pub async fn fetch_and_store(&self, url: &str, category: &str) -> StorageResult<FetchedMedia> {
        let started = Instant::now();
        let response = self.get(url).await?;

        let ext = extension_from_url(url).unwrap_or_else(|| {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            extension_from_content_type(content_type).to_string()
        });

        let slot = self.storage.allocate(category, None, &ext).await?;
        let byte_size = self.stream_to(url, response, &slot.absolute_path).await?;

        metrics::histogram!("reel_download_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("reel_download_bytes_total").increment(byte_size);
        info!(
            url = %url,
            path = %slot.relative_path,
            bytes = byte_size,
            "Localized remote media"
        );

        Ok(FetchedMedia {
            relative_path: slot.relative_path,
            absolute_path: slot.absolute_path,
            byte_size,
        })
    }

    /// [`fetch_and_store`](Self::fetch_and_store) with a batch-scoped cache.
    pub async fn fetch_and_store_cached(
        &self,
        url: &str,
        category: &str,
        cache: &UrlCache,
    ) -> StorageResult<FetchedMedia> {
        if let Some(hit) = cache.get(url) {
            if hit.absolute_path.is_file() {
                debug!(url = %url, path = %hit.relative_path, "URL cache hit");
                return Ok(hit);
            }
        }
        let fetched = self.fetch_and_store(url, category).await?;
        cache.insert(url, fetched.clone());
        Ok(fetched)
    }

    /// Download `url` to an exact path (used for compositor scratch inputs).
    pub async fn download_to(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        let response = self.get(url).await?;
        self.stream_to(url, response, dest).await
    }

    /// Probed duration in seconds.
    pub async fn probe_duration(&self, path: &Path) -> StorageResult<f64> {
        Ok(reel_media::probe_duration(path).await?)
    }

    /// Probed `(width, height)`.
    pub async fn probe_resolution(&self, path: &Path) -> StorageResult<(u32, u32)> {
        Ok(reel_media::probe_resolution(path).await?)
    }

    /// Convert a reference to a `data:` URI.
    ///
    /// Inline data passes through. Local paths and `/static/` URLs are read
    /// from disk, falling back to a remote fetch when the local file is
    /// missing and the reference is itself a URL. Remote URLs are downloaded.
    pub async fn to_inline_encoding(&self, reference: &str) -> StorageResult<String> {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            return Ok(reference.to_string());
        }

        let is_url = reference.starts_with("http://") || reference.starts_with("https://");

        if let Some(path) = self.storage.resolve_local(reference) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(encode_data_uri(&bytes)),
                Err(e) if is_url => {
                    warn!(path = %path.display(), error = %e, "Local read failed, fetching remotely");
                }
                Err(e) => return Err(e.into()),
            }
        } else if !is_url {
            return Err(StorageError::not_found(reference));
        }

        let bytes = self
            .get(reference)
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::from_reqwest(reference, e, self.timeout_secs()))?;
        Ok(encode_data_uri(&bytes))
    }
}

#[async_trait]
impl SourceResolver for Localizer {
    async fn resolve(&self, source: &str, scratch: &Path) -> MediaResult<PathBuf> {
        if let Some(path) = self.storage.resolve_local(source) {
            return Ok(path);
        }
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(MediaError::source_unavailable(source, "no such local file"));
        }

        let ext = extension_from_url(source).unwrap_or_else(|| "mp4".to_string());
        let dest = scratch.join(format!("src_{}.{}", uuid::Uuid::new_v4().simple(), ext));
        self.download_to(source, &dest)
            .await
            .map_err(|e| MediaError::source_unavailable(source, e.to_string()))?;
        Ok(dest)
    }
}

/// Sniff an image MIME type from magic bytes, defaulting to JPEG.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// `data:<mime>;base64,<payload>`
pub fn encode_data_uri(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_image_mime(bytes), STANDARD.encode(bytes))
}

/// Split a `data:` URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> StorageResult<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StorageError::InlineEncoding("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| StorageError::InlineEncoding("data URI has no payload".to_string()))?;
    let mime = meta
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    if !meta.ends_with(";base64") {
        return Err(StorageError::InlineEncoding(
            "only base64 data URIs are supported".to_string(),
        ));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| StorageError::InlineEncoding(e.to_string()))?;
    Ok((mime, bytes))
}
