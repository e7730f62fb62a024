//! Media localization seam used by the job managers.

use std::path::Path;

use async_trait::async_trait;

use reel_storage::{FetchedMedia, Localizer, StorageResult, UrlCache};

/// What the generation manager needs from the media localizer.
#[async_trait]
pub trait MediaLocalizer: Send + Sync {
    /// Download a remote result into `category`, reusing `cache` hits when given.
    async fn fetch_and_store(
        &self,
        url: &str,
        category: &str,
        cache: Option<&UrlCache>,
    ) -> StorageResult<FetchedMedia>;

    async fn probe_duration(&self, path: &Path) -> StorageResult<f64>;

    async fn probe_resolution(&self, path: &Path) -> StorageResult<(u32, u32)>;

    async fn to_inline_encoding(&self, reference: &str) -> StorageResult<String>;

    /// Whether `reference` points into local storage (relative path or `/static/` URL).
    fn is_local_reference(&self, reference: &str) -> bool;

    /// Whether a storage-relative file exists.
    async fn file_exists(&self, relative_path: &str) -> bool;
}

#[async_trait]
impl MediaLocalizer for Localizer {
    async fn fetch_and_store(
        &self,
        url: &str,
        category: &str,
        cache: Option<&UrlCache>,
    ) -> StorageResult<FetchedMedia> {
        match cache {
            Some(cache) => self.fetch_and_store_cached(url, category, cache).await,
            None => Localizer::fetch_and_store(self, url, category).await,
        }
    }

    async fn probe_duration(&self, path: &Path) -> StorageResult<f64> {
        Localizer::probe_duration(self, path).await
    }

    async fn probe_resolution(&self, path: &Path) -> StorageResult<(u32, u32)> {
        Localizer::probe_resolution(self, path).await
    }

    async fn to_inline_encoding(&self, reference: &str) -> StorageResult<String> {
        Localizer::to_inline_encoding(self, reference).await
    }

    fn is_local_reference(&self, reference: &str) -> bool {
        self.storage().relative_from_reference(reference).is_some()
    }

    async fn file_exists(&self, relative_path: &str) -> bool {
        self.storage().exists(relative_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_storage::{LocalStorage, LocalizerConfig};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_reference_detection() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:8000/static").unwrap();
        let localizer = Localizer::new(storage, LocalizerConfig::default()).unwrap();

        assert!(localizer.is_local_reference("images/a.png"));
        assert!(localizer.is_local_reference("http://localhost:8000/static/images/a.png"));
        assert!(!localizer.is_local_reference("https://cdn.example.com/a.png"));
        assert!(!localizer.is_local_reference("data:image/png;base64,AAAA"));
        assert!(!localizer.file_exists("images/a.png").await);
    }
}
