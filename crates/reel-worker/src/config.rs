//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reel_media::CompositorConfig;
use reel_storage::LocalizerConfig;

/// Polling budget for one generation task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollingConfig {
    /// Sleep before every poll
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 300, // 50 minutes at the default interval
        }
    }
}

impl PollingConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Hard deadline for one download
    pub download_timeout: Duration,
    /// Extra attempts for a transient download failure
    pub download_retries: u32,
    pub ffmpeg_timeout: Duration,
    pub storage_root: PathBuf,
    /// Public URL prefix the API serves the storage root under
    pub storage_base_url: String,
    /// Parent of per-merge scratch directories
    pub scratch_dir: PathBuf,
    /// Where the file store keeps job records
    pub data_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 300,
            download_timeout: Duration::from_secs(300),
            download_retries: 2,
            ffmpeg_timeout: Duration::from_secs(3600),
            storage_root: PathBuf::from("./data/storage"),
            storage_base_url: "http://localhost:8000/static".to_string(),
            scratch_dir: std::env::temp_dir().join("reel"),
            data_dir: PathBuf::from("./data/jobs"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_parse("GENERATION_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_poll_attempts: env_parse("GENERATION_MAX_POLL_ATTEMPTS")
                .unwrap_or(defaults.max_poll_attempts),
            download_timeout: env_parse("DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            download_retries: env_parse("DOWNLOAD_RETRIES").unwrap_or(defaults.download_retries),
            ffmpeg_timeout: env_parse("FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            storage_base_url: std::env::var("STORAGE_BASE_URL")
                .unwrap_or(defaults.storage_base_url),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    pub fn polling(&self) -> PollingConfig {
        PollingConfig::new(self.poll_interval, self.max_poll_attempts)
    }

    pub fn localizer(&self) -> LocalizerConfig {
        LocalizerConfig {
            download_timeout: self.download_timeout,
            ..Default::default()
        }
    }

    pub fn compositor(&self) -> CompositorConfig {
        CompositorConfig {
            ffmpeg_timeout: self.ffmpeg_timeout,
            ..CompositorConfig::new(&self.scratch_dir)
        }
    }
}
