//! Application state.

use std::sync::Arc;

use tracing::{info, warn};

use reel_media::Compositor;
use reel_providers::ProviderRegistry;
use reel_storage::{LocalStorage, Localizer};
use reel_store::FileStore;
use reel_worker::{GenerationManager, MergeManager, RetryConfig, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: LocalStorage,
    pub generations: GenerationManager,
    pub merges: MergeManager,
}

impl AppState {
    pub fn from_parts(
        config: ApiConfig,
        storage: LocalStorage,
        generations: GenerationManager,
        merges: MergeManager,
    ) -> Self {
        Self {
            config,
            storage,
            generations,
            merges,
        }
    }

    /// Build the file-backed store, provider registry, localizer and compositor.
    pub async fn new(config: ApiConfig, worker: &WorkerConfig) -> anyhow::Result<Self> {
        let storage = LocalStorage::new(&worker.storage_root, &worker.storage_base_url)?;
        let localizer = Localizer::new(storage.clone(), worker.localizer())?;
        let store = Arc::new(FileStore::open(&worker.data_dir).await?);

        let providers = ProviderRegistry::from_env();
        if providers.is_empty() {
            warn!("No video provider configured; generation submissions will be rejected");
        } else {
            info!(providers = ?providers.names(), "Video providers registered");
        }

        let compositor = Compositor::new(localizer.clone(), worker.compositor());
        let generations = GenerationManager::new(
            store.clone(),
            Arc::new(providers),
            Arc::new(localizer),
            worker.polling(),
        )
        .with_sink(store.clone())
        .with_download_retry(
            RetryConfig::new("result_download").with_max_retries(worker.download_retries),
        );
        let merges =
            MergeManager::new(store.clone(), Arc::new(compositor), storage.clone()).with_sink(store);

        Ok(Self::from_parts(config, storage, generations, merges))
    }

    /// Settle jobs left behind by a previous process.
    pub async fn recover(&self) -> anyhow::Result<()> {
        let interrupted = self.merges.recover().await?;
        let summary = self.generations.recover().await?;
        info!(
            resumed = summary.resumed,
            skipped = summary.skipped,
            failed = summary.failed,
            interrupted_merges = interrupted,
            "Crash recovery complete"
        );
        Ok(())
    }
}
