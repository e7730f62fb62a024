use std::path::Path;

use anyhow::Context;
use reel_media::{check_ffmpeg, check_ffprobe};
use reel_providers::ProviderRegistry;
use reel_storage::LocalStorage;
use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with storage_root={} data_dir={}",
        config.storage_root.display(),
        config.data_dir.display()
    );
    ensure_dir(&config.storage_root).await?;
    ensure_dir(&config.scratch_dir).await?;
    ensure_dir(&config.data_dir).await?;

    let storage = LocalStorage::new(&config.storage_root, &config.storage_base_url)?;
    storage
        .check_writable()
        .await
        .context("storage root is not writable")?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    let providers = ProviderRegistry::from_env();
    if providers.is_empty() {
        anyhow::bail!("no video provider is configured");
    }
    println!("worker-selfcheck: providers={}", providers.names().join(","));

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))
}
