use std::path::Path;
use std::process::Command;

use broll_media::{check_ffmpeg, check_ffprobe};
use broll_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "broll-selfcheck: starting with work_dir={} output_dir={}",
        config.work_dir.display(),
        config.output_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.output_dir).await?;
    ensure_tool("ffmpeg", check_ffmpeg().map_err(anyhow::Error::from)?.as_path())?;
    ensure_tool("ffprobe", check_ffprobe().map_err(anyhow::Error::from)?.as_path())?;

    println!(
        "broll-selfcheck: ok (max_tasks={}, timeout={}s, size_limit={}MB, overlap={})",
        config.max_concurrent_tasks,
        config.task_timeout.as_secs(),
        config.max_total_size_mb,
        config.overlap_policy
    );
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tool(name: &str, path: &Path) -> anyhow::Result<()> {
    let output = Command::new(path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    println!("broll-selfcheck: {} at {}", name, path.display());
    Ok(())
}
