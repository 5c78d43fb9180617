//! Task processing.
//!
//! One call to [`process_task`] takes a queued task to a terminal state:
//! fetch the seven sources, inspect the main video, plan the composition,
//! render, publish the artifact and record the outcome. The scratch
//! directory is removed whatever happens.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use broll_media::{
    plan_composition, FfmpegRenderer, FfprobeInspector, HttpFetcher, MediaFetcher, MediaInspector, Renderer,
};
use broll_models::{Task, TaskId};
use broll_queue::TaskStore;
use broll_storage::ArtifactStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::metrics;

/// File name of the in-progress render inside the scratch directory.
const RENDER_FILE_NAME: &str = "render.mp4";

/// Everything a worker needs to process tasks.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn TaskStore>,
    pub artifacts: ArtifactStore,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub inspector: Arc<dyn MediaInspector>,
    pub renderer: Arc<dyn Renderer>,
}

impl ProcessingContext {
    /// Create a context backed by HTTP downloads, ffprobe and ffmpeg.
    pub fn new(config: WorkerConfig, store: Arc<dyn TaskStore>, artifacts: ArtifactStore) -> WorkerResult<Self> {
        let fetcher = HttpFetcher::new(config.fetch_config())
            .map_err(|e| WorkerError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            store,
            artifacts,
            fetcher: Arc::new(fetcher),
            inspector: Arc::new(FfprobeInspector),
            renderer: Arc::new(FfmpegRenderer::default()),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn MediaInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Process one task to completion.
///
/// Returns the pipeline error if the task failed. By the time this returns
/// the task is terminal, unless the store refused the transition (for
/// example because the task was already claimed).
pub async fn process_task(ctx: &ProcessingContext, task_id: TaskId) -> WorkerResult<()> {
    let logger = TaskLogger::new(&task_id, "merge_broll");
    let span = logger.create_span();

    async {
        let task = match ctx.store.mark_running(&task_id).await {
            Ok(task) => task,
            Err(e) => {
                logger.log_warning(&format!("Skipping task: {}", e));
                return Err(e.into());
            }
        };

        logger.log_start(&format!("{} sources", task.request.source_urls().count()));
        metrics::record_task_started();
        let started = Instant::now();

        let timeout = ctx.config.task_timeout;
        let result = match tokio::time::timeout(timeout, run_pipeline(ctx, &task, &logger)).await {
            Ok(result) => result,
            // Rounded up so sub-second limits never report zero.
            Err(_) => Err(WorkerError::Timeout(timeout.as_secs_f64().ceil() as u64)),
        };

        if let Err(e) = ctx.artifacts.remove_scratch(&task_id).await {
            logger.log_warning(&format!("Failed to remove scratch directory: {}", e));
        }

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(output_ref) => finish_success(ctx, &task_id, &output_ref, elapsed, &logger).await,
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);
                metrics::record_task_failed(e.kind(), elapsed);
                if let Err(store_err) = ctx.store.mark_failed(&task_id, &message).await {
                    logger.log_warning(&format!("Failed to record failure: {}", store_err));
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn finish_success(
    ctx: &ProcessingContext,
    task_id: &TaskId,
    output_ref: &str,
    elapsed: f64,
    logger: &TaskLogger,
) -> WorkerResult<()> {
    match ctx.store.mark_success(task_id, output_ref).await {
        Ok(_) => {
            metrics::record_task_completed(elapsed);
            logger.log_completion(&format!("{} in {:.1}s", output_ref, elapsed));
            Ok(())
        }
        Err(e) => {
            // The record no longer accepts an artifact, so nothing would ever reap it.
            logger.log_error(&format!("Failed to record success: {}", e));
            metrics::record_task_failed("store", elapsed);
            if let Err(del) = ctx.artifacts.delete_artifact(output_ref).await {
                logger.log_warning(&format!("Failed to remove unrecorded artifact: {}", del));
            }
            Err(e.into())
        }
    }
}

async fn run_pipeline(ctx: &ProcessingContext, task: &Task, logger: &TaskLogger) -> WorkerResult<String> {
    let scratch = ctx.artifacts.create_scratch(&task.id).await?;
    let urls: Vec<String> = task.request.source_urls().map(str::to_string).collect();

    logger.log_progress(&format!("Downloading {} sources", urls.len()));
    let download_start = Instant::now();
    let paths = ctx.fetcher.fetch_all(&urls, &scratch).await?;
    metrics::record_download_duration(download_start.elapsed().as_secs_f64());

    let (main, brolls): (&PathBuf, &[PathBuf]) = paths
        .split_first()
        .ok_or_else(|| WorkerError::internal("Fetcher returned no files"))?;

    let info = ctx.inspector.inspect(main).await.map_err(WorkerError::Inspect)?;
    logger.log_progress(&format!(
        "Main video {}x{} {:.3}s (audio: {})",
        info.width, info.height, info.duration, info.has_audio
    ));

    let plan = plan_composition(
        main,
        info.duration,
        info.has_audio,
        brolls,
        &task.request.broll_timings,
        ctx.config.overlap_policy,
    )?;

    for segment in plan.segments.iter().filter(|s| s.clamped) {
        logger.log_warning(&format!(
            "B-roll {} clamped from {:.3}s to {:.3}s",
            segment.index + 1,
            segment.requested_end,
            segment.end
        ));
    }
    for overlap in &plan.overlaps {
        logger.log_warning(&format!(
            "B-roll {} and {} overlap {:.3}s-{:.3}s, showing {} ({})",
            overlap.earlier + 1,
            overlap.later + 1,
            overlap.start,
            overlap.end,
            overlap.winner + 1,
            plan.policy
        ));
    }

    let rendered = scratch.join(RENDER_FILE_NAME);
    logger.log_progress("Rendering");
    let render_start = Instant::now();
    ctx.renderer
        .render(&plan, &rendered)
        .await
        .map_err(WorkerError::render)?;
    metrics::record_render_duration(render_start.elapsed().as_secs_f64());

    let output_ref = ctx.artifacts.publish(&task.id, &rendered).await?;
    Ok(output_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use broll_media::{CompositionPlan, FetchError, MediaError, MediaResult, VideoInfo};
    use broll_models::{MergeRequest, TaskStatus, TimingWindow};
    use broll_queue::InMemoryTaskStore;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeFetcher {
        fail_with: Option<fn() -> FetchError>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch_all(&self, urls: &[String], dest_dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            let mut paths = Vec::new();
            for (i, url) in urls.iter().enumerate() {
                let path = dest_dir.join(format!("source_{}.mp4", i));
                tokio::fs::write(&path, b"data").await.map_err(|e| FetchError::io(url, e))?;
                paths.push(path);
            }
            Ok(paths)
        }
    }

    struct FakeInspector(f64);

    #[async_trait]
    impl MediaInspector for FakeInspector {
        async fn inspect(&self, _path: &Path) -> MediaResult<VideoInfo> {
            Ok(VideoInfo {
                duration: self.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".to_string(),
                has_audio: true,
            })
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        delay: Option<Duration>,
        fail: bool,
        plans: Mutex<Vec<CompositionPlan>>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<()> {
            self.plans.lock().unwrap().push(plan.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with non-zero status",
                    Some("Conversion failed!".to_string()),
                    Some(1),
                ));
            }
            tokio::fs::write(output, b"composed").await?;
            Ok(())
        }
    }

    fn request() -> MergeRequest {
        MergeRequest::new(
            "https://cdn.test/main.mp4",
            (1..=6).map(|i| format!("https://cdn.test/b{}.mp4", i)).collect(),
            vec![
                TimingWindow::new(3.0, 6.0),
                TimingWindow::new(5.0, 9.0),
                TimingWindow::new(10.0, 12.0),
                TimingWindow::new(13.0, 15.0),
                TimingWindow::new(16.0, 18.0),
                TimingWindow::new(19.0, 25.0),
            ],
        )
    }

    fn context(dir: &TempDir, store: Arc<InMemoryTaskStore>, renderer: Arc<FakeRenderer>) -> ProcessingContext {
        let config = WorkerConfig {
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("out"),
            task_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let artifacts = ArtifactStore::new(&config.work_dir, &config.output_dir, "http://localhost:8000");
        ProcessingContext::new(config, store, artifacts)
            .unwrap()
            .with_fetcher(Arc::new(FakeFetcher { fail_with: None }))
            .with_inspector(Arc::new(FakeInspector(20.0)))
            .with_renderer(renderer)
    }

    #[tokio::test]
    async fn test_success_publishes_and_records() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let renderer = Arc::new(FakeRenderer::default());
        let ctx = context(&dir, store.clone(), renderer.clone());
        ctx.artifacts.ensure_dirs().await.unwrap();

        let task = store.create(request()).await.unwrap();
        process_task(&ctx, task.id).await.unwrap();

        let done = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Success);
        let output_ref = done.output_ref.unwrap();
        assert_eq!(output_ref, format!("{}_composed.mp4", task.id));
        tokio_test::assert_ok!(ctx.artifacts.resolve(&output_ref).await);
        assert!(!ctx.artifacts.scratch_dir(&task.id).exists());

        let plans = renderer.plans.lock().unwrap();
        let plan = &plans[0];
        assert_eq!(plan.output_duration, 20.0);
        assert_eq!(plan.segments.len(), 6);
        assert_eq!(plan.overlaps.len(), 1);
        // Last B-roll is clamped to the main video's end.
        assert!(plan.segments[5].clamped);
        assert_eq!(plan.segments[5].end, 20.0);
    }

    #[tokio::test]
    async fn test_download_failure_marks_failed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let ctx = context(&dir, store.clone(), Arc::new(FakeRenderer::default())).with_fetcher(Arc::new(
            FakeFetcher {
                fail_with: Some(|| FetchError::status("https://cdn.test/b3.mp4", 404)),
            },
        ));
        ctx.artifacts.ensure_dirs().await.unwrap();

        let task = store.create(request()).await.unwrap();
        tokio_test::assert_err!(process_task(&ctx, task.id).await);

        let failed = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.error.as_deref(),
            Some("Download failed: HTTP 404 from https://cdn.test/b3.mp4")
        );
        assert!(failed.output_ref.is_none());
        assert!(ctx.artifacts.list_artifacts().await.unwrap().is_empty());
        assert!(!ctx.artifacts.scratch_dir(&task.id).exists());
    }

    #[tokio::test]
    async fn test_render_failure_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let renderer = Arc::new(FakeRenderer {
            fail: true,
            ..Default::default()
        });
        let ctx = context(&dir, store.clone(), renderer);
        ctx.artifacts.ensure_dirs().await.unwrap();

        let task = store.create(request()).await.unwrap();
        let err = process_task(&ctx, task.id).await.unwrap_err();
        assert_eq!(err.kind(), "render");

        let failed = store.get(&task.id).await.unwrap().unwrap();
        assert!(failed.error.unwrap().starts_with("Render failed:"));
        assert!(ctx.artifacts.list_artifacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_marks_failed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let renderer = Arc::new(FakeRenderer {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let mut ctx = context(&dir, store.clone(), renderer);
        ctx.config.task_timeout = Duration::from_millis(200);
        ctx.artifacts.ensure_dirs().await.unwrap();

        let task = store.create(request()).await.unwrap();
        let err = process_task(&ctx, task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(1)));

        let failed = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.unwrap(), "Task timed out after 1 seconds");
        assert!(!ctx.artifacts.scratch_dir(&task.id).exists());
    }

    #[tokio::test]
    async fn test_task_already_claimed_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let renderer = Arc::new(FakeRenderer::default());
        let ctx = context(&dir, store.clone(), renderer.clone());

        let task = store.create(request()).await.unwrap();
        store.mark_failed(&task.id, "cancelled").await.unwrap();

        assert!(matches!(
            process_task(&ctx, task.id).await,
            Err(WorkerError::Store(_))
        ));
        assert!(renderer.plans.lock().unwrap().is_empty());
        let t = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(t.error.as_deref(), Some("cancelled"));
    }
}
