//! Worker pipeline tests against a mock media server.
//!
//! Downloads go through the real HTTP fetcher; inspection and rendering are
//! replaced so FFmpeg is not needed.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use broll_media::{CompositionPlan, MediaInspector, MediaResult, Renderer, VideoInfo};
use broll_models::{MergeRequest, OverlapPolicy, TaskStatus, TimingWindow};
use broll_queue::{InMemoryTaskStore, TaskStore};
use broll_storage::ArtifactStore;
use broll_worker::{process_task, ProcessingContext, WorkerConfig};

struct StubInspector {
    duration: f64,
    has_audio: bool,
}

#[async_trait]
impl MediaInspector for StubInspector {
    async fn inspect(&self, path: &Path) -> MediaResult<VideoInfo> {
        assert!(path.exists(), "main video was not downloaded");
        Ok(VideoInfo {
            duration: self.duration,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: self.has_audio,
        })
    }
}

/// Renderer that records the plan and concatenates its inputs.
#[derive(Default)]
struct RecordingRenderer {
    plan: Mutex<Option<CompositionPlan>>,
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<()> {
        let mut out = tokio::fs::read(&plan.main_source).await?;
        for segment in &plan.segments {
            out.extend(tokio::fs::read(&segment.source).await?);
        }
        tokio::fs::write(output, out).await?;
        *self.plan.lock().unwrap() = Some(plan.clone());
        Ok(())
    }
}

async fn mount_sources(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/main.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"M".to_vec()))
        .mount(server)
        .await;
    for i in 1..=6 {
        Mock::given(method("GET"))
            .and(path(format!("/b{}.mp4", i)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(i.to_string().into_bytes()))
            .mount(server)
            .await;
    }
}

fn request(base: &str, windows: [(f64, f64); 6]) -> MergeRequest {
    MergeRequest::new(
        format!("{}/main.mp4", base),
        (1..=6).map(|i| format!("{}/b{}.mp4", base, i)).collect(),
        windows.iter().map(|(s, e)| TimingWindow::new(*s, *e)).collect(),
    )
}

fn context(
    dir: &TempDir,
    store: Arc<InMemoryTaskStore>,
    renderer: Arc<RecordingRenderer>,
    policy: OverlapPolicy,
) -> ProcessingContext {
    let config = WorkerConfig {
        work_dir: dir.path().join("work"),
        output_dir: dir.path().join("out"),
        task_timeout: Duration::from_secs(10),
        overlap_policy: policy,
        ..Default::default()
    };
    let artifacts = ArtifactStore::new(&config.work_dir, &config.output_dir, "http://localhost:8000");
    ProcessingContext::new(config, store, artifacts)
        .unwrap()
        .with_inspector(Arc::new(StubInspector {
            duration: 20.0,
            has_audio: false,
        }))
        .with_renderer(renderer)
}

#[tokio::test]
async fn test_downloads_in_request_order_and_publishes() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryTaskStore::new());
    let renderer = Arc::new(RecordingRenderer::default());
    let ctx = context(&dir, store.clone(), renderer.clone(), OverlapPolicy::LastWins);
    ctx.artifacts.ensure_dirs().await.unwrap();

    let task = store
        .create(request(
            &server.uri(),
            [(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (7.0, 8.0), (9.0, 10.0), (11.0, 12.0)],
        ))
        .await
        .unwrap();
    process_task(&ctx, task.id).await.unwrap();

    let done = store.get(&task.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Success);

    let artifact = ctx.artifacts.resolve(done.output_ref.as_deref().unwrap()).await.unwrap();
    assert_eq!(tokio::fs::read(artifact).await.unwrap(), b"M123456");

    let plan = renderer.plan.lock().unwrap().clone().unwrap();
    assert!(!plan.main_has_audio);
    assert!(plan.overlaps.is_empty());
    assert_eq!(plan.spans.len(), 6);
    for (i, span) in plan.spans.iter().enumerate() {
        assert_eq!(span.index, i);
    }
}

#[tokio::test]
async fn test_overlap_policy_decides_visible_broll() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let windows = [(3.0, 6.0), (5.0, 9.0), (10.0, 11.0), (12.0, 13.0), (14.0, 15.0), (16.0, 17.0)];

    for (policy, expected) in [(OverlapPolicy::LastWins, 1), (OverlapPolicy::FirstWins, 0)] {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let ctx = context(&dir, store.clone(), renderer.clone(), policy);
        ctx.artifacts.ensure_dirs().await.unwrap();

        let task = store.create(request(&server.uri(), windows)).await.unwrap();
        process_task(&ctx, task.id).await.unwrap();

        let plan = renderer.plan.lock().unwrap().clone().unwrap();
        assert_eq!(plan.overlaps.len(), 1);
        assert_eq!(plan.overlaps[0].winner, expected);
    }
}

#[tokio::test]
async fn test_missing_source_fails_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b4.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_sources(&server).await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryTaskStore::new());
    let renderer = Arc::new(RecordingRenderer::default());
    let ctx = context(&dir, store.clone(), renderer.clone(), OverlapPolicy::LastWins);
    ctx.artifacts.ensure_dirs().await.unwrap();

    let task = store
        .create(request(
            &server.uri(),
            [(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (7.0, 8.0), (9.0, 10.0), (11.0, 12.0)],
        ))
        .await
        .unwrap();
    tokio_test::assert_err!(process_task(&ctx, task.id).await);

    let failed = store.get(&task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(
        failed.error.unwrap(),
        format!("Download failed: HTTP 404 from {}/b4.mp4", server.uri())
    );
    assert!(renderer.plan.lock().unwrap().is_none());
    assert!(ctx.artifacts.list_artifacts().await.unwrap().is_empty());
    assert!(!ctx.artifacts.scratch_dir(&task.id).exists());
}
