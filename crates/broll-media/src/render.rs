//! Rendering a composition plan to a file.

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use broll_models::RenderConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{build_overlay_graph, AUDIO_OUT, VIDEO_OUT};
use crate::plan::CompositionPlan;

/// Capability to turn a plan into an output file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<()>;
}

/// [`Renderer`] that shells out to FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer {
    config: RenderConfig,
}

impl FfmpegRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Build the FFmpeg invocation for a plan.
    pub fn build_command(&self, plan: &CompositionPlan, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output).input(&plan.main_source);
        for segment in &plan.segments {
            cmd = cmd.input(&segment.source);
        }

        cmd.filter_complex(build_overlay_graph(plan, &self.config))
            .map(VIDEO_OUT)
            .map(AUDIO_OUT)
            .output_args(self.config.to_ffmpeg_args())
            .duration(plan.output_duration)
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<()> {
        let cmd = self.build_command(plan, output);
        let total = plan.output_duration;
        let started = Instant::now();

        FfmpegRunner::new()
            .run_with_progress(&cmd, move |progress| {
                debug!(percent = progress.percentage(total), "Render progress");
            })
            .await?;

        info!(
            output = %output.display(),
            duration_secs = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Render complete"
        );
        Ok(())
    }
}
