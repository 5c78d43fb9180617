//! Fixed render configuration.
//!
//! Output parameters are deliberately not request-configurable so that a
//! given request always renders the same way.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Output audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Encoding preset
pub const DEFAULT_PRESET: &str = "ultrafast";
/// Constant Rate Factor
pub const DEFAULT_CRF: u8 = 23;
/// Audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Output resolution (portrait 9:16)
pub const OUTPUT_WIDTH: u32 = 1080;
pub const OUTPUT_HEIGHT: u32 = 1920;

/// Suffix appended to the task id to form the artifact file name.
pub const OUTPUT_SUFFIX: &str = "_composed.mp4";

/// Render configuration applied to every composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderConfig {
    /// Video codec
    pub codec: String,
    /// Encoding preset
    pub preset: String,
    /// Constant Rate Factor (0-51, lower is better)
    pub crf: u8,
    /// Audio codec
    pub audio_codec: String,
    /// Audio bitrate
    pub audio_bitrate: String,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            width: OUTPUT_WIDTH,
            height: OUTPUT_HEIGHT,
        }
    }
}

impl RenderConfig {
    /// Filter fragment that scales a stream to cover the output frame and
    /// center-crops the overflow.
    pub fn cover_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = self.width,
            h = self.height
        )
    }

    /// Encoder arguments for the output file.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]
    }
}

/// Artifact file name for a task.
pub fn output_file_name(task_id: &impl std::fmt::Display) -> String {
    format!("{}{}", task_id, OUTPUT_SUFFIX)
}
