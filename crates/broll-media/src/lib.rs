#![deny(unreachable_patterns)]
//! Media pipeline for B-roll composition.
//!
//! This crate provides:
//! - Concurrent HTTP acquisition with a cumulative size budget
//! - FFprobe inspection behind the [`MediaInspector`] trait
//! - Composition planning with deterministic overlap resolution
//! - FFmpeg filter graph construction and rendering behind [`Renderer`]

pub mod command;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod render;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{format_mb, FetchError, MediaError, MediaResult, PlanError, BYTES_PER_MB};
pub use fetch::{probe_total_size, FetchConfig, HttpFetcher, MediaFetcher, UrlProbe, DEFAULT_MAX_TOTAL_BYTES};
pub use plan::{plan_composition, CompositionPlan, Overlap, OverlaySegment, VisibleSpan};
pub use probe::{probe_video, FfprobeInspector, MediaInspector, VideoInfo};
pub use progress::FfmpegProgress;
pub use render::{FfmpegRenderer, Renderer};
