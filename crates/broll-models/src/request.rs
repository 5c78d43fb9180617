//! Merge request definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Number of B-roll clips every merge request must carry.
pub const BROLL_COUNT: usize = 6;

/// A timestamp window (in seconds) during which a B-roll overlays the main video.
///
/// Accepted on the wire either as a `[start, end]` pair or as an
/// object `{"start": .., "end": ..}`. Always serialized as an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(from = "TimingWindowRepr")]
pub struct TimingWindow {
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds (exclusive)
    pub end: f64,
}

#[derive(Deserialize, JsonSchema)]
#[serde(untagged)]
enum TimingWindowRepr {
    Pair(f64, f64),
    Object { start: f64, end: f64 },
}

impl From<TimingWindowRepr> for TimingWindow {
    fn from(repr: TimingWindowRepr) -> Self {
        match repr {
            TimingWindowRepr::Pair(start, end) => Self { start, end },
            TimingWindowRepr::Object { start, end } => Self { start, end },
        }
    }
}

impl TimingWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the window is well formed: finite, non-negative start, `start < end`.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }
}

/// Request to overlay six B-roll clips onto a main video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeRequest {
    /// URL of the main (A-roll) video
    #[serde(alias = "main_video_ref")]
    pub main_video_url: String,

    /// URLs of the B-roll clips, in overlay index order
    #[serde(alias = "broll_refs")]
    pub broll_urls: Vec<String>,

    /// Timing window per B-roll, aligned by index with `broll_urls`
    #[serde(alias = "broll_windows", alias = "broll_timestamps")]
    pub broll_timings: Vec<TimingWindow>,
}

impl MergeRequest {
    pub fn new(
        main_video_url: impl Into<String>,
        broll_urls: Vec<String>,
        broll_timings: Vec<TimingWindow>,
    ) -> Self {
        Self {
            main_video_url: main_video_url.into(),
            broll_urls,
            broll_timings,
        }
    }

    /// All source URLs, main video first, then B-rolls in index order.
    pub fn source_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.main_video_url.as_str()).chain(self.broll_urls.iter().map(String::as_str))
    }
}

/// Parse a source reference into an absolute HTTP(S) URL.
pub fn parse_source_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL ({})", e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported URL scheme '{}'", other)),
    }
}
