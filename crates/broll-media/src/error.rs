//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Bytes per megabyte used for size limits and messages.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Errors from probing and rendering.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Errors from probing or downloading remote media.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Total file size {}MB exceeds limit of {}MB", mb(.observed_bytes), mb(.limit_bytes))]
    SizeLimit { observed_bytes: u64, limit_bytes: u64 },

    #[error("Failed writing {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    pub fn size_limit(observed_bytes: u64, limit_bytes: u64) -> Self {
        Self::SizeLimit {
            observed_bytes,
            limit_bytes,
        }
    }

    pub fn io(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            url: url.into(),
            source,
        }
    }

    /// Classify a transport error from reqwest.
    pub fn from_reqwest(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let url = url.into();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if let Some(status) = err.status() {
            Self::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            Self::Network {
                url,
                message: err.to_string(),
            }
        }
    }

    /// The URL that caused the failure, if the failure is tied to one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Status { url, .. }
            | Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::Io { url, .. } => Some(url),
            Self::SizeLimit { .. } => None,
        }
    }

    /// Short reason suitable for a client-facing message.
    pub fn reason(&self) -> String {
        match self {
            Self::InvalidUrl { reason, .. } => reason.clone(),
            Self::Status { status, .. } => format!("HTTP {}", status),
            Self::Network { message, .. } => message.clone(),
            Self::Timeout { .. } => "request timed out".to_string(),
            Self::SizeLimit { .. } => self.to_string(),
            Self::Io { source, .. } => source.to_string(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_size_limit(&self) -> bool {
        matches!(self, Self::SizeLimit { .. })
    }
}

/// Errors building a composition plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("expected {expected} B-roll sources and windows, got {sources} sources and {windows} windows")]
    SegmentCount {
        expected: usize,
        sources: usize,
        windows: usize,
    },

    #[error("B-roll window {index} is invalid ({start}..{end})")]
    InvalidWindow { index: usize, start: f64, end: f64 },

    #[error("main video duration {0} is not usable")]
    InvalidDuration(f64),
}

/// Format a byte count as megabytes with at most two decimals and no
/// trailing zeros (`891813888` -> `"850.5"`).
pub fn format_mb(bytes: u64) -> String {
    let formatted = format!("{:.2}", bytes as f64 / BYTES_PER_MB as f64);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn mb(bytes: &u64) -> String {
    format_mb(*bytes)
}
