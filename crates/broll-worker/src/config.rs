//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use broll_media::{FetchConfig, BYTES_PER_MB};
use broll_models::OverlapPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum tasks processed at once
    pub max_concurrent_tasks: usize,
    /// Wall-clock limit for fetch + render + publish of one task
    pub task_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Parent of the per-task scratch directories
    pub work_dir: PathBuf,
    /// Directory published artifacts are served from
    pub output_dir: PathBuf,
    /// Per-request download timeout
    pub fetch_timeout: Duration,
    /// Connect timeout for downloads and probes
    pub fetch_connect_timeout: Duration,
    /// Attempts per source on transient failures
    pub fetch_max_attempts: u32,
    /// Cumulative download ceiling per task, in MB
    pub max_total_size_mb: u64,
    /// How often the reaper runs
    pub reaper_interval: Duration,
    /// How long finished tasks and their artifacts are kept
    pub retention: Duration,
    /// Tie-break for overlapping B-roll windows
    pub overlap_policy: OverlapPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            task_timeout: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/broll"),
            output_dir: PathBuf::from("./videos"),
            fetch_timeout: Duration::from_secs(300),
            fetch_connect_timeout: Duration::from_secs(30),
            fetch_max_attempts: 3,
            max_total_size_mb: 700,
            reaper_interval: Duration::from_secs(300),
            retention: Duration::from_secs(2 * 60 * 60),
            overlap_policy: OverlapPolicy::LastWins,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: env_parse("WORKER_MAX_TASKS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_tasks),
            task_timeout: Duration::from_secs(
                env_parse("WORKER_TASK_TIMEOUT").unwrap_or(defaults.task_timeout.as_secs()),
            ),
            shutdown_timeout: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(defaults.shutdown_timeout.as_secs()),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("VIDEO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            fetch_timeout: Duration::from_secs(
                env_parse("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout.as_secs()),
            ),
            fetch_connect_timeout: Duration::from_secs(
                env_parse("FETCH_CONNECT_TIMEOUT_SECS").unwrap_or(defaults.fetch_connect_timeout.as_secs()),
            ),
            fetch_max_attempts: env_parse("FETCH_MAX_ATTEMPTS").unwrap_or(defaults.fetch_max_attempts),
            max_total_size_mb: env_parse("MAX_TOTAL_SIZE_MB").unwrap_or(defaults.max_total_size_mb),
            reaper_interval: Duration::from_secs(
                env_parse("REAPER_INTERVAL_SECS").unwrap_or(defaults.reaper_interval.as_secs()),
            ),
            retention: Duration::from_secs(env_parse("RETENTION_SECS").unwrap_or(defaults.retention.as_secs())),
            overlap_policy: env_parse("BROLL_OVERLAP_POLICY").unwrap_or(defaults.overlap_policy),
        }
    }

    /// Cumulative download ceiling in bytes.
    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Fetcher settings derived from this config.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            request_timeout: self.fetch_timeout,
            connect_timeout: self.fetch_connect_timeout,
            probe_timeout: self.fetch_connect_timeout,
            max_total_bytes: self.max_total_bytes(),
            max_attempts: self.fetch_max_attempts,
            ..FetchConfig::default()
        }
    }
}
