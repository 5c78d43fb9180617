//! Remote media acquisition over HTTP.
//!
//! Two capabilities live here:
//! - [`UrlProbe`]: cheap size/reachability checks used at intake
//!   (HEAD, falling back to a two-byte ranged GET when HEAD is refused).
//! - [`MediaFetcher`]: concurrent streaming downloads into a task's
//!   scratch directory under a shared cumulative byte budget.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use broll_models::request::parse_source_url;

use crate::error::{FetchError, BYTES_PER_MB};

/// Default cumulative download ceiling (700 MB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 700 * BYTES_PER_MB;

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout for a single download attempt
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Timeout for HEAD/range probes
    pub probe_timeout: Duration,
    /// Cumulative byte ceiling across all sources of one task
    pub max_total_bytes: u64,
    /// Attempts per source, including the first
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub retry_base_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(30),
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Capability to check a remote source without downloading it.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Reported size in bytes, `None` when the server does not say.
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError>;
}

/// Capability to download all sources of a task.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `urls` concurrently into `dest_dir`, returning local paths
    /// in the same order. On failure nothing is left in `dest_dir`.
    async fn fetch_all(&self, urls: &[String], dest_dir: &Path) -> Result<Vec<PathBuf>, FetchError>;
}

/// Probe every URL concurrently and enforce the cumulative size ceiling.
///
/// Unknown sizes count as zero. Returns the summed reported size.
pub async fn probe_total_size(
    probe: &dyn UrlProbe,
    urls: &[String],
    max_total_bytes: u64,
) -> Result<u64, FetchError> {
    let sizes = try_join_all(urls.iter().map(|url| probe.probe_size(url))).await?;
    let total: u64 = sizes.into_iter().map(|s| s.unwrap_or(0)).sum();

    if total > max_total_bytes {
        return Err(FetchError::size_limit(total, max_total_bytes));
    }
    Ok(total)
}

/// HTTP implementation of [`UrlProbe`] and [`MediaFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("broll-merge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn download_with_retry(&self, url: &str, dest: &Path, total: &AtomicU64) -> Result<u64, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.download_once(url, dest, total).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_once(&self, url: &str, dest: &Path, total: &AtomicU64) -> Result<u64, FetchError> {
        let limit = self.config.max_total_bytes;

        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }

        if let Some(declared) = header_u64(response.headers(), CONTENT_LENGTH.as_str()) {
            let projected = total.load(Ordering::SeqCst) + declared;
            if projected > limit {
                return Err(FetchError::size_limit(projected, limit));
            }
        }

        let mut file = File::create(dest).await.map_err(|e| FetchError::io(url, e))?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        let result: Result<(), FetchError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, &e))?;
                let len = chunk.len() as u64;
                received += len;

                let running = total.fetch_add(len, Ordering::SeqCst) + len;
                if running > limit {
                    return Err(FetchError::size_limit(running, limit));
                }

                file.write_all(&chunk).await.map_err(|e| FetchError::io(url, e))?;
            }
            file.flush().await.map_err(|e| FetchError::io(url, e))
        }
        .await;

        if let Err(e) = result {
            // Give back this attempt's bytes so a retry starts from a clean budget.
            total.fetch_sub(received, Ordering::SeqCst);
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e);
        }

        debug!(url = %url, bytes = received, "Download complete");
        Ok(received)
    }
}

#[async_trait]
impl UrlProbe for HttpFetcher {
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError> {
        parse_source_url(url).map_err(|reason| FetchError::invalid_url(url, reason))?;

        let response = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(header_u64(response.headers(), CONTENT_LENGTH.as_str()));
        }

        if status != StatusCode::FORBIDDEN && status != StatusCode::METHOD_NOT_ALLOWED {
            return Err(FetchError::status(url, status.as_u16()));
        }

        // Some hosts refuse HEAD but serve ranges. If that fails too the size
        // is left unknown and the download budget enforces the ceiling.
        debug!(url = %url, status = status.as_u16(), "HEAD refused, probing with ranged GET");
        let response = match self
            .client
            .get(url)
            .header(RANGE, "bytes=0-1")
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(
                    url = %url,
                    status = response.status().as_u16(),
                    "Could not check file size, skipping validation"
                );
                return Ok(None);
            }
            Err(e) => {
                warn!(url = %url, "Could not check file size, skipping validation: {}", e);
                return Ok(None);
            }
        };

        let status = response.status();

        let size = if status == StatusCode::PARTIAL_CONTENT {
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total)
        } else {
            header_u64(response.headers(), CONTENT_LENGTH.as_str())
        };
        Ok(size)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch_all(&self, urls: &[String], dest_dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| FetchError::io(dest_dir.display().to_string(), e))?;

        let total = AtomicU64::new(0);
        let targets: Vec<PathBuf> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| dest_dir.join(local_file_name(i, url)))
            .collect();

        let downloads = urls
            .iter()
            .zip(&targets)
            .map(|(url, dest)| self.download_with_retry(url, dest, &total));

        match try_join_all(downloads).await {
            Ok(_) => {
                info!(
                    sources = urls.len(),
                    total_bytes = total.load(Ordering::SeqCst),
                    "All sources downloaded"
                );
                Ok(targets)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(dest_dir).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(dir = %dest_dir.display(), "Failed to clean scratch after fetch error: {}", cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}

/// Local file name for source `index`, keeping the URL's extension when
/// it looks like one.
fn local_file_name(index: usize, url: &str) -> String {
    let ext = parse_source_url(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
        })
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "mp4".to_string());
    format!("source_{}.{}", index, ext)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Total size from a `Content-Range: bytes 0-1/12345` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> FetchConfig {
        FetchConfig {
            retry_base_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes 0-1/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name(0, "https://cdn.test/a/main.MOV?sig=1"), "source_0.mov");
        assert_eq!(local_file_name(3, "https://cdn.test/blob"), "source_3.mp4");
        assert_eq!(local_file_name(1, "not a url"), "source_1.mp4");
    }

    #[tokio::test]
    async fn test_fetch_all_downloads_in_order() {
        let server = MockServer::start().await;
        let mut urls = Vec::new();
        for i in 0..7u8 {
            let route = format!("/v{}.mp4", i);
            serve(&server, &route, vec![i; 128]).await;
            urls.push(format!("{}{}", server.uri(), route));
        }

        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("task");
        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let paths = fetcher.fetch_all(&urls, &scratch).await.unwrap();

        assert_eq!(paths.len(), 7);
        for (i, p) in paths.iter().enumerate() {
            let bytes = tokio::fs::read(p).await.unwrap();
            assert_eq!(bytes, vec![i as u8; 128]);
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried_and_cleans_scratch() {
        let server = MockServer::start().await;
        serve(&server, "/ok.mp4", vec![1; 64]).await;
        Mock::given(method("GET"))
            .and(path("/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let urls = vec![
            format!("{}/ok.mp4", server.uri()),
            format!("{}/missing.mp4", server.uri()),
        ];
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("task");
        let err = HttpFetcher::new(fast_config())
            .unwrap()
            .fetch_all(&urls, &scratch)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(err.url(), Some(urls[1].as_str()));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.mp4"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        serve(&server, "/flaky.mp4", vec![9; 32]).await;

        let dir = TempDir::new().unwrap();
        let urls = vec![format!("{}/flaky.mp4", server.uri())];
        let paths = HttpFetcher::new(fast_config())
            .unwrap()
            .fetch_all(&urls, dir.path())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_cumulative_limit_aborts_and_cleans() {
        let server = MockServer::start().await;
        for i in 0..3 {
            serve(&server, &format!("/part{}.mp4", i), vec![0; 600]).await;
        }
        let urls: Vec<String> = (0..3).map(|i| format!("{}/part{}.mp4", server.uri(), i)).collect();

        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("task");
        let config = FetchConfig {
            max_total_bytes: 1000,
            ..fast_config()
        };
        let err = HttpFetcher::new(config)
            .unwrap()
            .fetch_all(&urls, &scratch)
            .await
            .unwrap_err();

        assert!(err.is_size_limit());
        assert!(err.to_string().starts_with("Total file size"));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_probe_head_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0; 5000]))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let size = fetcher.probe_size(&format!("{}/v.mp4", server.uri())).await.unwrap();
        assert_eq!(size, Some(5000));
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_range_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/signed.mp4"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/signed.mp4"))
            .and(header("range", "bytes=0-1"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-1/734003200")
                    .set_body_bytes(vec![0, 0]),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let size = fetcher
            .probe_size(&format!("{}/signed.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(size, Some(734_003_200));
    }

    #[tokio::test]
    async fn test_probe_unknown_size_when_range_get_refused() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/locked.mp4"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locked.mp4"))
            .and(header("range", "bytes=0-1"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let size = fetcher
            .probe_size(&format!("{}/locked.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(size, None);
    }

    #[tokio::test]
    async fn test_probe_rejects_missing_and_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let err = fetcher
            .probe_size(&format!("{}/gone.mp4", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "HTTP 404");

        let err = fetcher.probe_size("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_probe_total_size_limit() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0; 400]))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_config()).unwrap();
        let urls: Vec<String> = (0..3).map(|i| format!("{}/{}.mp4", server.uri(), i)).collect();

        assert_eq!(probe_total_size(&fetcher, &urls, 1200).await.unwrap(), 1200);
        let err = probe_total_size(&fetcher, &urls, 1000).await.unwrap_err();
        assert!(err.is_size_limit());
    }
}
