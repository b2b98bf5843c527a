//! Fetching WorldPop rasters into the local cache.
//!
//! Each file streams into a `.download` sibling and is renamed into place once
//! its length matches the declared Content-Length. HTTP-layer failures are
//! retried with exponential backoff, resuming the partial file with a `Range`
//! request when the server supports it. A file set is fetched with bounded
//! concurrency.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

use worldpop_common::{FileDescriptor, WorldPopConfig, WorldPopError, WorldPopResult};

use crate::cache::repair_cache;
use crate::error::{DownloadError, DownloadResult};
use crate::retry::RetryPolicy;

/// Default WorldPop data host.
pub const DEFAULT_BASE_URL: &str = "https://data.worldpop.org";

/// Bytes between two progress log lines.
const PROGRESS_LOG_INTERVAL: u64 = 1024 * 1024;

/// Where and how rasters are fetched.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Host that remote paths are relative to
    pub base_url: String,
    /// Cache root scanned by the repair pass before each fetch
    pub cache_dir: PathBuf,
    /// Maximum number of concurrent downloads
    pub max_concurrency: usize,
    /// Backoff curve and attempt ceiling
    pub retry: RetryPolicy,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::from_worldpop(&WorldPopConfig::default())
    }
}

impl DownloadConfig {
    pub fn from_worldpop(config: &WorldPopConfig) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: config.cache_dir.clone(),
            max_concurrency: config.max_concurrency,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn url_for(&self, remote_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            remote_path.trim_start_matches('/')
        )
    }
}

/// Bytes received for one file, logged as the body streams in.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub url: String,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub retry_count: u32,
}

impl DownloadProgress {
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            total_bytes: None,
            downloaded_bytes: 0,
            started_at: now,
            last_update: now,
            retry_count: 0,
        }
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.downloaded_bytes as f64 / total as f64) * 100.0)
    }

    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = (self.last_update - self.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            self.downloaded_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file already existed and skipping was requested.
    Skipped(PathBuf),
    /// The file was transferred.
    Downloaded { path: PathBuf, bytes: u64 },
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::Skipped(path) => path,
            DownloadOutcome::Downloaded { path, .. } => path,
        }
    }
}

/// A file that could not be materialized.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub descriptor: FileDescriptor,
    pub error: String,
    pub transient: bool,
}

/// Result of a fetch that tolerates partial success.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// Local paths that exist after the fetch, lexically sorted.
    pub completed: Vec<PathBuf>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failures: Vec<FailedDownload>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dry-run view of a file set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadPlan {
    /// Entries already present in the cache.
    pub cached: Vec<FileDescriptor>,
    /// Entries that a fetch would transfer.
    pub pending: Vec<FileDescriptor>,
}

/// Downloads resolved file sets into the cache root.
pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Partition a file set into cached and pending entries without any network I/O.
    pub fn plan(&self, files: &[FileDescriptor], skip_if_exists: bool) -> DownloadPlan {
        let (cached, pending): (Vec<_>, Vec<_>) = files
            .iter()
            .cloned()
            .partition(|fd| skip_if_exists && fd.local_path.is_file());
        DownloadPlan { cached, pending }
    }

    /// Materialize every file and return the local paths, lexically sorted.
    ///
    /// Files that exhaust their retries do not stop the others; they are
    /// reported together in a `Download` error once all transfers settle.
    pub async fn fetch(
        &self,
        files: &[FileDescriptor],
        skip_if_exists: bool,
    ) -> WorldPopResult<Vec<PathBuf>> {
        let report = self.fetch_report(files, skip_if_exists).await;
        if report.is_complete() {
            return Ok(report.completed);
        }
        Err(WorldPopError::Download {
            failures: report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.descriptor.local_path.display(), f.error))
                .collect(),
        })
    }

    /// Like [`DownloadManager::fetch`] but reports partial success instead of failing.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn fetch_report(&self, files: &[FileDescriptor], skip_if_exists: bool) -> FetchReport {
        repair_cache(&self.config.cache_dir);

        let concurrency = self.config.max_concurrency.max(1);
        info!(concurrency = concurrency, skip_if_exists = skip_if_exists, "Starting fetch");

        let results: Vec<(FileDescriptor, DownloadResult<DownloadOutcome>)> =
            stream::iter(files.iter().cloned())
                .map(|fd| async move {
                    let result = self.download(&fd, skip_if_exists).await;
                    if let Err(e) = &result {
                        error!(remote = %fd.remote_path, error = %e, "Download failed");
                    }
                    (fd, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut report = FetchReport::default();
        for (fd, result) in results {
            match result {
                Ok(DownloadOutcome::Skipped(path)) => {
                    report.skipped += 1;
                    report.completed.push(path);
                }
                Ok(DownloadOutcome::Downloaded { path, .. }) => {
                    report.downloaded += 1;
                    report.completed.push(path);
                }
                Err(e) => report.failures.push(FailedDownload {
                    transient: e.is_transient(),
                    error: e.to_string(),
                    descriptor: fd,
                }),
            }
        }
        report.completed.sort();
        report.completed.dedup();
        report
            .failures
            .sort_by(|a, b| a.descriptor.local_path.cmp(&b.descriptor.local_path));

        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Fetch complete"
        );
        report
    }

    /// Download one file with automatic retry and resumption.
    ///
    /// The transfer goes to a temporary sibling that is renamed onto the
    /// final path only after its size matches the declared Content-Length.
    #[instrument(skip(self, fd), fields(remote = %fd.remote_path))]
    pub async fn download(
        &self,
        fd: &FileDescriptor,
        skip_if_exists: bool,
    ) -> DownloadResult<DownloadOutcome> {
        let final_path = fd.local_path.clone();

        if skip_if_exists && final_path.is_file() {
            debug!(path = %final_path.display(), "File already exists, skipping download");
            counter!("worldpop_cache_hits_total").increment(1);
            return Ok(DownloadOutcome::Skipped(final_path));
        }

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let temp_path = fd.temp_path();
        let url = self.config.url_for(&fd.remote_path);
        let mut progress = DownloadProgress::new(&url);
        let policy = &self.config.retry;

        info!(url = %url, path = %final_path.display(), "Starting download");

        let mut attempts = 0;
        loop {
            attempts += 1;
            let resume = attempts > 1;

            match self
                .download_with_resume(&url, &temp_path, &mut progress, resume)
                .await
            {
                Ok(()) => {
                    fs::rename(&temp_path, &final_path)
                        .await
                        .map_err(|e| DownloadError::io(&final_path, e))?;

                    counter!("worldpop_downloads_completed_total").increment(1);
                    info!(
                        path = %final_path.display(),
                        bytes = progress.downloaded_bytes,
                        attempts = attempts,
                        "Download completed"
                    );
                    return Ok(DownloadOutcome::Downloaded {
                        path: final_path,
                        bytes: progress.downloaded_bytes,
                    });
                }
                Err(e) if e.is_transient() && policy.should_retry(attempts) => {
                    let delay = policy.delay_for(attempts);
                    progress.retry_count = attempts;
                    counter!("worldpop_download_retries_total").increment(1);
                    warn!(
                        error = %e,
                        retry = attempts,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if let Err(cleanup) = fs::remove_file(&temp_path).await {
                        if cleanup.kind() != std::io::ErrorKind::NotFound {
                            warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove partial download");
                        }
                    }
                    if !e.is_transient() {
                        return Err(e);
                    }
                    return Err(DownloadError::RetriesExhausted {
                        url,
                        attempts,
                        last: Box::new(e),
                    });
                }
            }
        }
    }

    /// One transfer attempt into `temp_path`.
    ///
    /// With `resume`, an existing partial file is continued with a Range
    /// request. A server answering `200`, or `206` for a different offset
    /// than requested, restarts it from scratch.
    async fn download_with_resume(
        &self,
        url: &str,
        temp_path: &Path,
        progress: &mut DownloadProgress,
        resume: bool,
    ) -> DownloadResult<()> {
        let mut resume_from = match fs::metadata(temp_path).await {
            Ok(meta) if resume => meta.len(),
            Ok(_) => {
                fs::remove_file(temp_path)
                    .await
                    .map_err(|e| DownloadError::io(temp_path, e))?;
                0
            }
            Err(_) => 0,
        };

        // A previous attempt may already hold every byte.
        if let Some(total) = progress.total_bytes {
            if resume_from > 0 && resume_from == total {
                progress.downloaded_bytes = total;
                return Ok(());
            }
        }

        let (response, append) = loop {
            let mut request = self.client.get(url);
            if resume_from > 0 {
                info!(
                    resume_from = resume_from,
                    total = ?progress.total_bytes,
                    "Resuming download"
                );
                request = request.header(header::RANGE, format!("bytes={}-", resume_from));
            }

            let response = request.send().await?;

            match response.status() {
                StatusCode::OK => break (response, false),
                StatusCode::PARTIAL_CONTENT if resume_from > 0 => {
                    let start = content_range_start(&response);
                    if start == Some(resume_from) {
                        debug!("Received partial content, resuming download");
                        break (response, true);
                    }
                    warn!(
                        requested = resume_from,
                        received = ?start,
                        "Partial content does not continue the file, restarting download"
                    );
                    fs::remove_file(temp_path)
                        .await
                        .map_err(|e| DownloadError::io(temp_path, e))?;
                    resume_from = 0;
                }
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    // The partial file is unusable; the next attempt starts over.
                    fs::remove_file(temp_path).await.ok();
                    progress.downloaded_bytes = 0;
                    return Err(DownloadError::Status(StatusCode::RANGE_NOT_SATISFIABLE));
                }
                status => return Err(DownloadError::Status(status)),
            }
        };

        let body_length = content_length(&response).ok_or(DownloadError::MissingContentLength)?;
        let expected = if append {
            resume_from + body_length
        } else {
            body_length
        };
        progress.total_bytes = Some(expected);
        progress.downloaded_bytes = if append { resume_from } else { 0 };

        self.stream_to_file(response, temp_path, progress, append)
            .await?;

        let actual = fs::metadata(temp_path)
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?
            .len();
        if actual != expected {
            return Err(DownloadError::SizeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Append the response body to `file`, updating `progress`.
    async fn stream_to_file(
        &self,
        response: Response,
        path: &Path,
        progress: &mut DownloadProgress,
        append: bool,
    ) -> DownloadResult<()> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = options
            .open(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        let mut stream = response.bytes_stream();
        let mut bytes_since_update = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;

            let len = chunk.len() as u64;
            progress.downloaded_bytes += len;
            progress.last_update = Utc::now();
            bytes_since_update += len;
            counter!("worldpop_download_bytes_total").increment(len);

            if bytes_since_update >= PROGRESS_LOG_INTERVAL {
                bytes_since_update = 0;
                if let Some(percent) = progress.percent_complete() {
                    debug!(
                        downloaded = progress.downloaded_bytes,
                        total = ?progress.total_bytes,
                        percent = format!("{:.1}%", percent),
                        speed = format!("{:.1} KB/s", progress.bytes_per_second() / 1024.0),
                        "Download progress"
                    );
                }
            }
        }

        // Flush and sync
        file.flush().await.map_err(|e| DownloadError::io(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        Ok(())
    }
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn content_range_start(response: &Response) -> Option<u64> {
    let value = response.headers().get(header::CONTENT_RANGE)?.to_str().ok()?;
    parse_range_start(value)
}

/// First byte position of a `bytes <start>-<end>/<total>` range.
fn parse_range_start(value: &str) -> Option<u64> {
    let (start, _) = value.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}
