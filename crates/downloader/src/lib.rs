//! Download engine for WorldPop rasters.
//!
//! Fetches a resolved file set into the local cache with bounded
//! concurrency. Each file is streamed to a temporary sibling and renamed into
//! place only once complete, so an interrupted run never leaves a truncated
//! file under its real name; the next run's repair pass removes the orphans.

pub mod cache;
pub mod download;
pub mod error;
pub mod retry;

pub use cache::{purge_cache, repair_cache, PurgeReport};
pub use download::{
    DownloadConfig, DownloadManager, DownloadOutcome, DownloadPlan, DownloadProgress,
    FailedDownload, FetchReport, DEFAULT_BASE_URL,
};
pub use error::{DownloadError, DownloadResult};
pub use retry::RetryPolicy;
