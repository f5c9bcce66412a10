// Provider Upload/Download Adapters
// One adapter per remote storage provider, each implementing that
// provider's transfer protocol behind a common trait.

pub mod drive;
pub mod graph;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::{JobStatus, TransferJob};
use crate::utils::TransferError;

pub use drive::DriveAdapter;
pub use graph::GraphAdapter;

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authorization-class fault; the caller may force one refresh and
    /// retry exactly once
    #[error("Provider rejected credentials (401)")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upload session error: {0}")]
    Session(String),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl From<ProviderError> for TransferError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => TransferError::Cancelled,
            ProviderError::Unauthorized => TransferError::UpstreamUnavailable {
                status: Some(401),
                message: "provider rejected credentials".to_string(),
            },
            ProviderError::Network(e) => TransferError::UpstreamUnavailable {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            ProviderError::Status { status, body } => TransferError::UpstreamUnavailable {
                status: Some(status),
                message: body,
            },
            ProviderError::Session(msg) => TransferError::UpstreamUnavailable {
                status: None,
                message: msg,
            },
        }
    }
}

// =============================================================================
// SHARED TYPES
// =============================================================================

/// Metadata for an item on a remote provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub checksum: Option<String>,
    pub web_url: Option<String>,
}

/// A downloaded file ready for the upload leg. Exported native documents
/// come back with an adjusted name and interchange MIME type.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// Common adapter surface for both providers
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Download an item's bytes, exporting native document types to an
    /// interchange format first
    async fn download(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedFile, ProviderError>;

    /// Upload bytes into the target folder, honoring the cancellation
    /// probe at chunk boundaries
    async fn upload(
        &self,
        access_token: &str,
        file: &DownloadedFile,
        target_folder: &str,
        probe: &CancelProbe,
    ) -> Result<RemoteItem, ProviderError>;

    /// List items in a folder sharing the exact name, for duplicate
    /// detection
    async fn list_children_by_name(
        &self,
        access_token: &str,
        folder: &str,
        name: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError>;
}

// =============================================================================
// CANCELLATION PROBE
// =============================================================================

struct ProbeState {
    last_checked: Option<Instant>,
    cancelled: bool,
}

/// Cooperative cancellation check bound to a job's persisted status.
/// Re-reads the job store at most once per poll interval so chunk loops
/// do not hammer the database; cancellation is therefore best-effort with
/// respect to in-flight chunk boundaries.
pub struct CancelProbe {
    inner: Option<ProbeInner>,
}

struct ProbeInner {
    pool: DieselPool,
    job_id: Uuid,
    poll_interval: Duration,
    state: Mutex<ProbeState>,
}

impl CancelProbe {
    pub fn for_job(pool: DieselPool, job_id: Uuid) -> Self {
        let secs = crate::app_config::config().transfer.cancel_poll_interval_secs;
        Self {
            inner: Some(ProbeInner {
                pool,
                job_id,
                poll_interval: Duration::from_secs(secs),
                state: Mutex::new(ProbeState {
                    last_checked: None,
                    cancelled: false,
                }),
            }),
        }
    }

    /// A probe that never reports cancellation, for flows without a
    /// cancellable job record
    pub fn never() -> Self {
        Self { inner: None }
    }

    /// Whether the job has been cancelled. Cached between polls; once
    /// cancelled, stays cancelled.
    pub async fn is_cancelled(&self) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let mut state = inner.state.lock().await;
        if state.cancelled {
            return true;
        }
        if let Some(last) = state.last_checked {
            if last.elapsed() < inner.poll_interval {
                return false;
            }
        }
        state.last_checked = Some(Instant::now());

        let mut conn = match inner.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                // Cannot read the job store; keep transferring rather than
                // abort on a transient pool fault
                tracing::warn!("Cancellation probe pool error for job {}: {}", inner.job_id, e);
                return false;
            },
        };

        match TransferJob::fetch_status(&mut conn, inner.job_id).await {
            Ok(status) => {
                if status == JobStatus::Cancelled {
                    state.cancelled = true;
                }
                state.cancelled
            },
            Err(e) => {
                tracing::warn!("Cancellation probe query failed for job {}: {}", inner.job_id, e);
                false
            },
        }
    }

    /// Error-typed variant for use inside chunk loops
    pub async fn check(&self) -> Result<(), ProviderError> {
        if self.is_cancelled().await {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// CHUNK MATH
// =============================================================================

/// Split `[0, total)` into consecutive ranges of `chunk_size`, last range
/// shorter. The ranges exactly partition the byte span: no gaps, no
/// overlaps.
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<Range<u64>> {
    assert!(chunk_size > 0);
    let mut ranges = Vec::new();
    let mut start = 0u64;
    while start < total {
        let end = (start + chunk_size).min(total);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// `Content-Range` header value for one chunk
pub fn content_range(range: &Range<u64>, total: u64) -> String {
    format!("bytes {}-{}/{}", range.start, range.end - 1, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_partition_exactly() {
        let total = 10_485_760 * 2 + 12_345;
        let chunk = 10_485_760;
        let ranges = chunk_ranges(total, chunk);

        assert_eq!(ranges.len(), 3);
        // Every chunk except the last is exactly chunk-sized
        for r in &ranges[..ranges.len() - 1] {
            assert_eq!(r.end - r.start, chunk);
        }
        // Consecutive ranges tile [0, total) with no gap or overlap
        assert_eq!(ranges[0].start, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(ranges.last().unwrap().end, total);
    }

    #[test]
    fn test_chunk_ranges_small_file() {
        let ranges = chunk_ranges(100, 262_144);
        assert_eq!(ranges, vec![0..100]);
    }

    #[test]
    fn test_chunk_ranges_exact_multiple() {
        let ranges = chunk_ranges(524_288, 262_144);
        assert_eq!(ranges, vec![0..262_144, 262_144..524_288]);
    }

    #[test]
    fn test_chunk_ranges_empty() {
        assert!(chunk_ranges(0, 262_144).is_empty());
    }

    #[test]
    fn test_content_range_header() {
        assert_eq!(content_range(&(0..262_144), 1_000_000), "bytes 0-262143/1000000");
        assert_eq!(
            content_range(&(262_144..300_000), 300_000),
            "bytes 262144-299999/300000"
        );
    }

    #[tokio::test]
    async fn test_never_probe() {
        let probe = CancelProbe::never();
        assert!(!probe.is_cancelled().await);
        assert!(probe.check().await.is_ok());
    }
}
