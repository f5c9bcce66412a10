// Transfer Job and Item Database Models
// The durable state machine the orchestrator drives

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::{transfer_items, transfer_jobs};
use crate::utils::TransferError;

/// Job states: pending -> queued|blocked -> running -> terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    /// Terminal-pending-user-action: quota or credential denial before any
    /// item started
    Blocked,
    Running,
    Done,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Blocked => "blocked",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Blocked
                | JobStatus::Done
                | JobStatus::Partial
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "queued" => Ok(JobStatus::Queued),
            "blocked" => Ok(JobStatus::Blocked),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "partial" => Ok(JobStatus::Partial),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Item states: queued -> running -> done|failed|skipped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Running,
    Done,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Running => "running",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ItemStatus::Queued),
            "running" => Ok(ItemStatus::Running),
            "done" => Ok(ItemStatus::Done),
            "failed" => Ok(ItemStatus::Failed),
            "skipped" => Ok(ItemStatus::Skipped),
            _ => Err(format!("Invalid item status: {}", s)),
        }
    }
}

/// Derive the aggregate job status from terminal item outcomes. Skipped
/// items count as successes for rollup purposes: the bytes already exist
/// at the target.
pub fn rollup_status(done: usize, failed: usize, skipped: usize) -> JobStatus {
    let succeeded = done + skipped;
    if failed == 0 {
        JobStatus::Done
    } else if succeeded == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Partial
    }
}

/// Transfer job database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = transfer_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransferJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub target_folder: String,
    pub status: String,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub total_bytes: i64,
    pub transferred_bytes: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transfer_jobs)]
pub struct NewTransferJob {
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub target_folder: String,
    pub status: String,
    pub total_items: i32,
    pub total_bytes: i64,
}

/// Transfer item database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = transfer_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransferItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub source_item_id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub status: String,
    pub target_item_id: Option<String>,
    pub target_web_url: Option<String>,
    pub error: Option<String>,
    pub bytes_transferred: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transfer_items)]
pub struct NewTransferItem {
    pub job_id: Uuid,
    pub source_item_id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub status: String,
}

impl TransferJob {
    pub fn status_enum(&self) -> JobStatus {
        JobStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!("Invalid status '{}' on job {}: {}", self.status, self.id, e);
            JobStatus::Failed
        })
    }

    /// Progress percentage from byte counters; None when total is unknown
    pub fn progress_percent(&self) -> Option<f64> {
        if self.total_bytes > 0 {
            let pct = self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0;
            Some(pct.clamp(0.0, 100.0))
        } else {
            None
        }
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
    ) -> Result<Self, TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        transfer_jobs
            .filter(id.eq(job_id))
            .first::<TransferJob>(conn)
            .await
            .map_err(TransferError::from)
    }

    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_job: NewTransferJob,
    ) -> Result<Self, TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        diesel::insert_into(transfer_jobs)
            .values(&new_job)
            .get_result::<TransferJob>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Re-read only the status column; the cancellation probe polls this
    pub async fn fetch_status(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
    ) -> Result<JobStatus, TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        let raw: String = transfer_jobs
            .filter(id.eq(job_id))
            .select(status)
            .first(conn)
            .await
            .map_err(TransferError::from)?;
        JobStatus::from_str(&raw).map_err(TransferError::InvalidArgument)
    }

    pub async fn set_status(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        new_status: JobStatus,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        diesel::update(transfer_jobs.filter(id.eq(job_id)))
            .set(status.eq(new_status.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn mark_running(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        diesel::update(transfer_jobs.filter(id.eq(job_id)))
            .set((status.eq(JobStatus::Running.as_str()), started_at.eq(Some(Utc::now()))))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Block a job before any item starts, recording the reason
    pub async fn mark_blocked(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        reason: &str,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        diesel::update(transfer_jobs.filter(id.eq(job_id)))
            .set((status.eq(JobStatus::Blocked.as_str()), error.eq(Some(reason))))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Terminalize the job. A completion timestamp is only ever written
    /// alongside a start timestamp; if the job never recorded one (e.g.
    /// cancelled while queued) a start is synthesized so that
    /// "completed implies started" holds.
    pub async fn mark_completed(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        final_status: JobStatus,
        reason: Option<&str>,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        let now = Utc::now();
        let existing_start: Option<DateTime<Utc>> = transfer_jobs
            .filter(id.eq(job_id))
            .select(started_at)
            .first(conn)
            .await
            .map_err(TransferError::from)?;

        diesel::update(transfer_jobs.filter(id.eq(job_id)))
            .set((
                status.eq(final_status.as_str()),
                started_at.eq(Some(existing_start.unwrap_or(now))),
                completed_at.eq(Some(now)),
                error.eq(reason),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Flag a job for cancellation. Conditional on the job not already
    /// being terminal; returns whether the flag was actually set. The
    /// running pipeline observes the new status through its probe.
    pub async fn request_cancel(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
    ) -> Result<bool, TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        let terminal = [
            JobStatus::Blocked.as_str(),
            JobStatus::Done.as_str(),
            JobStatus::Partial.as_str(),
            JobStatus::Failed.as_str(),
            JobStatus::Cancelled.as_str(),
        ];
        let updated = diesel::update(
            transfer_jobs
                .filter(id.eq(job_id))
                .filter(status.ne_all(terminal)),
        )
        .set(status.eq(JobStatus::Cancelled.as_str()))
        .execute(conn)
        .await?;
        Ok(updated > 0)
    }

    /// Server-side counter bumps after an item reaches a terminal state
    pub async fn record_item_outcome(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        succeeded: bool,
        bytes: i64,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_jobs::dsl::*;

        if succeeded {
            diesel::update(transfer_jobs.filter(id.eq(job_id)))
                .set((
                    completed_items.eq(completed_items + 1),
                    transferred_bytes.eq(transferred_bytes + bytes),
                ))
                .execute(conn)
                .await?;
        } else {
            diesel::update(transfer_jobs.filter(id.eq(job_id)))
                .set(failed_items.eq(failed_items + 1))
                .execute(conn)
                .await?;
        }
        Ok(())
    }
}

impl TransferItem {
    pub async fn insert_batch(
        conn: &mut AsyncPgConnection,
        new_items: Vec<NewTransferItem>,
    ) -> Result<Vec<Self>, TransferError> {
        use crate::schema::transfer_items::dsl::*;

        diesel::insert_into(transfer_items)
            .values(&new_items)
            .get_results::<TransferItem>(conn)
            .await
            .map_err(TransferError::from)
    }

    pub async fn list_for_job(
        conn: &mut AsyncPgConnection,
        job: Uuid,
    ) -> Result<Vec<Self>, TransferError> {
        use crate::schema::transfer_items::dsl::*;

        transfer_items
            .filter(job_id.eq(job))
            .order(name.asc())
            .load::<TransferItem>(conn)
            .await
            .map_err(TransferError::from)
    }

    pub async fn mark_running(
        conn: &mut AsyncPgConnection,
        item_id: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_items::dsl::*;

        diesel::update(transfer_items.filter(id.eq(item_id)))
            .set((
                status.eq(ItemStatus::Running.as_str()),
                started_at.eq(Some(Utc::now())),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Record success with the target reference
    pub async fn mark_done(
        conn: &mut AsyncPgConnection,
        item_id: Uuid,
        remote_id: &str,
        web_url: Option<&str>,
        bytes: i64,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_items::dsl::*;

        diesel::update(transfer_items.filter(id.eq(item_id)))
            .set((
                status.eq(ItemStatus::Done.as_str()),
                target_item_id.eq(Some(remote_id)),
                target_web_url.eq(web_url),
                bytes_transferred.eq(bytes),
                completed_at.eq(Some(Utc::now())),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Record a terminal failure or skip with its message. Synthesizes a
    /// start timestamp when the item never entered running.
    pub async fn mark_terminal(
        conn: &mut AsyncPgConnection,
        item_id: Uuid,
        terminal: ItemStatus,
        message: &str,
    ) -> Result<(), TransferError> {
        use crate::schema::transfer_items::dsl::*;

        let now = Utc::now();
        let existing_start: Option<DateTime<Utc>> = transfer_items
            .filter(id.eq(item_id))
            .select(started_at)
            .first(conn)
            .await
            .map_err(TransferError::from)?;

        diesel::update(transfer_items.filter(id.eq(item_id)))
            .set((
                status.eq(terminal.as_str()),
                error.eq(Some(message)),
                started_at.eq(Some(existing_start.unwrap_or(now))),
                completed_at.eq(Some(now)),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "queued", "blocked", "running", "done", "partial", "failed", "cancelled"] {
            assert_eq!(JobStatus::from_str(s).unwrap().as_str(), s);
        }
        assert!(JobStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Blocked.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_rollup() {
        // 2 done + 1 failed -> partial
        assert_eq!(rollup_status(2, 1, 0), JobStatus::Partial);
        assert_eq!(rollup_status(3, 0, 0), JobStatus::Done);
        assert_eq!(rollup_status(0, 3, 0), JobStatus::Failed);
        // skips count toward success
        assert_eq!(rollup_status(0, 0, 2), JobStatus::Done);
        assert_eq!(rollup_status(0, 1, 1), JobStatus::Partial);
    }

    fn job_with_bytes(total: i64, transferred: i64) -> TransferJob {
        let now = Utc::now();
        TransferJob {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_account_id: Uuid::new_v4(),
            target_account_id: Uuid::new_v4(),
            target_folder: "root".to_string(),
            status: "running".to_string(),
            total_items: 1,
            completed_items: 0,
            failed_items: 0,
            total_bytes: total,
            transferred_bytes: transferred,
            error: None,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(job_with_bytes(200, 50).progress_percent(), Some(25.0));
        assert_eq!(job_with_bytes(0, 0).progress_percent(), None);
        // transfers can overshoot declared sizes (exports); clamp to 100
        assert_eq!(job_with_bytes(100, 150).progress_percent(), Some(100.0));
    }
}
