// Copy Job Database Model
// Single-item legacy copy attempts. Every attempt is recorded regardless of
// outcome; the rate limiter counts all of them so retry storms cannot
// sidestep the window.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::copy_jobs;
use crate::utils::TransferError;

pub const COPY_STATUS_PENDING: &str = "pending";
pub const COPY_STATUS_SUCCESS: &str = "success";
pub const COPY_STATUS_FAILED: &str = "failed";

/// Copy job database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = copy_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CopyJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub source_item_id: String,
    pub item_name: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = copy_jobs)]
pub struct NewCopyJob {
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub source_item_id: String,
    pub item_name: String,
    pub status: String,
}

impl CopyJob {
    /// Record a new pending attempt
    pub async fn insert_pending(
        conn: &mut AsyncPgConnection,
        new_job: NewCopyJob,
    ) -> Result<Self, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        diesel::insert_into(copy_jobs)
            .values(&new_job)
            .get_result::<CopyJob>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Count attempts (any status) for a user inside a trailing window
    pub async fn count_attempts_since(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        window: Duration,
    ) -> Result<i64, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        let cutoff = Utc::now() - window;
        copy_jobs
            .filter(user_id.eq(user))
            .filter(created_at.gt(cutoff))
            .count()
            .get_result(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Oldest attempt timestamp inside a trailing window, for retry hints
    pub async fn oldest_attempt_since(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        let cutoff = Utc::now() - window;
        copy_jobs
            .filter(user_id.eq(user))
            .filter(created_at.gt(cutoff))
            .select(diesel::dsl::min(created_at))
            .first(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Newest attempt timestamp inside a trailing window. The short
    /// every-attempt window keys its retry hint off the latest attempt,
    /// since each rejected retry restarts that window.
    pub async fn newest_attempt_since(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        let cutoff = Utc::now() - window;
        copy_jobs
            .filter(user_id.eq(user))
            .filter(created_at.gt(cutoff))
            .select(diesel::dsl::max(created_at))
            .first(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Conditional pending -> success transition. Returns the number of
    /// rows affected: 0 means the job was already finalized elsewhere and
    /// the caller must not touch the usage counter.
    pub async fn finalize_success_if_pending(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
    ) -> Result<usize, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        diesel::update(
            copy_jobs
                .filter(id.eq(job_id))
                .filter(status.eq(COPY_STATUS_PENDING)),
        )
        .set((
            status.eq(COPY_STATUS_SUCCESS),
            completed_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
        .await
        .map_err(TransferError::from)
    }

    /// Conditional pending -> failed transition with the error message
    pub async fn finalize_failure_if_pending(
        conn: &mut AsyncPgConnection,
        job_id: Uuid,
        message: &str,
    ) -> Result<usize, TransferError> {
        use crate::schema::copy_jobs::dsl::*;

        diesel::update(
            copy_jobs
                .filter(id.eq(job_id))
                .filter(status.eq(COPY_STATUS_PENDING)),
        )
        .set((
            status.eq(COPY_STATUS_FAILED),
            error.eq(Some(message)),
            completed_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
        .await
        .map_err(TransferError::from)
    }
}
