// Transfer Orchestrator Service
// Owns the job/item state machine: gates a new job through the quota
// ledger, runs its items as a sequential pipeline in a spawned task, and
// rolls the item outcomes up into the job's terminal status.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::{
    rollup_status, CloudAccount, ItemStatus, JobStatus, NewTransferItem, NewTransferJob,
    ProviderKind, TransferItem, TransferJob,
};
use crate::providers::{
    CancelProbe, DriveAdapter, GraphAdapter, ProviderError, RemoteItem, StorageAdapter,
};
use crate::services::duplicate::find_duplicate;
use crate::services::quota::QuotaService;
use crate::services::token::TokenService;
use crate::utils::TransferError;

/// One file in a job creation request. Metadata comes from the client's
/// source-side listing; the checksum is absent for provider-native
/// document types.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequestItem {
    pub source_item_id: String,
    pub name: String,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
    pub checksum: Option<String>,
}

pub struct TransferService {
    pool: DieselPool,
    tokens: Arc<TokenService>,
    quota: Arc<QuotaService>,
    drive: DriveAdapter,
    graph: GraphAdapter,
}

impl TransferService {
    pub fn new(pool: DieselPool, tokens: Arc<TokenService>, quota: Arc<QuotaService>) -> Self {
        Self {
            pool,
            tokens,
            quota,
            drive: DriveAdapter::new(),
            graph: GraphAdapter::new(),
        }
    }

    fn adapter_for(&self, kind: ProviderKind) -> &dyn StorageAdapter {
        match kind {
            ProviderKind::Drive => &self.drive,
            ProviderKind::Graph => &self.graph,
        }
    }

    /// Load an account and verify it belongs to the requesting user and is
    /// still connected
    async fn load_account(
        &self,
        account_id: Uuid,
        user: Uuid,
    ) -> Result<CloudAccount, TransferError> {
        let mut conn = self.pool.get().await?;
        let account = CloudAccount::find_by_id(&mut conn, account_id).await?;
        if account.user_id != user {
            return Err(TransferError::NotFound);
        }
        if !account.is_active {
            return Err(TransferError::CredentialMissing);
        }
        Ok(account)
    }

    // =========================================================================
    // JOB CREATION
    // =========================================================================

    /// Create a transfer job. The job row and its items are persisted
    /// first; the quota gates then decide whether it proceeds to `queued`
    /// (and a spawned pipeline) or parks as `blocked` with the denial
    /// recorded. A blocked job never ran, so its attempt still counts for
    /// rate limiting but never consumes copy quota.
    #[instrument(skip(self, items))]
    pub async fn create_job(
        self: &Arc<Self>,
        user: Uuid,
        source_account_id: Uuid,
        target_account_id: Uuid,
        target_folder: &str,
        items: Vec<TransferRequestItem>,
    ) -> Result<TransferJob, TransferError> {
        if items.is_empty() {
            return Err(TransferError::InvalidArgument(
                "transfer requires at least one item".to_string(),
            ));
        }
        if source_account_id == target_account_id {
            return Err(TransferError::InvalidArgument(
                "source and target account must differ".to_string(),
            ));
        }

        let source = self.load_account(source_account_id, user).await?;
        let target = self.load_account(target_account_id, user).await?;
        source.provider_kind()?;
        target.provider_kind()?;

        let total_bytes: i64 = items.iter().map(|i| i.size_bytes.max(0)).sum();
        let first_name = items[0].name.clone();
        let item_count = items.len();

        let mut conn = self.pool.get().await?;
        let job = TransferJob::insert(
            &mut conn,
            NewTransferJob {
                user_id: user,
                source_account_id,
                target_account_id,
                target_folder: target_folder.to_string(),
                status: JobStatus::Pending.as_str().to_string(),
                total_items: item_count as i32,
                total_bytes,
            },
        )
        .await?;

        let rows = items
            .into_iter()
            .map(|i| NewTransferItem {
                job_id: job.id,
                source_item_id: i.source_item_id,
                name: i.name,
                mime_type: i.mime_type,
                size_bytes: i.size_bytes.max(0),
                checksum: i.checksum,
                status: ItemStatus::Queued.as_str().to_string(),
            })
            .collect::<Vec<_>>();
        TransferItem::insert_batch(&mut conn, rows).await?;
        drop(conn);

        // Quota gates. Denial parks the job as blocked before any item
        // starts; the recorded attempt still counts toward rate windows.
        let attempt = match self
            .quota
            .begin_copy_attempt(
                user,
                source_account_id,
                target_account_id,
                &job.id.to_string(),
                &format!("{} ({} items)", first_name, item_count),
            )
            .await
        {
            Ok(attempt) => attempt,
            Err(e) => {
                let mut conn = self.pool.get().await?;
                TransferJob::mark_blocked(&mut conn, job.id, &e.to_string()).await?;
                return Err(e);
            },
        };

        let mut conn = self.pool.get().await?;
        TransferJob::set_status(&mut conn, job.id, JobStatus::Queued).await?;
        drop(conn);

        info!(
            "Queued transfer job {} for user {} ({} items, {} bytes)",
            job.id, user, item_count, total_bytes
        );

        let service = Arc::clone(self);
        let job_id = job.id;
        let attempt_id = attempt.id;
        tokio::spawn(async move {
            if let Err(e) = service.run_job(job_id, attempt_id, user).await {
                error!("Transfer job {} aborted: {}", job_id, e);
                let _ = service.fail_job(job_id, attempt_id, &e.to_string()).await;
            }
        });

        let mut conn = self.pool.get().await?;
        TransferJob::find_by_id(&mut conn, job_id).await
    }

    /// Best-effort terminalization when the pipeline itself errors out
    async fn fail_job(
        &self,
        job_id: Uuid,
        attempt_id: Uuid,
        message: &str,
    ) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;
        TransferJob::mark_completed(&mut conn, job_id, JobStatus::Failed, Some(message)).await?;
        drop(conn);
        self.quota.complete_copy_failure(attempt_id, message).await
    }

    // =========================================================================
    // ITEM PIPELINE
    // =========================================================================

    #[instrument(skip(self))]
    async fn run_job(
        &self,
        job_id: Uuid,
        attempt_id: Uuid,
        user: Uuid,
    ) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;
        let job = TransferJob::find_by_id(&mut conn, job_id).await?;
        let items = TransferItem::list_for_job(&mut conn, job_id).await?;
        TransferJob::mark_running(&mut conn, job_id).await?;
        drop(conn);

        let source = self.load_account(job.source_account_id, user).await?;
        let target = self.load_account(job.target_account_id, user).await?;
        let source_kind = source.provider_kind()?;
        let target_kind = target.provider_kind()?;
        let source_adapter = self.adapter_for(source_kind);
        let target_adapter = self.adapter_for(target_kind);

        let probe = CancelProbe::for_job(self.pool.clone(), job_id);

        let mut done = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut cancelled = false;

        for item in &items {
            // Checkpoint between items; remaining items stay queued
            if probe.is_cancelled().await {
                cancelled = true;
                break;
            }

            let mut conn = self.pool.get().await?;
            TransferItem::mark_running(&mut conn, item.id).await?;
            drop(conn);

            match self
                .run_item(item, &job, source_adapter, target_adapter, &probe)
                .await
            {
                Ok(ItemOutcome::Copied { remote, bytes }) => {
                    let mut conn = self.pool.get().await?;
                    TransferItem::mark_done(
                        &mut conn,
                        item.id,
                        &remote.id,
                        remote.web_url.as_deref(),
                        bytes,
                    )
                    .await?;
                    TransferJob::record_item_outcome(&mut conn, job_id, true, bytes).await?;
                    done += 1;
                },
                Ok(ItemOutcome::Duplicate { existing }) => {
                    let mut conn = self.pool.get().await?;
                    TransferItem::mark_terminal(
                        &mut conn,
                        item.id,
                        ItemStatus::Skipped,
                        &format!("already exists in target as {}", existing.id),
                    )
                    .await?;
                    // A skip is a satisfied item, no bytes moved
                    TransferJob::record_item_outcome(&mut conn, job_id, true, 0).await?;
                    skipped += 1;
                },
                Err(TransferError::Cancelled) => {
                    let mut conn = self.pool.get().await?;
                    TransferItem::mark_terminal(
                        &mut conn,
                        item.id,
                        ItemStatus::Failed,
                        "transfer cancelled mid-item",
                    )
                    .await?;
                    TransferJob::record_item_outcome(&mut conn, job_id, false, 0).await?;
                    cancelled = true;
                    break;
                },
                Err(e) => {
                    warn!("Item {} ('{}') failed: {}", item.id, item.name, e);
                    let mut conn = self.pool.get().await?;
                    TransferItem::mark_terminal(
                        &mut conn,
                        item.id,
                        ItemStatus::Failed,
                        &e.to_string(),
                    )
                    .await?;
                    TransferJob::record_item_outcome(&mut conn, job_id, false, 0).await?;
                    failed += 1;
                },
            }
        }

        let final_status = if cancelled {
            JobStatus::Cancelled
        } else {
            rollup_status(done, failed, skipped)
        };

        let mut conn = self.pool.get().await?;
        let reason = if cancelled { Some("cancelled by user") } else { None };
        TransferJob::mark_completed(&mut conn, job_id, final_status, reason).await?;
        drop(conn);

        // Success of the attempt tracks whether any item actually landed
        if done + skipped > 0 && !matches!(final_status, JobStatus::Cancelled) {
            self.quota.complete_copy_success(attempt_id, user).await?;
        } else {
            self.quota
                .complete_copy_failure(attempt_id, final_status.as_str())
                .await?;
        }

        info!(
            "Transfer job {} finished {}: {} done, {} skipped, {} failed",
            job_id,
            final_status.as_str(),
            done,
            skipped,
            failed
        );
        Ok(())
    }

    async fn run_item(
        &self,
        item: &TransferItem,
        job: &TransferJob,
        source_adapter: &dyn StorageAdapter,
        target_adapter: &dyn StorageAdapter,
        probe: &CancelProbe,
    ) -> Result<ItemOutcome, TransferError> {
        let remote = RemoteItem {
            id: item.source_item_id.clone(),
            name: item.name.clone(),
            mime_type: item.mime_type.clone(),
            size: Some(item.size_bytes),
            checksum: item.checksum.clone(),
            web_url: None,
        };

        // Advisory duplicate check against the target folder
        let target_token = self.tokens.get_valid_token(job.target_account_id).await?;
        if let Some(existing) =
            find_duplicate(target_adapter, &target_token, &job.target_folder, &remote).await
        {
            return Ok(ItemOutcome::Duplicate { existing });
        }

        let file = self
            .with_auth_retry(job.source_account_id, |token| {
                let remote = &remote;
                async move { source_adapter.download(&token, remote).await }
            })
            .await?;
        let bytes = file.data.len() as i64;

        let uploaded = self
            .with_auth_retry(job.target_account_id, |token| {
                let file = &file;
                let folder = &job.target_folder;
                async move { target_adapter.upload(&token, file, folder, probe).await }
            })
            .await?;

        Ok(ItemOutcome::Copied {
            remote: uploaded,
            bytes,
        })
    }

    /// Attempt with the cached token; on an authorization fault force one
    /// serialized refresh and retry exactly once. A second authorization
    /// fault is final.
    async fn with_auth_retry<T, F, Fut>(
        &self,
        account_id: Uuid,
        op: F,
    ) -> Result<T, TransferError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let token = self.tokens.get_valid_token(account_id).await?;
        match op(token).await {
            Ok(value) => Ok(value),
            Err(ProviderError::Unauthorized) => {
                info!("Token rejected for account {}, forcing refresh", account_id);
                let fresh = self.tokens.force_refresh(account_id).await?;
                op(fresh).await.map_err(TransferError::from)
            },
            Err(e) => Err(TransferError::from(e)),
        }
    }

    // =========================================================================
    // STATUS & CANCELLATION
    // =========================================================================

    pub async fn get_job_status(
        &self,
        job_id: Uuid,
        user: Uuid,
    ) -> Result<(TransferJob, Vec<TransferItem>), TransferError> {
        let mut conn = self.pool.get().await?;
        let job = TransferJob::find_by_id(&mut conn, job_id).await?;
        if job.user_id != user {
            return Err(TransferError::NotFound);
        }
        let items = TransferItem::list_for_job(&mut conn, job_id).await?;
        Ok((job, items))
    }

    /// Flag a job for cancellation. The pipeline notices at its next
    /// checkpoint; items already in flight finish or abort at a chunk
    /// boundary.
    pub async fn cancel_job(&self, job_id: Uuid, user: Uuid) -> Result<bool, TransferError> {
        let mut conn = self.pool.get().await?;
        let job = TransferJob::find_by_id(&mut conn, job_id).await?;
        if job.user_id != user {
            return Err(TransferError::NotFound);
        }
        let flagged = TransferJob::request_cancel(&mut conn, job_id).await?;
        if flagged {
            info!("Cancellation requested for job {}", job_id);
        }
        Ok(flagged)
    }
}

enum ItemOutcome {
    Copied { remote: RemoteItem, bytes: i64 },
    Duplicate { existing: RemoteItem },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_partial_on_mixed_outcomes() {
        assert_eq!(rollup_status(2, 1, 0), JobStatus::Partial);
    }

    #[test]
    fn test_rollup_done_counts_skips_as_success() {
        assert_eq!(rollup_status(1, 0, 2), JobStatus::Done);
    }

    #[test]
    fn test_rollup_all_failed() {
        assert_eq!(rollup_status(0, 3, 0), JobStatus::Failed);
    }

    #[test]
    fn test_request_item_defaults_size() {
        let raw = r#"{"source_item_id":"abc","name":"a.txt","mime_type":"text/plain","checksum":null}"#;
        let item: TransferRequestItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.size_bytes, 0);
        assert!(item.checksum.is_none());
    }
}
