// Quota & Slot Ledger Service
// Enforces the entitlement invariant: a slot is consumed exactly once per
// (user, provider, account) key, reconnection is always free, and copy
// counters only move through conditional updates and server-side
// increments.

use chrono::{Duration, Utc};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::{
    copy_job, CopyJob, NewCopyJob, NewSlot, ProviderKind, Slot, UserPlan,
};
use crate::utils::{normalize_account_id, TransferError};

/// Trailing window in which a second copy attempt is rejected
pub const RATE_WINDOW_SHORT_SECS: i64 = 10;
/// Trailing window limited to this many attempts
pub const RATE_WINDOW_LONG_SECS: i64 = 60;
pub const RATE_WINDOW_LONG_LIMIT: i64 = 5;

/// Result of connecting or reconnecting an account slot
#[derive(Debug, Clone)]
pub struct SlotConnection {
    pub slot: Slot,
    pub is_new: bool,
    pub reconnected: bool,
    /// Set when a verified email match reclaimed the slot from another user
    pub transferred: bool,
}

pub struct QuotaService {
    pool: DieselPool,
}

impl QuotaService {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // SLOTS
    // =========================================================================

    /// Check whether connecting this provider account is allowed.
    /// Reconnection of an already-slotted account is allowed
    /// unconditionally, even over the limit; only a genuinely new slot is
    /// quota-gated.
    #[instrument(skip(self))]
    pub async fn check_slot_available(
        &self,
        user: Uuid,
        provider: ProviderKind,
        provider_account_id: &str,
    ) -> Result<(), TransferError> {
        let normalized = normalize_account_id(provider_account_id)?;
        let mut conn = self.pool.get().await?;

        let existing = Slot::find_by_key(&mut conn, user, provider.as_str(), &normalized).await?;
        if existing.is_some() {
            return Ok(());
        }

        let plan = UserPlan::find_by_user(&mut conn, user).await?;
        if plan.slots_used >= plan.slots_total {
            return Err(TransferError::QuotaExceeded {
                allowed: plan.slots_total,
                used: plan.slots_used,
            });
        }
        Ok(())
    }

    /// Connect a provider account, reusing its slot when one exists.
    /// Creating a new slot assigns the next per-user slot number, inserts
    /// the row, and bumps `slots_used` by exactly one, atomically.
    #[instrument(skip(self, provider_email))]
    pub async fn connect_or_reconnect_slot(
        &self,
        user: Uuid,
        provider: ProviderKind,
        provider_account_id: &str,
        provider_email: &str,
        email_verified: bool,
    ) -> Result<SlotConnection, TransferError> {
        let normalized = normalize_account_id(provider_account_id)?;
        let mut conn = self.pool.get().await?;

        if let Some(slot) = Slot::find_by_key(&mut conn, user, provider.as_str(), &normalized).await? {
            Slot::reactivate(&mut conn, slot.id).await?;
            info!(
                "Reconnected slot {} for user {} ({}:{})",
                slot.slot_number,
                user,
                provider.as_str(),
                normalized
            );
            return Ok(SlotConnection {
                slot: Slot {
                    is_active: true,
                    disconnected_at: None,
                    ..slot
                },
                is_new: false,
                reconnected: true,
                transferred: false,
            });
        }

        // Ownership reclaim: a verified email match lets a user take over a
        // slot another user id holds for the same remote account
        if email_verified {
            if let Some(slot) =
                Slot::find_by_provider_account(&mut conn, provider.as_str(), &normalized).await?
            {
                if slot.user_id != user && slot.provider_email == provider_email {
                    info!(
                        "Transferring slot {} from user {} to user {} on verified email match",
                        slot.id, slot.user_id, user
                    );
                    Slot::transfer_to_user(&mut conn, slot.id, slot.user_id, user).await?;
                    return Ok(SlotConnection {
                        slot: Slot {
                            user_id: user,
                            transferred_from: Some(slot.user_id),
                            is_active: true,
                            disconnected_at: None,
                            ..slot
                        },
                        is_new: false,
                        reconnected: true,
                        transferred: true,
                    });
                }
            }
        }

        let plan = UserPlan::find_by_user(&mut conn, user).await?;
        if plan.slots_used >= plan.slots_total {
            return Err(TransferError::QuotaExceeded {
                allowed: plan.slots_total,
                used: plan.slots_used,
            });
        }

        let provider_name = provider.as_str().to_string();
        let email = provider_email.to_string();
        let slot_total = plan.slots_total;
        let slot = conn
            .transaction::<Slot, TransferError, _>(|conn| {
                async move {
                    let number = Slot::next_slot_number(conn, user).await?;
                    let slot = Slot::insert(
                        conn,
                        NewSlot {
                            user_id: user,
                            provider: provider_name,
                            provider_account_id: normalized,
                            provider_email: email,
                            slot_number: number,
                            expires_at: None,
                        },
                    )
                    .await?;
                    // Conditional update is the authoritative gate: if a
                    // concurrent connect took the last slot after the check
                    // above, zero rows update and the insert rolls back
                    let consumed = UserPlan::consume_slot_if_available(conn, user).await?;
                    if consumed == 0 {
                        return Err(TransferError::QuotaExceeded {
                            allowed: slot_total,
                            used: slot_total,
                        });
                    }
                    Ok(slot)
                }
                .scope_boxed()
            })
            .await?;

        info!(
            "Consumed slot {} for user {} ({} of {})",
            slot.slot_number,
            user,
            plan.slots_used + 1,
            plan.slots_total
        );

        Ok(SlotConnection {
            slot,
            is_new: true,
            reconnected: false,
            transferred: false,
        })
    }

    // =========================================================================
    // RATE LIMITING
    // =========================================================================

    /// Reject when another attempt exists inside the 10-second window or
    /// five exist inside the 60-second window. Attempts count regardless
    /// of outcome, so failing fast does not buy extra attempts.
    #[instrument(skip(self))]
    pub async fn check_rate_limit(&self, user: Uuid) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;

        let short = Duration::seconds(RATE_WINDOW_SHORT_SECS);
        let recent = CopyJob::count_attempts_since(&mut conn, user, short).await?;
        if recent >= 1 {
            // Every attempt counts, so the window restarts at the newest
            // attempt; hinting off an older one would send the client into
            // another rejection
            let retry_after = match CopyJob::newest_attempt_since(&mut conn, user, short).await? {
                Some(newest) => {
                    let elapsed = (Utc::now() - newest).num_seconds().max(0);
                    (RATE_WINDOW_SHORT_SECS - elapsed).max(1) as u64
                },
                None => RATE_WINDOW_SHORT_SECS as u64,
            };
            return Err(TransferError::RateLimited { retry_after });
        }

        let long = Duration::seconds(RATE_WINDOW_LONG_SECS);
        let windowed = CopyJob::count_attempts_since(&mut conn, user, long).await?;
        if windowed >= RATE_WINDOW_LONG_LIMIT {
            let retry_after = match CopyJob::oldest_attempt_since(&mut conn, user, long).await? {
                Some(oldest) => {
                    let elapsed = (Utc::now() - oldest).num_seconds().max(0);
                    (RATE_WINDOW_LONG_SECS - elapsed).max(1) as u64
                },
                None => RATE_WINDOW_LONG_SECS as u64,
            };
            return Err(TransferError::RateLimited { retry_after });
        }

        Ok(())
    }

    // =========================================================================
    // COPY COUNTERS
    // =========================================================================

    /// Check the plan's copy allowance, rolling the billing period first
    /// when the stored period start is from an earlier month
    #[instrument(skip(self))]
    pub async fn check_copy_quota(&self, user: Uuid) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;
        let mut plan = UserPlan::find_by_user(&mut conn, user).await?;

        let now = Utc::now();
        if plan.needs_period_rollover(now) {
            info!("Rolling billing period for user {}", user);
            UserPlan::rollover_period(&mut conn, user, now).await?;
            plan = UserPlan::find_by_user(&mut conn, user).await?;
        }

        if let Some((limit, used)) = plan.copy_limit_and_used() {
            if used >= limit {
                return Err(TransferError::QuotaExceeded {
                    allowed: limit,
                    used,
                });
            }
        }
        Ok(())
    }

    /// Record a new pending copy attempt. Runs the rate and quota gates
    /// first; no row is created when either rejects.
    pub async fn begin_copy_attempt(
        &self,
        user: Uuid,
        source_account_id: Uuid,
        target_account_id: Uuid,
        source_item_id: &str,
        item_name: &str,
    ) -> Result<CopyJob, TransferError> {
        self.check_rate_limit(user).await?;
        self.check_copy_quota(user).await?;

        let mut conn = self.pool.get().await?;
        CopyJob::insert_pending(
            &mut conn,
            NewCopyJob {
                user_id: user,
                source_account_id,
                target_account_id,
                source_item_id: source_item_id.to_string(),
                item_name: item_name.to_string(),
                status: copy_job::COPY_STATUS_PENDING.to_string(),
            },
        )
        .await
    }

    /// Finalize a copy as successful. Idempotent: only the call that
    /// actually transitions the row from pending increments the usage
    /// counter; duplicate or concurrent calls are no-ops.
    #[instrument(skip(self))]
    pub async fn complete_copy_success(
        &self,
        job_id: Uuid,
        user: Uuid,
    ) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;

        let transitioned = CopyJob::finalize_success_if_pending(&mut conn, job_id).await?;
        if transitioned == 0 {
            warn!("Copy job {} already finalized; skipping counter bump", job_id);
            return Ok(());
        }

        UserPlan::increment_copies_used(&mut conn, user).await
    }

    /// Finalize a copy as failed; the attempt stays counted for rate
    /// limiting but never touches the usage counter
    pub async fn complete_copy_failure(
        &self,
        job_id: Uuid,
        message: &str,
    ) -> Result<(), TransferError> {
        let mut conn = self.pool.get().await?;
        CopyJob::finalize_failure_if_pending(&mut conn, job_id, message).await?;
        Ok(())
    }
}
