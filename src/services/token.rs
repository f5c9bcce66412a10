// Token Lifecycle Service
// Keeps per-account bearer tokens valid: proactive refresh before expiry,
// rotation-aware persistence, deactivate-on-failure. Refreshes for the
// same account are serialized so concurrent callers cannot persist
// conflicting token pairs.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::{CloudAccount, ProviderKind};
use crate::services::crypto::CredentialVault;
use crate::utils::TransferError;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshErrorBody {
    error: Option<String>,
}

/// Decide whether a token needs refreshing: expiring when `now + buffer`
/// reaches the stored expiry, or when no expiry was recorded at all
/// (refresh-first policy).
pub fn is_expiring(
    expires_at: Option<DateTime<Utc>>,
    buffer_secs: i64,
    now: DateTime<Utc>,
) -> bool {
    match expires_at {
        Some(expiry) => now + Duration::seconds(buffer_secs) >= expiry,
        None => true,
    }
}

const REFRESH_LOCK_SWEEP_THRESHOLD: usize = 1024;

/// Drop per-account locks with no outstanding clone; a strong count above
/// one means some task is mid-refresh and the entry must survive
fn sweep_idle_locks(locks: &mut HashMap<Uuid, Arc<Mutex<()>>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}

pub struct TokenService {
    pool: DieselPool,
    vault: Arc<CredentialVault>,
    http_client: reqwest::Client,
    // One async lock per account id; refresh steps must be sequential and
    // exclusive per account
    refresh_locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TokenService {
    pub fn new(pool: DieselPool, vault: Arc<CredentialVault>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("HopSync-Token-Client/1.0")
            .build()
            .unwrap_or_default();

        Self {
            pool,
            vault,
            http_client,
            refresh_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Bound the map: sweep locks nobody currently holds once it grows
        // past the working set of active accounts
        if locks.len() > REFRESH_LOCK_SWEEP_THRESHOLD {
            sweep_idle_locks(&mut locks);
        }
        locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return a currently-valid access token for the account, refreshing
    /// proactively when the stored one is inside the expiry buffer.
    pub async fn get_valid_token(&self, account_id: Uuid) -> Result<String, TransferError> {
        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;

        // Reload inside the lock; a concurrent caller may have refreshed
        // while we waited
        let mut conn = self.pool.get().await?;
        let account = CloudAccount::find_by_id(&mut conn, account_id).await?;
        drop(conn);

        let provider = account.provider_kind()?;

        let access_token = self.vault.decrypt(&account.access_token_enc);
        if access_token.is_empty() {
            // Surfaced as "needs reconnect", never retried automatically
            return Err(TransferError::CredentialMissing);
        }

        if !is_expiring(
            account.token_expires_at,
            provider.expiry_buffer_secs(),
            Utc::now(),
        ) {
            return Ok(access_token);
        }

        self.refresh_locked(&account, provider).await
    }

    /// Unconditional refresh, used after an authorization-class fault from
    /// a provider despite a seemingly valid token
    pub async fn force_refresh(&self, account_id: Uuid) -> Result<String, TransferError> {
        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;

        let mut conn = self.pool.get().await?;
        let account = CloudAccount::find_by_id(&mut conn, account_id).await?;
        drop(conn);

        let provider = account.provider_kind()?;
        self.refresh_locked(&account, provider).await
    }

    /// Refresh the account's tokens. Caller must hold the per-account lock.
    async fn refresh_locked(
        &self,
        account: &CloudAccount,
        provider: ProviderKind,
    ) -> Result<String, TransferError> {
        let refresh_token = self.vault.decrypt(&account.refresh_token_enc);
        if refresh_token.is_empty() {
            warn!(
                "Account {} has no refresh token; flagging for reconnect",
                account.id
            );
            let mut conn = self.pool.get().await?;
            CloudAccount::deactivate(&mut conn, account.id).await?;
            return Err(TransferError::CredentialMissing);
        }

        let providers = &crate::app_config::config().providers;
        let (token_url, client_id, client_secret) = match provider {
            ProviderKind::Drive => (
                providers.drive_token_url.as_str(),
                providers.drive_client_id.as_str(),
                providers.drive_client_secret.as_str(),
            ),
            ProviderKind::Graph => (
                providers.graph_token_url.as_str(),
                providers.graph_client_id.as_str(),
                providers.graph_client_secret.as_str(),
            ),
        };

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| TransferError::UpstreamUnavailable {
                status: None,
                message: format!("token endpoint unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let code = response
                .json::<RefreshErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("http_{}", status.as_u16()));

            warn!(
                "Refresh rejected for account {} ({}): {}",
                account.id,
                provider.as_str(),
                code
            );
            let mut conn = self.pool.get().await?;
            CloudAccount::deactivate(&mut conn, account.id).await?;
            return Err(TransferError::RefreshFailed { code });
        }

        let body: RefreshResponse =
            response
                .json()
                .await
                .map_err(|e| TransferError::UpstreamUnavailable {
                    status: None,
                    message: format!("token endpoint returned malformed body: {}", e),
                })?;

        let new_expiry = Utc::now() + Duration::seconds(body.expires_in);
        let access_enc = self
            .vault
            .encrypt(&body.access_token)
            .map_err(TransferError::from)?;

        // Persist the refresh token only when the provider rotated it.
        // Re-encrypting the same value, or overwriting a rotated one with
        // the stale copy we sent, loses the working credential.
        let rotated_enc = match body.refresh_token.as_deref() {
            Some(new_rt) if new_rt != refresh_token => Some(
                self.vault
                    .encrypt(new_rt)
                    .map_err(TransferError::from)?,
            ),
            _ => None,
        };

        let mut conn = self.pool.get().await?;
        CloudAccount::persist_refreshed_tokens(
            &mut conn,
            account.id,
            &access_enc,
            new_expiry,
            rotated_enc.as_deref(),
        )
        .await?;

        info!(
            "Refreshed {} token for account {} (rotated refresh token: {})",
            provider.as_str(),
            account.id,
            rotated_enc.is_some()
        );

        Ok(body.access_token)
    }
}
