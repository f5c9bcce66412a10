// Account & Slot API Endpoints
// Slot availability checks and account connection over the quota ledger

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::{
    app::AppState,
    models::{CloudAccount, NewCloudAccount, ProviderKind},
    utils::TransferError,
};

// =============================================================================
// ACCOUNT HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckSlotRequest {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
}

/// Tokens arrive already exchanged by the authorization front end; this
/// service only stores them (encrypted) and binds the slot.
#[derive(Debug, Deserialize)]
pub struct ConnectAccountRequest {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub provider_email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ConnectAccountResponse {
    pub account_id: Uuid,
    pub slot_number: i32,
    pub is_new_slot: bool,
    pub reconnected: bool,
    pub transferred: bool,
}

fn parse_provider(raw: &str) -> Result<ProviderKind, TransferError> {
    ProviderKind::from_str(raw).map_err(TransferError::InvalidArgument)
}

/// Check whether connecting this account would be allowed
/// POST /api/v1/accounts/check-slot
pub async fn check_slot(
    State(state): State<AppState>,
    Json(request): Json<CheckSlotRequest>,
) -> impl IntoResponse {
    let provider = match parse_provider(&request.provider) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match state
        .quota_service
        .check_slot_available(request.user_id, provider, &request.provider_account_id)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "available": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Connect or reconnect a provider account, consuming a slot when new
/// POST /api/v1/accounts/connect
pub async fn connect_account(
    State(state): State<AppState>,
    Json(request): Json<ConnectAccountRequest>,
) -> impl IntoResponse {
    let provider = match parse_provider(&request.provider) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let connection = match state
        .quota_service
        .connect_or_reconnect_slot(
            request.user_id,
            provider,
            &request.provider_account_id,
            &request.provider_email,
            request.email_verified,
        )
        .await
    {
        Ok(connection) => connection,
        Err(e) => return e.into_response(),
    };

    // Store the credential set encrypted at rest
    let access_enc = match state.vault.encrypt(&request.access_token) {
        Ok(enc) => enc,
        Err(e) => return TransferError::from(e).into_response(),
    };
    let refresh_enc = match state.vault.encrypt(&request.refresh_token) {
        Ok(enc) => enc,
        Err(e) => return TransferError::from(e).into_response(),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => return TransferError::from(e).into_response(),
    };

    let account = match CloudAccount::upsert_connection(
        &mut conn,
        NewCloudAccount {
            user_id: request.user_id,
            provider: connection.slot.provider.clone(),
            provider_account_id: connection.slot.provider_account_id.clone(),
            account_email: request.provider_email.clone(),
            access_token_enc: access_enc,
            refresh_token_enc: refresh_enc,
            token_expires_at: request.token_expires_at,
        },
    )
    .await
    {
        Ok(account) => account,
        Err(e) => return e.into_response(),
    };

    info!(
        "Connected {} account {} for user {} (slot {})",
        account.provider, account.id, request.user_id, connection.slot.slot_number
    );

    (
        StatusCode::CREATED,
        Json(ConnectAccountResponse {
            account_id: account.id,
            slot_number: connection.slot.slot_number,
            is_new_slot: connection.is_new,
            reconnected: connection.reconnected,
            transferred: connection.transferred,
        }),
    )
        .into_response()
}
