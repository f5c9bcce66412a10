// Transfer Job API Endpoints
// Thin HTTP surface over the transfer orchestrator

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    app::AppState,
    models::{TransferItem, TransferJob},
    services::transfer::TransferRequestItem,
};

// =============================================================================
// TRANSFER HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub target_folder: String,
    pub items: Vec<TransferRequestItem>,
}

#[derive(Debug, Deserialize)]
pub struct JobOwnerQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TransferJobResponse {
    pub id: Uuid,
    pub status: String,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub total_bytes: i64,
    pub transferred_bytes: i64,
    pub progress_percent: Option<f64>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<TransferItemResponse>>,
}

#[derive(Debug, Serialize)]
pub struct TransferItemResponse {
    pub id: Uuid,
    pub source_item_id: String,
    pub name: String,
    pub status: String,
    pub target_item_id: Option<String>,
    pub target_web_url: Option<String>,
    pub bytes_transferred: i64,
    pub error: Option<String>,
}

impl TransferJobResponse {
    fn from_job(job: &TransferJob, items: Option<&[TransferItem]>) -> Self {
        Self {
            id: job.id,
            status: job.status.clone(),
            total_items: job.total_items,
            completed_items: job.completed_items,
            failed_items: job.failed_items,
            total_bytes: job.total_bytes,
            transferred_bytes: job.transferred_bytes,
            progress_percent: job.progress_percent(),
            error: job.error.clone(),
            items: items.map(|items| {
                items
                    .iter()
                    .map(|i| TransferItemResponse {
                        id: i.id,
                        source_item_id: i.source_item_id.clone(),
                        name: i.name.clone(),
                        status: i.status.clone(),
                        target_item_id: i.target_item_id.clone(),
                        target_web_url: i.target_web_url.clone(),
                        bytes_transferred: i.bytes_transferred,
                        error: i.error.clone(),
                    })
                    .collect()
            }),
        }
    }
}

/// Create a transfer job
/// POST /api/v1/transfers
pub async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateTransferRequest>,
) -> impl IntoResponse {
    match state
        .transfer_service
        .create_job(
            request.user_id,
            request.source_account_id,
            request.target_account_id,
            &request.target_folder,
            request.items,
        )
        .await
    {
        Ok(job) => {
            info!("Created transfer job {} for user {}", job.id, request.user_id);
            (
                StatusCode::CREATED,
                Json(TransferJobResponse::from_job(&job, None)),
            )
                .into_response()
        },
        Err(e) => e.into_response(),
    }
}

/// Fetch a job with its items and progress
/// GET /api/v1/transfers/:id
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<JobOwnerQuery>,
) -> impl IntoResponse {
    match state
        .transfer_service
        .get_job_status(job_id, query.user_id)
        .await
    {
        Ok((job, items)) => {
            Json(TransferJobResponse::from_job(&job, Some(&items))).into_response()
        },
        Err(e) => e.into_response(),
    }
}

/// Request cancellation of a running job
/// POST /api/v1/transfers/:id/cancel
pub async fn cancel_transfer(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<JobOwnerQuery>,
) -> impl IntoResponse {
    match state
        .transfer_service
        .cancel_job(job_id, request.user_id)
        .await
    {
        Ok(flagged) => Json(serde_json::json!({
            "cancelled": flagged,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
