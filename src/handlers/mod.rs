// HTTP handlers for HopSync Backend Core
// Thin routes over the service layer; all business rules live in services/

pub mod accounts;
pub mod transfers;

use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};

// Transfer job routes
pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(transfers::create_transfer))
        .route("/{id}", get(transfers::get_transfer))
        .route("/{id}/cancel", post(transfers::cancel_transfer))
}

// Account and slot ledger routes
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/check-slot", post(accounts::check_slot))
        .route("/connect", post(accounts::connect_account))
}
