// Application state and configuration
use std::sync::Arc;

use crate::{
    app_config::AppConfig,
    db::DieselPool,
    services::{CredentialVault, QuotaService, TokenService, TransferService},
};

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub vault: Arc<CredentialVault>,
    pub token_service: Arc<TokenService>,
    pub quota_service: Arc<QuotaService>,
    pub transfer_service: Arc<TransferService>,
    pub max_connections: u32,
}
