// Services module for HopSync Backend Core
// Business logic layer: credential vault, token lifecycle, quota ledger,
// duplicate detection, and the transfer orchestrator

pub mod crypto;
pub mod duplicate;
pub mod quota;
pub mod token;
pub mod transfer;

// Re-export commonly used services
pub use crypto::{CredentialVault, VaultError};
pub use duplicate::{find_duplicate, is_duplicate_of};
pub use quota::{QuotaService, SlotConnection};
pub use token::{is_expiring, TokenService};
pub use transfer::{TransferRequestItem, TransferService};
