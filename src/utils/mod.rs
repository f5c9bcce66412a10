// Utility modules for HopSync Backend

pub mod transfer_errors;
pub mod validation;

pub use transfer_errors::{TransferError, TransferErrorResponse};
pub use validation::{normalize_account_id, trim_optional_field};
