pub mod cloud_account;
pub mod copy_job;
pub mod slot;
pub mod transfer;
pub mod user_plan;

// Re-export common types
pub use cloud_account::{CloudAccount, NewCloudAccount, ProviderKind};
pub use copy_job::{CopyJob, NewCopyJob};
pub use slot::{NewSlot, Slot};
pub use transfer::{
    rollup_status, ItemStatus, JobStatus, NewTransferItem, NewTransferJob, TransferItem,
    TransferJob,
};
pub use user_plan::{NewUserPlan, PlanTier, UserPlan};
