// Transfer job and item state machine tests
// Rollup derivation, terminal classification, and progress reporting

use chrono::Utc;
use hopsync_backend_core::models::{rollup_status, ItemStatus, JobStatus, TransferJob};
use std::str::FromStr;
use uuid::Uuid;

fn job_with_bytes(total: i64, transferred: i64) -> TransferJob {
    TransferJob {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        source_account_id: Uuid::new_v4(),
        target_account_id: Uuid::new_v4(),
        target_folder: "root".to_string(),
        status: JobStatus::Running.as_str().to_string(),
        total_items: 1,
        completed_items: 0,
        failed_items: 0,
        total_bytes: total,
        transferred_bytes: transferred,
        error: None,
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    }
}

#[test]
fn test_rollup_all_done() {
    assert_eq!(rollup_status(3, 0, 0), JobStatus::Done);
}

#[test]
fn test_rollup_mixed_is_partial() {
    assert_eq!(rollup_status(2, 1, 0), JobStatus::Partial);
}

#[test]
fn test_rollup_all_failed() {
    assert_eq!(rollup_status(0, 2, 0), JobStatus::Failed);
}

#[test]
fn test_rollup_skips_count_as_satisfied() {
    // A job whose only outcomes were skips still completed successfully
    assert_eq!(rollup_status(0, 0, 3), JobStatus::Done);
    assert_eq!(rollup_status(0, 1, 2), JobStatus::Partial);
}

#[test]
fn test_terminal_states() {
    assert!(JobStatus::Done.is_terminal());
    assert!(JobStatus::Partial.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
    assert!(JobStatus::Blocked.is_terminal());
    assert!(!JobStatus::Pending.is_terminal());
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
}

#[test]
fn test_status_round_trip() {
    for status in [
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Blocked,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Partial,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        assert_eq!(JobStatus::from_str(status.as_str()), Ok(status));
    }
    assert!(JobStatus::from_str("exploded").is_err());
}

#[test]
fn test_item_status_round_trip() {
    for status in [
        ItemStatus::Queued,
        ItemStatus::Running,
        ItemStatus::Done,
        ItemStatus::Failed,
        ItemStatus::Skipped,
    ] {
        assert_eq!(ItemStatus::from_str(status.as_str()), Ok(status));
    }
}

#[test]
fn test_progress_percent_clamped() {
    assert_eq!(job_with_bytes(1000, 500).progress_percent(), Some(50.0));
    assert_eq!(job_with_bytes(1000, 1000).progress_percent(), Some(100.0));
    // Counters can overshoot when a provider reports more bytes than the
    // client-supplied size; the percentage must not
    assert_eq!(job_with_bytes(1000, 1500).progress_percent(), Some(100.0));
}

#[test]
fn test_progress_undefined_without_total() {
    assert_eq!(job_with_bytes(0, 0).progress_percent(), None);
}
