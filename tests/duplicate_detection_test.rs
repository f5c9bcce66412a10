// Duplicate detection decision tests

use hopsync_backend_core::services::is_duplicate_of;
use hopsync_backend_core::RemoteItem;

fn remote(name: &str, checksum: Option<&str>, mime: Option<&str>) -> RemoteItem {
    RemoteItem {
        id: "item-1".to_string(),
        name: name.to_string(),
        mime_type: mime.map(str::to_string),
        size: Some(1024),
        checksum: checksum.map(str::to_string),
        web_url: None,
    }
}

#[test]
fn test_same_name_mismatched_checksum_is_not_duplicate() {
    let source = remote("q3-report.pdf", Some("aaa"), Some("application/pdf"));
    let candidate = remote("q3-report.pdf", Some("bbb"), Some("application/pdf"));
    assert!(!is_duplicate_of(&source, &candidate));
}

#[test]
fn test_workspace_item_matches_on_name_and_type() {
    // Native document types never expose a checksum; name plus type is
    // the strongest signal available
    let source = remote(
        "Planning",
        None,
        Some("application/vnd.google-apps.document"),
    );
    let candidate = remote(
        "Planning",
        None,
        Some("application/vnd.google-apps.document"),
    );
    assert!(is_duplicate_of(&source, &candidate));
}

#[test]
fn test_checksum_match_wins_over_type_difference() {
    let source = remote("data.bin", Some("xyz"), Some("application/octet-stream"));
    let candidate = remote("data.bin", Some("xyz"), None);
    assert!(is_duplicate_of(&source, &candidate));
}

#[test]
fn test_name_mismatch_is_never_duplicate() {
    let source = remote("a.txt", Some("sum"), Some("text/plain"));
    let candidate = remote("a (1).txt", Some("sum"), Some("text/plain"));
    assert!(!is_duplicate_of(&source, &candidate));
}
