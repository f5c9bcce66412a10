// Chunked upload partitioning tests
// Every chunk is either a full unit or the final shorter remainder, and
// the ranges cover the file exactly once.

use hopsync_backend_core::providers::{chunk_ranges, content_range};

const UNIT: u64 = 327_680;
const GRAPH_CHUNK: u64 = UNIT * 32;
const DRIVE_CHUNK: u64 = 256 * 1024;

#[test]
fn test_ranges_partition_file_exactly() {
    for total in [1u64, DRIVE_CHUNK - 1, DRIVE_CHUNK, DRIVE_CHUNK + 1, 5 * 1024 * 1024 + 17] {
        let ranges = chunk_ranges(total, DRIVE_CHUNK);
        let mut expected_start = 0u64;
        for range in &ranges {
            assert_eq!(range.start, expected_start, "gap or overlap at {}", range.start);
            assert!(range.end > range.start);
            expected_start = range.end;
        }
        assert_eq!(expected_start, total, "coverage must end at file size");
    }
}

#[test]
fn test_all_but_last_chunk_are_full_size() {
    let total = GRAPH_CHUNK * 2 + 12_345;
    let ranges = chunk_ranges(total, GRAPH_CHUNK);
    assert_eq!(ranges.len(), 3);
    for range in &ranges[..ranges.len() - 1] {
        assert_eq!(range.end - range.start, GRAPH_CHUNK);
    }
    let last = &ranges[ranges.len() - 1];
    assert_eq!(last.end - last.start, 12_345);
}

#[test]
fn test_exact_multiple_has_no_trailing_chunk() {
    let ranges = chunk_ranges(GRAPH_CHUNK * 4, GRAPH_CHUNK);
    assert_eq!(ranges.len(), 4);
    assert!(ranges.iter().all(|r| r.end - r.start == GRAPH_CHUNK));
}

#[test]
fn test_session_chunk_is_multiple_of_upload_unit() {
    assert_eq!(GRAPH_CHUNK % UNIT, 0);
    assert_eq!(GRAPH_CHUNK, 10_485_760);
}

#[test]
fn test_content_range_header_format() {
    let ranges = chunk_ranges(1000, 400);
    assert_eq!(content_range(&ranges[0], 1000), "bytes 0-399/1000");
    assert_eq!(content_range(&ranges[1], 1000), "bytes 400-799/1000");
    assert_eq!(content_range(&ranges[2], 1000), "bytes 800-999/1000");
}

#[test]
fn test_empty_file_produces_no_ranges() {
    assert!(chunk_ranges(0, DRIVE_CHUNK).is_empty());
}
