//! Unit tests for export parsing and the batch runner

use likes_archiver::downloader::BatchRunner;
use likes_archiver::export::{read_export, ExportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[test]
fn test_read_export_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("like.js");
    std::fs::write(
        &path,
        "window.YTD.like.part0 = [\n  {\"like\": {\"tweetId\": \"5\"}},\n  {\"like\": {\"tweetId\": \"6\"}},\n  {\"like\": {\"tweetId\": \"5\"}}\n]\n",
    )
    .unwrap();
    assert_eq!(read_export(&path).unwrap(), vec!["5", "6"]);
}

#[test]
fn test_read_export_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = read_export(&dir.path().join("nope.js")).unwrap_err();
    assert!(matches!(err, ExportError::IoError { .. }));
}

#[tokio::test]
async fn test_chunking_2500_items_in_1000s() {
    let items: Vec<usize> = (0..2500).collect();
    let calls = AtomicUsize::new(0);
    let calls = &calls;
    let sizes = std::sync::Mutex::new(Vec::new());
    let sizes = &sizes;

    let outcome = BatchRunner::new(1000)
        .process_batch(
            &items,
            |_, chunk| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sizes.lock().unwrap().push(chunk.len());
                chunk.iter().map(|n| n * 2).collect::<Vec<_>>()
            },
            |_| {},
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*sizes.lock().unwrap(), vec![1000, 1000, 500]);
    assert!(!outcome.interrupted);
    let expected: Vec<usize> = items.iter().map(|n| n * 2).collect();
    assert_eq!(outcome.results, expected);
}

#[tokio::test]
async fn test_concurrent_chunks_keep_input_order() {
    let items: Vec<u64> = (0..50).collect();
    let outcome = BatchRunner::new(8)
        .run_concurrent(
            &items,
            |n| async move {
                // Later items finish first
                tokio::time::sleep(std::time::Duration::from_millis(50 - *n)).await;
                *n
            },
            |_| {},
        )
        .await;
    assert_eq!(outcome.results, items);
}
