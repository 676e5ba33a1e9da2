//! Integration tests for processed-set reconciliation against the archive

use crate::support::{photo_post, Workspace};
use likes_archiver::ledger::{ErrorDetails, ErrorKind, ErrorLedger};
use likes_archiver::processed::{reconcile, Bucket, ProcessedSet};

fn seeded() -> (Workspace, ProcessedSet, ErrorLedger) {
    let ws = Workspace::new();
    let archive = ws.archive();

    // "kept": archived and marked successful
    ws.seed("kept", &photo_post("kept", &["https://img.example.com/k.jpg"]));
    // "lost": marked successful, directory holds media but no metadata
    std::fs::create_dir_all(archive.item_dir("lost")).unwrap();
    std::fs::write(archive.item_dir("lost").join("x.jpg"), b"orphan").unwrap();
    // "found": archived under the id-derived name, unknown to the processed set
    std::fs::create_dir_all(archive.item_dir("found")).unwrap();
    std::fs::write(
        archive.item_dir("found").join("found.json"),
        photo_post("found", &[]).to_string(),
    )
    .unwrap();
    // "empty": a directory with nothing in it
    std::fs::create_dir_all(archive.item_dir("empty")).unwrap();

    let mut processed = ProcessedSet::load(ws.processed_path());
    processed.mark("kept", Bucket::Successful);
    processed.mark("lost", Bucket::Successful);

    let mut ledger = ErrorLedger::load(ws.ledger_path());
    ledger
        .add_error("found", ErrorKind::NetworkError, ErrorDetails::message("timed out"))
        .unwrap();
    ledger
        .add_error("lost", ErrorKind::Media403, ErrorDetails::message("HTTP 403"))
        .unwrap();
    (ws, processed, ledger)
}

#[test]
fn test_reconcile_repairs_both_directions() {
    let (ws, mut processed, mut ledger) = seeded();
    let archive = ws.archive();

    let report = reconcile(&archive, &mut processed, &mut ledger).unwrap();

    assert_eq!(report.not_found, vec!["lost"]);
    assert_eq!(report.recovered, vec!["found"]);
    assert!(!archive.item_dir("lost").exists());
    assert!(archive.item_dir("kept").exists());
    assert!(archive.item_dir("empty").exists());

    assert_eq!(processed.bucket_of("kept"), Some(Bucket::Successful));
    assert_eq!(processed.bucket_of("found"), Some(Bucket::Successful));
    assert_eq!(processed.bucket_of("lost"), None);
    assert_eq!(processed.bucket_of("empty"), None);

    assert!(!ledger.has_error("found"));
    let lost = ledger.get_error("lost").unwrap();
    assert_eq!(lost.kind, ErrorKind::NotFound);
    assert_eq!(ledger.statistics().total_errors, 1);
    assert_eq!(ledger.statistics().count_of(ErrorKind::Media403), 0);
}

#[test]
fn test_reconcile_twice_is_a_noop() {
    let (ws, mut processed, mut ledger) = seeded();
    let archive = ws.archive();

    let first = reconcile(&archive, &mut processed, &mut ledger).unwrap();
    assert!(!first.is_noop());

    let processed_after = processed.document().clone();
    let ledger_after = ledger.document().clone();
    let listing_after = archive.list_item_ids().unwrap();

    let second = reconcile(&archive, &mut processed, &mut ledger).unwrap();
    assert!(second.is_noop());
    assert_eq!(processed.document(), &processed_after);
    assert_eq!(ledger.document(), &ledger_after);
    assert_eq!(archive.list_item_ids().unwrap(), listing_after);
}

#[test]
fn test_reconcile_leaves_failed_and_no_media_alone() {
    let ws = Workspace::new();
    let archive = ws.archive();
    ws.seed("f", &photo_post("f", &["https://img.example.com/f.jpg"]));
    ws.seed("n", &serde_json::json!({ "id": "n", "text": "words" }));

    let mut processed = ProcessedSet::in_memory();
    processed.mark("f", Bucket::Failed);
    processed.mark("n", Bucket::NoMedia);
    let mut ledger = ErrorLedger::in_memory();

    let report = reconcile(&archive, &mut processed, &mut ledger).unwrap();
    assert!(report.is_noop());
    assert_eq!(processed.bucket_of("f"), Some(Bucket::Failed));
    assert_eq!(processed.bucket_of("n"), Some(Bucket::NoMedia));
}
