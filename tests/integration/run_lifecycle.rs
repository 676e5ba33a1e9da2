//! Integration tests for whole runs over a local archive

use crate::support::{fast_config, ids, photo_post, video_post, FakeFetcher, FakeTransfer, Workspace};
use likes_archiver::downloader::RunConfig;
use likes_archiver::ledger::{ErrorDetails, ErrorKind, ErrorLedger};
use likes_archiver::processed::{Bucket, ProcessedSet};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_run_archives_all_media() {
    let ws = Workspace::new();
    ws.seed(
        "1",
        &photo_post("1", &["https://img.example.com/a.jpg", "https://img.example.com/b.png"]),
    );
    ws.seed(
        "2",
        &video_post(
            "2",
            &[
                (480, "https://v.example.com/low.mp4"),
                (1080, "https://v.example.com/high.mp4"),
                (720, "https://v.example.com/mid.mp4"),
            ],
            Some("https://img.example.com/thumb.jpg"),
        ),
    );

    let transfer = Arc::new(FakeTransfer::new());
    let executor = ws.executor(transfer.clone(), fast_config());
    let summary = executor.run(&ids(&["1", "2"])).await.unwrap();

    assert_eq!(summary.requested, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.files_downloaded, 4);
    assert!(!summary.halted);

    let archive = ws.archive();
    assert!(archive.item_dir("1").join("a.jpg").exists());
    assert!(archive.item_dir("1").join("b.png").exists());
    assert!(archive.item_dir("2").join("high.mp4").exists());
    assert!(archive.item_dir("2").join("thumb.jpg").exists());
    assert!(!archive.item_dir("2").join("low.mp4").exists());
    assert!(!archive.item_dir("2").join("high.mp4.part").exists());

    let requested = transfer.requested();
    assert!(!requested.contains(&"https://v.example.com/low.mp4".to_string()));
    assert!(!requested.contains(&"https://v.example.com/mid.mp4".to_string()));

    let processed = ProcessedSet::load(ws.processed_path());
    assert_eq!(processed.bucket_of("1"), Some(Bucket::Successful));
    assert_eq!(processed.bucket_of("2"), Some(Bucket::Successful));
    assert!(ErrorLedger::load(ws.ledger_path()).is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let ws = Workspace::new();
    for id in ["1", "2", "3"] {
        ws.seed(id, &photo_post(id, &[&format!("https://img.example.com/{id}.jpg")]));
    }
    let worklist = ids(&["1", "2", "3"]);

    let transfer = Arc::new(FakeTransfer::new());
    let first = ws.executor(transfer.clone(), fast_config()).run(&worklist).await.unwrap();
    assert_eq!(first.completed, 3);
    assert_eq!(transfer.calls(), 3);

    let second = ws.executor(transfer.clone(), fast_config()).run(&worklist).await.unwrap();
    assert_eq!(second.already_processed, 3);
    assert_eq!(second.attempted, 0);
    assert_eq!(transfer.calls(), 3);
}

#[tokio::test]
async fn test_existing_files_are_not_downloaded_again() {
    let ws = Workspace::new();
    ws.seed(
        "1",
        &photo_post("1", &["https://img.example.com/a.jpg", "https://img.example.com/b.jpg"]),
    );
    std::fs::write(ws.archive().item_dir("1").join("a.jpg"), b"already here").unwrap();

    let transfer = Arc::new(FakeTransfer::new());
    let summary = ws
        .executor(transfer.clone(), fast_config())
        .run(&ids(&["1"]))
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_downloaded, 1);
    assert_eq!(transfer.requested(), vec!["https://img.example.com/b.jpg"]);
    assert_eq!(
        std::fs::read(ws.archive().item_dir("1").join("a.jpg")).unwrap(),
        b"already here"
    );
}

#[tokio::test]
async fn test_posts_without_media_are_terminal() {
    let ws = Workspace::new();
    ws.seed("1", &json!({ "id": "1", "text": "just words" }));
    ws.seed("2", &json!({ "id": "2", "media": [] }));

    let transfer = Arc::new(FakeTransfer::new());
    let summary = ws
        .executor(transfer.clone(), fast_config())
        .run(&ids(&["1", "2"]))
        .await
        .unwrap();

    assert_eq!(summary.no_media, 2);
    assert_eq!(transfer.calls(), 0);
    let processed = ProcessedSet::load(ws.processed_path());
    assert_eq!(processed.count(Bucket::NoMedia), 2);
}

#[tokio::test]
async fn test_missing_metadata_is_fetched_and_written() {
    let ws = Workspace::new();
    let fetcher = Arc::new(FakeFetcher::new());
    let transfer = Arc::new(FakeTransfer::new());

    let summary = ws
        .executor(transfer.clone(), fast_config())
        .with_fetcher(fetcher.clone())
        .run(&ids(&["41", "42"]))
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(fetcher.calls(), 2);
    assert!(ws.archive().exists_local_metadata("41"));
    assert!(ws.archive().item_dir("42").join("42.jpg").exists());
}

#[tokio::test]
async fn test_spent_retry_budget_skips_without_network() {
    let ws = Workspace::new();
    {
        let mut ledger = ErrorLedger::load(ws.ledger_path());
        for _ in 0..3 {
            ledger
                .add_error("7", ErrorKind::NetworkError, ErrorDetails::message("connection reset"))
                .unwrap();
        }
        assert_eq!(ledger.get_error("7").unwrap().retry_count, 3);
    }

    let fetcher = Arc::new(FakeFetcher::new());
    let transfer = Arc::new(FakeTransfer::new());
    let summary = ws
        .executor(transfer.clone(), fast_config())
        .with_fetcher(fetcher.clone())
        .run(&ids(&["7"]))
        .await
        .unwrap();

    assert_eq!(summary.max_retry_exceeded, 1);
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(transfer.calls(), 0);

    let ledger = ErrorLedger::load(ws.ledger_path());
    assert_eq!(ledger.get_error("7").unwrap().retry_count, 3);
    let processed = ProcessedSet::load(ws.processed_path());
    assert_eq!(processed.bucket_of("7"), Some(Bucket::Failed));
}

#[tokio::test]
async fn test_item_below_retry_budget_is_attempted() {
    let ws = Workspace::new();
    ws.seed("8", &photo_post("8", &["https://img.example.com/8.jpg"]));
    {
        let mut ledger = ErrorLedger::load(ws.ledger_path());
        for _ in 0..2 {
            ledger
                .add_error("8", ErrorKind::Media403, ErrorDetails::message("HTTP 403 Forbidden"))
                .unwrap();
        }
    }

    let transfer = Arc::new(FakeTransfer::new());
    let summary = ws
        .executor(transfer.clone(), fast_config())
        .run(&ids(&["8"]))
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(transfer.calls(), 1);
    let ledger = ErrorLedger::load(ws.ledger_path());
    assert!(!ledger.has_error("8"));
    assert_eq!(ledger.statistics().total_errors, 0);
}

#[tokio::test]
async fn test_duplicate_ids_and_chunks() {
    let ws = Workspace::new();
    let worklist: Vec<String> = (0..25).map(|i| i.to_string()).chain(["3".to_string()]).collect();
    for id in worklist.iter().take(25) {
        ws.seed(id, &photo_post(id, &[&format!("https://img.example.com/{id}.jpg")]));
    }

    let transfer = Arc::new(FakeTransfer::new());
    let progress_calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = progress_calls.clone();
    let config = RunConfig {
        batch_size: 10,
        ..fast_config()
    };
    let summary = ws
        .executor(transfer.clone(), config)
        .with_progress(move |p| seen.lock().unwrap().push((p.completed, p.total)))
        .run(&worklist)
        .await
        .unwrap();

    assert_eq!(summary.requested, 25);
    assert_eq!(summary.completed, 25);
    assert_eq!(transfer.calls(), 25);
    assert_eq!(
        *progress_calls.lock().unwrap(),
        vec![(10, 25), (20, 25), (25, 25)]
    );
}

#[tokio::test]
async fn test_platform_media_shape_is_archived() {
    let ws = Workspace::new();
    ws.seed(
        "3",
        &json!({
            "id": "3",
            "media": [
                {
                    "type": "photo",
                    "url": "https://t.co/abc",
                    "media_url_https": "https://pbs.example.com/media/Fx404.jpg"
                },
                { "type": "audio_space", "url": "https://t.co/def" }
            ]
        }),
    );

    let transfer = Arc::new(FakeTransfer::new());
    let summary = ws
        .executor(transfer.clone(), fast_config())
        .run(&ids(&["3"]))
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.files_downloaded, 1);
    assert_eq!(summary.metadata_failures, 0);
    assert_eq!(transfer.requested(), vec!["https://pbs.example.com/media/Fx404.jpg"]);
    assert!(ws.archive().item_dir("3").join("Fx404.jpg").exists());
    assert!(ErrorLedger::load(ws.ledger_path()).is_empty());
}
