//! Integration tests for the global transfer bound

use crate::support::{fast_config, photo_post, FakeFetcher, FakeTransfer, Workspace};
use likes_archiver::downloader::{ConcurrencyLimiter, RunConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_limiter_never_exceeds_capacity() {
    let limiter = ConcurrencyLimiter::new(4);
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let done = AtomicUsize::new(0);

    let tasks = (0..20).map(|i| {
        let (active, peak, done) = (&active, &peak, &done);
        limiter.run(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5 + (i % 3) * 5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
        })
    });
    let results = futures::future::join_all(tasks).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(done.load(Ordering::SeqCst), 20);
    assert_eq!(peak.load(Ordering::SeqCst), 4);
    assert_eq!(limiter.active(), 0);
}

#[tokio::test]
async fn test_transfers_bounded_across_items() {
    let ws = Workspace::new();
    let worklist: Vec<String> = (0..10).map(|i| format!("{}", 100 + i)).collect();
    for id in &worklist {
        let urls: Vec<String> = (0..3)
            .map(|n| format!("https://img.example.com/{id}-{n}.jpg"))
            .collect();
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
        ws.seed(id, &photo_post(id, &urls));
    }

    let transfer = Arc::new(FakeTransfer::new().with_delay(Duration::from_millis(10)));
    let config = RunConfig {
        concurrency: 3,
        ..fast_config()
    };
    let summary = ws
        .executor(transfer.clone(), config)
        .run(&worklist)
        .await
        .unwrap();

    assert_eq!(summary.completed, 10);
    assert_eq!(transfer.calls(), 30);
    assert!(transfer.peak() <= 3, "peak was {}", transfer.peak());
    assert!(transfer.peak() >= 2);
}

#[tokio::test]
async fn test_single_slot_serializes_transfers() {
    let ws = Workspace::new();
    ws.seed(
        "1",
        &photo_post(
            "1",
            &[
                "https://img.example.com/a.jpg",
                "https://img.example.com/b.jpg",
                "https://img.example.com/c.jpg",
            ],
        ),
    );

    let transfer = Arc::new(FakeTransfer::new().with_delay(Duration::from_millis(5)));
    let config = RunConfig {
        concurrency: 1,
        ..fast_config()
    };
    ws.executor(transfer.clone(), config)
        .run(&["1".to_string()])
        .await
        .unwrap();

    assert_eq!(transfer.peak(), 1);
    // FIFO admission keeps listed order
    assert_eq!(
        transfer.requested(),
        vec![
            "https://img.example.com/a.jpg",
            "https://img.example.com/b.jpg",
            "https://img.example.com/c.jpg",
        ]
    );
}

#[tokio::test]
async fn test_metadata_fetches_bounded_within_a_chunk() {
    let ws = Workspace::new();
    let worklist: Vec<String> = (0..200).map(|i| format!("{}", 5000 + i)).collect();

    let fetcher = Arc::new(FakeFetcher::new().with_delay(Duration::from_millis(20)));
    let transfer = Arc::new(FakeTransfer::new());
    let config = RunConfig {
        concurrency: 2,
        fetch_concurrency: 2,
        batch_size: 200,
        ..fast_config()
    };
    let summary = ws
        .executor(transfer.clone(), config)
        .with_fetcher(fetcher.clone())
        .run(&worklist)
        .await
        .unwrap();

    assert_eq!(summary.completed, 200);
    assert_eq!(fetcher.calls(), 200);
    assert!(fetcher.peak() <= 2, "peak was {}", fetcher.peak());
    assert!(transfer.peak() <= 2);
}
