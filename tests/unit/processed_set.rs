//! Unit tests for the processed set

use likes_archiver::processed::{Bucket, ProcessedSet};
use tempfile::TempDir;

fn assert_exclusive(set: &ProcessedSet, ids: &[&str]) {
    for id in ids {
        let memberships = Bucket::ALL
            .iter()
            .filter(|bucket| set.ids(**bucket).iter().any(|x| x == id))
            .count();
        assert!(memberships <= 1, "{id} is in {memberships} buckets");
    }
}

#[test]
fn test_buckets_stay_disjoint() {
    let mut set = ProcessedSet::in_memory();
    let ids = ["1", "2", "3", "4"];
    let sequence = [
        ("1", Bucket::Failed),
        ("2", Bucket::NoMedia),
        ("1", Bucket::Successful),
        ("3", Bucket::Failed),
        ("2", Bucket::Failed),
        ("3", Bucket::NoMedia),
        ("4", Bucket::Successful),
        ("4", Bucket::Failed),
        ("1", Bucket::NoMedia),
    ];

    for (id, bucket) in sequence {
        set.mark(id, bucket);
        assert_exclusive(&set, &ids);
        assert_eq!(set.bucket_of(id), Some(bucket));
    }
    assert_eq!(set.len(), 4);
    assert_eq!(set.count(Bucket::NoMedia), 2);
    assert_eq!(set.count(Bucket::Failed), 2);
}

#[test]
fn test_saved_document_uses_camel_case_buckets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed.json");
    let mut set = ProcessedSet::load(&path);
    set.mark("10", Bucket::NoMedia);
    set.mark("11", Bucket::Successful);
    set.save().unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["noMedia"]["10"].is_string());
    assert!(raw["successful"]["11"].is_string());
    assert!(raw["failed"].as_object().unwrap().is_empty());

    let reloaded = ProcessedSet::load(&path);
    assert_eq!(reloaded.bucket_of("10"), Some(Bucket::NoMedia));
    assert_eq!(reloaded.completed_at("11"), set.completed_at("11"));
}

#[test]
fn test_load_repairs_overlapping_buckets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed.json");
    std::fs::write(
        &path,
        r#"{
            "successful": { "1": "2024-01-01T00:00:00Z" },
            "failed": { "1": "2024-01-02T00:00:00Z", "2": "2024-01-02T00:00:00Z" },
            "noMedia": { "2": "2024-01-03T00:00:00Z" }
        }"#,
    )
    .unwrap();

    let set = ProcessedSet::load(&path);
    assert_eq!(set.bucket_of("1"), Some(Bucket::Successful));
    assert_eq!(set.bucket_of("2"), Some(Bucket::NoMedia));
    assert_exclusive(&set, &["1", "2"]);
}

#[test]
fn test_corrupt_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();
    assert!(ProcessedSet::load(&path).is_empty());
}
