//! In-process collaborators and fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use likes_archiver::archive::LocalArchive;
use likes_archiver::downloader::{RetryPolicy, RunConfig, RunExecutor};
use likes_archiver::fetcher::{FetchFailure, MediaTransfer, MetadataFetcher};
use likes_archiver::shutdown::{SharedShutdown, ShutdownCoordinator};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Byte transfer that writes the URL into the destination file
#[derive(Default)]
pub struct FakeTransfer {
    delay: Duration,
    failures: Mutex<HashMap<String, String>>,
    leave_partial: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write some bytes before failing
    pub fn leaving_partial_files(mut self) -> Self {
        self.leave_partial = true;
        self
    }

    pub fn failing(self, url: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTransfer for FakeTransfer {
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }

        let failure = self.failures.lock().unwrap().get(url).cloned();
        let result = match failure {
            Some(message) => {
                if self.leave_partial {
                    tokio::fs::write(dest, b"partial").await.unwrap();
                }
                Err(FetchFailure::new(message))
            }
            None => {
                tokio::fs::write(dest, url.as_bytes()).await.unwrap();
                Ok(url.len() as u64)
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Metadata source answering from a per-id script
#[derive(Default)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<String, Vec<Result<Value, FetchFailure>>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer `id` with `responses` in order, repeating the last one
    pub fn script(self, id: &str, responses: Vec<Result<Value, &str>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| r.map_err(FetchFailure::new))
            .collect();
        self.answering(id, responses)
    }

    /// Like [`FakeFetcher::script`] with full failure values
    pub fn answering(self, id: &str, responses: Vec<Result<Value, FetchFailure>>) -> Self {
        self.scripts.lock().unwrap().insert(id.to_string(), responses);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Most fetches observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for FakeFetcher {
    async fn fetch(&self, id: &str) -> Result<Value, FetchFailure> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(id.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        let scripts = self.scripts.lock().unwrap();
        match scripts.get(id) {
            Some(responses) if !responses.is_empty() => {
                responses[attempt.min(responses.len() - 1)].clone()
            }
            _ => Ok(photo_post(id, &[&format!("https://img.example.com/{id}.jpg")])),
        }
    }
}

/// Metadata document of a post with photos
pub fn photo_post(id: &str, urls: &[&str]) -> Value {
    let media: Vec<Value> = urls
        .iter()
        .map(|url| json!({ "type": "photo", "url": url }))
        .collect();
    json!({ "id": id, "text": format!("post {id}"), "media": media })
}

/// Metadata document of a post with one video
pub fn video_post(id: &str, variants: &[(u64, &str)], cover: Option<&str>) -> Value {
    let variants: Vec<Value> = variants
        .iter()
        .map(|(bitrate, url)| json!({ "url": url, "bitrate": bitrate }))
        .collect();
    let mut entry = json!({ "type": "video", "variants": variants });
    if let Some(cover) = cover {
        entry["coverUrl"] = json!(cover);
    }
    json!({ "id": id, "media": [entry] })
}

/// Workspace with an archive and a state directory
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    pub fn archive(&self) -> LocalArchive {
        LocalArchive::new(self.dir.path().join("archive"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn ledger_path(&self) -> PathBuf {
        likes_archiver::state::ledger_path(&self.state_dir())
    }

    pub fn processed_path(&self) -> PathBuf {
        likes_archiver::state::processed_path(&self.state_dir())
    }

    pub fn executor(&self, transfer: Arc<dyn MediaTransfer>, config: RunConfig) -> RunExecutor {
        RunExecutor::open(self.archive(), &self.state_dir(), transfer, config)
            .with_shutdown(ShutdownCoordinator::shared())
    }

    pub fn executor_with_shutdown(
        &self,
        transfer: Arc<dyn MediaTransfer>,
        config: RunConfig,
        shutdown: SharedShutdown,
    ) -> RunExecutor {
        RunExecutor::open(self.archive(), &self.state_dir(), transfer, config)
            .with_shutdown(shutdown)
    }

    pub fn seed(&self, id: &str, document: &Value) {
        self.archive().write_metadata(id, document).unwrap();
    }
}

/// Run settings without real waits
pub fn fast_config() -> RunConfig {
    RunConfig {
        retry_policy: RetryPolicy::new(3, Duration::from_millis(1)),
        ..RunConfig::default()
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
