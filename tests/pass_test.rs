// Integration tests for the shard scan pass
use async_trait::async_trait;
use base64::Engine;
use ct_sweep::audit::AuditSink;
use ct_sweep::ct_log::{ScanSettings, ShardCoordinator};
use ct_sweep::filter::SuffixFilter;
use ct_sweep::queue::{MatchMessage, MatchSink};
use ct_sweep::state::{FileStateStore, ShardRange, StateError, StateStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory state store that records every checkpoint commit, in order.
#[derive(Default)]
struct RecordingStore {
    ranges: Mutex<Vec<(String, u32, ShardRange)>>,
    commits: Mutex<Vec<(String, u32, u64)>>,
    /// Simulate a persistence failure for this log URL.
    fail_commits_for: Option<String>,
}

impl RecordingStore {
    fn with_range(url: &str, shard: u32, range: ShardRange) -> Self {
        let store = Self::default();
        store.add(url, shard, range);
        store
    }

    fn add(&self, url: &str, shard: u32, range: ShardRange) {
        self.ranges.lock().unwrap().push((url.to_string(), shard, range));
    }

    fn commits_for(&self, url: &str) -> Vec<u64> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == url)
            .map(|(_, _, start)| *start)
            .collect()
    }

    fn total_commits(&self) -> usize {
        self.commits.lock().unwrap().len()
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    async fn log_urls(&self) -> Result<Vec<String>, StateError> {
        let mut urls = Vec::new();
        for (url, _, _) in self.ranges.lock().unwrap().iter() {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        Ok(urls)
    }

    async fn shard_range(&self, log_url: &str, shard: u32) -> Result<Option<ShardRange>, StateError> {
        Ok(self
            .ranges
            .lock()
            .unwrap()
            .iter()
            .find(|(url, s, _)| url == log_url && *s == shard)
            .map(|(_, _, range)| *range))
    }

    async fn commit_start(&self, log_url: &str, shard: u32, start: u64) -> Result<(), StateError> {
        if self.fail_commits_for.as_deref() == Some(log_url) {
            return Err(StateError::UnknownShard {
                log_url: log_url.to_string(),
                shard,
            });
        }
        self.commits.lock().unwrap().push((log_url.to_string(), shard, start));
        Ok(())
    }

    async fn set_range(&self, log_url: &str, shard: u32, range: ShardRange) -> Result<(), StateError> {
        self.add(log_url, shard, range);
        Ok(())
    }

    async fn register_log(&self, _log_url: &str) -> Result<(), StateError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<MatchMessage>>,
}

#[async_trait]
impl MatchSink for RecordingSink {
    async fn publish(&self, message: &MatchMessage) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAudit {
    markers: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record_throttle(&self, log_url: &str, reference: &str) -> anyhow::Result<()> {
        self.markers
            .lock()
            .unwrap()
            .push((log_url.to_string(), reference.to_string()));
        Ok(())
    }
}

// --- synthetic leaf encoding, the way a CT log serializes entries ---

fn leaf_bytes(kind_code: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(0u8); // version
    buf.push(0u8); // leaf type
    buf.extend_from_slice(&1_700_000_000_000u64.to_be_bytes());
    buf.extend_from_slice(&kind_code.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn cert_leaf(der: &[u8]) -> Vec<u8> {
    let len = der.len() as u32;
    let mut payload = vec![(len >> 16) as u8, (len >> 8) as u8, len as u8];
    payload.extend_from_slice(der);
    leaf_bytes(0, &payload)
}

fn precert_leaf() -> Vec<u8> {
    leaf_bytes(1, b"issuer-key-hash-and-tbs")
}

fn mint_cert(sans: &[&str]) -> Vec<u8> {
    let params =
        rcgen::CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .unwrap();
    let key = rcgen::KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().der().to_vec()
}

fn entries_body(leaf: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "entries": [{
            "leaf_input": base64::engine::general_purpose::STANDARD.encode(leaf),
            "extra_data": ""
        }]
    })
}

async fn mount_entry(server: &MockServer, index: u64, leaf: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/ct/v1/get-entries"))
        .and(query_param("start", index.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries_body(leaf)))
        .mount(server)
        .await;
}

fn coordinator(
    state: Arc<RecordingStore>,
    sink: Arc<RecordingSink>,
    audit: Arc<RecordingAudit>,
    checkpoint_interval: u64,
) -> ShardCoordinator {
    let filter = SuffixFilter::new(
        &["example.com".to_string()],
        &["au".to_string(), "us".to_string()],
    );

    ShardCoordinator::new(
        ScanSettings {
            shard: 0,
            fetch_timeout: Duration::from_secs(5),
            checkpoint_interval,
        },
        state,
        sink,
        audit,
        filter,
    )
}

#[tokio::test]
async fn exhausted_range_is_a_strict_no_op() {
    let server = MockServer::start().await;

    // Any request at all would fail the test.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = Arc::new(RecordingStore::with_range(
        &server.uri(),
        0,
        ShardRange { start: 7, end: 7 },
    ));
    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), Arc::clone(&sink), audit, 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_skipped, 1);
    assert_eq!(stats.entries_fetched, 0);
    assert_eq!(state.total_commits(), 0);
    assert!(sink.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unseeded_shard_is_skipped() {
    let state = Arc::new(RecordingStore::default());
    state.add("https://ct.example.test/log/", 5, ShardRange { start: 0, end: 10 });

    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    // Coordinator runs shard 0; only shard 5 has a range.
    let stats = coordinator(Arc::clone(&state), sink, audit, 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_skipped, 1);
    assert_eq!(state.total_commits(), 0);
}

#[tokio::test]
async fn end_to_end_match_is_emitted_and_checkpointed() {
    let server = MockServer::start().await;

    mount_entry(&server, 0, &cert_leaf(&mint_cert(&["benign.example.org"]))).await;
    mount_entry(&server, 1, &precert_leaf()).await;
    mount_entry(
        &server,
        2,
        &cert_leaf(&mint_cert(&["evil.example.com.us", "unrelated.example.net"])),
    )
    .await;

    let state = Arc::new(RecordingStore::with_range(
        &server.uri(),
        0,
        ShardRange { start: 0, end: 3 },
    ));
    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), Arc::clone(&sink), Arc::clone(&audit), 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_completed, 1);
    assert_eq!(stats.entries_fetched, 3);
    assert_eq!(stats.matches_emitted, 1);

    let messages = sink.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].matched_names, vec!["evil.example.com.us"]);
    assert_eq!(
        messages[0].retrieval_reference,
        format!("{}/ct/v1/get-entries?start=2&end=2", server.uri())
    );

    // End-of-range checkpoint is the last fetched index.
    assert_eq!(state.commits_for(&server.uri()), vec![2]);
    assert!(audit.markers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn throttle_rolls_back_and_writes_marker() {
    let server = MockServer::start().await;

    mount_entry(&server, 0, &precert_leaf()).await;
    mount_entry(&server, 1, &precert_leaf()).await;
    Mock::given(method("GET"))
        .and(path("/ct/v1/get-entries"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let state = Arc::new(RecordingStore::with_range(
        &server.uri(),
        0,
        ShardRange { start: 0, end: 5 },
    ));
    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), Arc::clone(&sink), Arc::clone(&audit), 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_throttled, 1);
    assert_eq!(stats.entries_fetched, 2);

    // Checkpoint equals the last fetched success, strictly less than the
    // throttled index.
    assert_eq!(state.commits_for(&server.uri()), vec![1]);

    let markers = audit.markers.lock().unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].0, server.uri());
    assert!(markers[0].1.ends_with("start=2&end=2"));
}

#[tokio::test]
async fn checkpoint_cadence_bounds_reprocessing() {
    let server = MockServer::start().await;

    // Same leaf for every index.
    Mock::given(method("GET"))
        .and(path("/ct/v1/get-entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries_body(&precert_leaf())))
        .mount(&server)
        .await;

    let state = Arc::new(RecordingStore::with_range(
        &server.uri(),
        0,
        ShardRange { start: 0, end: 250 },
    ));
    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), sink, audit, 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.entries_fetched, 250);

    // One commit per 100 successes, one unconditional at end-of-range, and
    // never beyond the last fetched index.
    assert_eq!(state.commits_for(&server.uri()), vec![99, 199, 249]);
}

#[tokio::test]
async fn network_failure_abandons_log_but_pass_continues() {
    let good_server = MockServer::start().await;
    mount_entry(&good_server, 0, &precert_leaf()).await;
    mount_entry(&good_server, 1, &precert_leaf()).await;

    // Nothing listens on the discard port; connection fails immediately.
    let dead_url = "http://127.0.0.1:9";

    let state = Arc::new(RecordingStore::default());
    state.add(dead_url, 0, ShardRange { start: 10, end: 20 });
    state.add(&good_server.uri(), 0, ShardRange { start: 0, end: 2 });

    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), sink, Arc::clone(&audit), 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_abandoned, 1);
    assert_eq!(stats.logs_completed, 1);

    // No rollback for the dead log: the checkpoint simply did not advance.
    assert_eq!(state.commits_for(dead_url), vec![10]);
    assert_eq!(state.commits_for(&good_server.uri()), vec![1]);
    assert!(audit.markers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_entries_are_skipped_but_checkpointed() {
    let server = MockServer::start().await;

    // Too short for the leaf header.
    mount_entry(&server, 0, b"xx").await;
    // Certificate leaf whose payload declares more bytes than it carries.
    mount_entry(&server, 1, &leaf_bytes(0, &[0x00, 0x01, 0x00, 0xab])).await;
    // Certificate leaf whose DER is garbage.
    mount_entry(&server, 2, &cert_leaf(b"not DER at all")).await;

    let state = Arc::new(RecordingStore::with_range(
        &server.uri(),
        0,
        ShardRange { start: 0, end: 3 },
    ));
    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), Arc::clone(&sink), audit, 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_completed, 1);
    assert_eq!(stats.entries_fetched, 3);
    assert_eq!(stats.entries_skipped, 3);
    assert!(sink.messages.lock().unwrap().is_empty());

    // Fetches succeeded, so the checkpoint still advances.
    assert_eq!(state.commits_for(&server.uri()), vec![2]);
}

#[tokio::test]
async fn persistence_failure_abandons_log_but_pass_continues() {
    let failing_server = MockServer::start().await;
    mount_entry(&failing_server, 0, &precert_leaf()).await;

    let good_server = MockServer::start().await;
    mount_entry(&good_server, 0, &precert_leaf()).await;

    let mut store = RecordingStore::default();
    store.fail_commits_for = Some(failing_server.uri());
    store.add(&failing_server.uri(), 0, ShardRange { start: 0, end: 1 });
    store.add(&good_server.uri(), 0, ShardRange { start: 0, end: 1 });
    let state = Arc::new(store);

    let sink = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingAudit::default());

    let stats = coordinator(Arc::clone(&state), sink, audit, 100)
        .run_pass()
        .await
        .unwrap();

    assert_eq!(stats.logs_failed, 1);
    assert_eq!(stats.logs_completed, 1);
    assert_eq!(state.commits_for(&good_server.uri()), vec![0]);
}

#[tokio::test]
async fn file_backed_checkpoint_survives_reopen() {
    let server = MockServer::start().await;
    for index in 0..3 {
        mount_entry(&server, index, &precert_leaf()).await;
    }

    let dir = tempfile::TempDir::new().unwrap();
    let state_path = dir.path().join("state.toml");

    let store = FileStateStore::open(state_path.clone()).await.unwrap();
    store
        .set_range(&server.uri(), 0, ShardRange { start: 0, end: 3 })
        .await
        .unwrap();

    let filter = SuffixFilter::new(&["example.com".to_string()], &["us".to_string()]);
    let coordinator = ShardCoordinator::new(
        ScanSettings {
            shard: 0,
            fetch_timeout: Duration::from_secs(5),
            checkpoint_interval: 100,
        },
        Arc::new(store),
        Arc::new(RecordingSink::default()),
        Arc::new(RecordingAudit::default()),
        filter,
    );

    let stats = coordinator.run_pass().await.unwrap();
    assert_eq!(stats.logs_completed, 1);

    // A fresh worker picks up from the committed checkpoint.
    let reopened = FileStateStore::open(state_path).await.unwrap();
    assert_eq!(
        reopened.shard_range(&server.uri(), 0).await.unwrap(),
        Some(ShardRange { start: 2, end: 3 })
    );
}
