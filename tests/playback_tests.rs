// Integration tests for the playback queue
//
// These tests drive the queue through scripted sinks to verify FIFO order,
// one-at-a-time playback, interruption, failure skipping, and transient
// file cleanup.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use voicewire::audio::{AudioSegment, PlaybackQueue, SegmentStore};
use voicewire::{Error, NoopRouting, PlaybackSink};

const SWEEP_NEVER: Duration = Duration::from_secs(3600);

/// Sink that reports every play start and holds each segment until the test
/// releases it (or the queue cancels it).
struct GatedSink {
    started: mpsc::UnboundedSender<Vec<u8>>,
    gate: Mutex<mpsc::UnboundedReceiver<()>>,
}

impl GatedSink {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>, mpsc::UnboundedSender<()>) {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                started: started_tx,
                gate: Mutex::new(gate_rx),
            }),
            started_rx,
            gate_tx,
        )
    }
}

#[async_trait]
impl PlaybackSink for GatedSink {
    async fn play(&self, container: &Path, cancel: CancellationToken) -> voicewire::Result<()> {
        // Report the PCM body so tests can tell segments apart.
        let bytes = std::fs::read(container).expect("container readable while playing");
        self.started.send(bytes[44..].to_vec()).ok();

        let mut gate = self.gate.lock().await;
        tokio::select! {
            _ = gate.recv() => Ok(()),
            _ = cancel.cancelled() => Ok(()),
        }
    }
}

/// Sink that fails the first segment and accepts the rest instantly.
struct FlakySink {
    failed_once: AtomicBool,
    started: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl PlaybackSink for FlakySink {
    async fn play(&self, container: &Path, _cancel: CancellationToken) -> voicewire::Result<()> {
        let bytes = std::fs::read(container).expect("container readable while playing");
        self.started.send(bytes[44..].to_vec()).ok();
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(Error::Playback("injected device failure".to_string()));
        }
        Ok(())
    }
}

async fn make_store(dir: &TempDir) -> Arc<SegmentStore> {
    Arc::new(
        SegmentStore::create(dir.path().to_path_buf(), 10)
            .await
            .expect("store creates"),
    )
}

fn segment(tag: u8) -> AudioSegment {
    AudioSegment::mono16(vec![tag; 8], 24_000)
}

async fn expect_start(started: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    timeout(Duration::from_secs(2), started.recv())
        .await
        .expect("timed out waiting for playback to start")
        .expect("sink channel closed")
}

async fn expect_no_start(started: &mut mpsc::UnboundedReceiver<Vec<u8>>) {
    let outcome = timeout(Duration::from_millis(100), started.recv()).await;
    assert!(outcome.is_err(), "nothing should have started playing");
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting: {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_segments_play_one_at_a_time_in_arrival_order() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, mut started, release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(segment(1));
    queue.enqueue(segment(2));
    queue.enqueue(segment(3));

    // Only the head of the queue plays.
    assert_eq!(expect_start(&mut started).await, vec![1u8; 8]);
    expect_no_start(&mut started).await;
    assert_eq!(queue.pending(), 2);

    // Finishing one segment starts exactly the next.
    release.send(()).unwrap();
    assert_eq!(expect_start(&mut started).await, vec![2u8; 8]);
    expect_no_start(&mut started).await;

    release.send(()).unwrap();
    assert_eq!(expect_start(&mut started).await, vec![3u8; 8]);

    release.send(()).unwrap();
    wait_until("third segment completes", || queue.played() == 3).await;
    queue.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_on_idle_queue_starts_promptly() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, mut started, release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    // Queue is idle; nothing is playing.
    expect_no_start(&mut started).await;
    assert!(!queue.is_playing());

    queue.enqueue(segment(7));
    assert_eq!(expect_start(&mut started).await, vec![7u8; 8]);

    release.send(()).unwrap();
    queue.shutdown().await;
}

#[tokio::test]
async fn test_clear_drops_pending_and_interrupts_current() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, mut started, _release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(segment(1));
    queue.enqueue(segment(2));
    queue.enqueue(segment(3));
    assert_eq!(expect_start(&mut started).await, vec![1u8; 8]);

    let dropped = queue.clear();
    assert_eq!(dropped, 2, "both pending segments are discarded");
    assert_eq!(queue.pending(), 0);

    // The interrupted segment does not resume and nothing new starts.
    expect_no_start(&mut started).await;
    assert_eq!(queue.played(), 0, "an interrupted segment does not count as played");

    queue.shutdown().await;
}

#[tokio::test]
async fn test_failed_segment_is_skipped_and_queue_advances() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let sink = Arc::new(FlakySink {
        failed_once: AtomicBool::new(false),
        started: started_tx,
    });
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(segment(1));
    queue.enqueue(segment(2));

    assert_eq!(expect_start(&mut started).await, vec![1u8; 8]);
    assert_eq!(expect_start(&mut started).await, vec![2u8; 8]);

    wait_until("failure and success are both recorded", || {
        queue.failed() == 1 && queue.played() == 1
    })
    .await;
    queue.shutdown().await;
}

#[tokio::test]
async fn test_transient_files_are_released_after_playback() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, mut started, release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(segment(5));
    expect_start(&mut started).await;

    // The container exists on disk while the segment is playing.
    let during: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".wav"))
        .collect();
    assert_eq!(during.len(), 1, "one transient file while playing");

    release.send(()).unwrap();

    // After completion the file is deleted.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".wav"))
            .count();
        if remaining == 0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "transient file was not released"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    queue.shutdown().await;
}

#[tokio::test]
async fn test_empty_segment_counts_as_failed() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, mut started, _release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(AudioSegment::mono16(Vec::new(), 24_000));
    queue.enqueue(segment(2));

    // The empty segment never reaches the sink; the next one plays.
    assert_eq!(expect_start(&mut started).await, vec![2u8; 8]);
    wait_until("empty segment recorded as failed", || queue.failed() == 1).await;

    queue.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = make_store(&dir).await;
    let (sink, _started, _release) = GatedSink::new();
    let queue = PlaybackQueue::start(store, sink, Arc::new(NoopRouting), SWEEP_NEVER);

    queue.enqueue(segment(1));
    queue.shutdown().await;
    queue.shutdown().await;
    assert_eq!(queue.pending(), 0);
}
