use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::segment::AudioSegment;
use crate::audio::store::{spawn_sweeper, SegmentStore};
use crate::device::{AudioRouting, PlaybackSink};
use crate::error::Result;

struct QueueState {
    pending: VecDeque<AudioSegment>,
    /// Cancels the segment being played right now, if any.
    current: Option<CancellationToken>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
    shutdown: CancellationToken,
    store: Arc<SegmentStore>,
    enqueued: AtomicU64,
    played: AtomicU64,
    failed: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// FIFO of decoded segments with a single worker draining it, so at most
/// one segment plays at any moment. Enqueueing onto an idle queue wakes
/// the worker at once; a failed segment is skipped and the queue moves on.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<QueueInner>,
}

impl PlaybackQueue {
    /// Spawn the worker and the periodic segment-file sweep.
    pub fn start(
        store: Arc<SegmentStore>,
        sink: Arc<dyn PlaybackSink>,
        routing: Arc<dyn AudioRouting>,
        sweep_interval: Duration,
    ) -> Self {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                current: None,
            }),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            store: store.clone(),
            enqueued: AtomicU64::new(0),
            played: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            worker: Mutex::new(None),
            sweeper: Mutex::new(None),
        });

        let worker = tokio::spawn(run_worker(inner.clone(), sink, routing));
        *inner.worker.lock() = Some(worker);
        *inner.sweeper.lock() = Some(spawn_sweeper(store, sweep_interval));

        Self { inner }
    }

    /// Append a segment. Playback order is arrival order.
    pub fn enqueue(&self, segment: AudioSegment) {
        self.inner.state.lock().pending.push_back(segment);
        self.inner.enqueued.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Drop everything pending and interrupt the segment being played.
    /// Returns how many pending segments were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        if let Some(token) = state.current.as_ref() {
            token.cancel();
        }
        dropped
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().current.is_some()
    }

    pub fn enqueued(&self) -> u64 {
        self.inner.enqueued.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> u64 {
        self.inner.played.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::SeqCst)
    }

    /// Stop the worker and the sweeper. Pending segments are discarded and
    /// the in-flight one is interrupted. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.clear();
        self.inner.notify.notify_one();

        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Playback worker ended abnormally: {}", e);
            }
        }
        let sweeper = self.inner.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
    }
}

async fn run_worker(
    inner: Arc<QueueInner>,
    sink: Arc<dyn PlaybackSink>,
    routing: Arc<dyn AudioRouting>,
) {
    loop {
        // Pop the next segment, registering its cancel token under the same
        // lock so a concurrent clear() can never miss it.
        let (segment, token) = loop {
            if inner.shutdown.is_cancelled() {
                return;
            }
            let popped = {
                let mut state = inner.state.lock();
                state.pending.pop_front().map(|segment| {
                    let token = CancellationToken::new();
                    state.current = Some(token.clone());
                    (segment, token)
                })
            };
            if let Some(pair) = popped {
                break pair;
            }
            tokio::select! {
                _ = inner.notify.notified() => {}
                _ = inner.shutdown.cancelled() => return,
            }
        };

        // Re-assert the output route before every segment; platforms are
        // free to steal it back between plays. Never fatal.
        if let Err(e) = routing.force_speaker_output(true).await {
            warn!("Speaker routing unavailable: {}", e);
        }

        let outcome = play_segment(&inner.store, sink.as_ref(), segment, token.clone()).await;
        inner.state.lock().current = None;

        match outcome {
            Ok(()) if token.is_cancelled() => {
                debug!("Playback interrupted before completion");
            }
            Ok(()) => {
                inner.played.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("Skipping unplayable segment: {}", e);
                inner.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// One segment end to end: container, transient file, device, delete. The
/// file is released on every path out, including cancellation and device
/// failure.
async fn play_segment(
    store: &SegmentStore,
    sink: &dyn PlaybackSink,
    segment: AudioSegment,
    cancel: CancellationToken,
) -> Result<()> {
    let container = segment.to_wav()?;
    let path = store.persist(&container).await?;
    let result = sink.play(&path, cancel).await;
    store.release(&path).await;
    result
}
