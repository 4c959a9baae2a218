use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_EXT: &str = "wav";

/// Holds playback segments as transient files on disk.
///
/// Every segment is written before playback and normally deleted right
/// after it finishes. A periodic sweep catches files orphaned by crashes
/// or interrupted playback, keeping only the most recent few.
pub struct SegmentStore {
    dir: PathBuf,
    keep_recent: usize,
    counter: AtomicU64,
}

impl SegmentStore {
    pub async fn create(dir: PathBuf, keep_recent: usize) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(format!("cannot create segment dir {}: {}", dir.display(), e))
        })?;
        info!("Segment store at {}", dir.display());
        Ok(Self {
            dir,
            keep_recent,
            counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one container to a fresh file. Names carry a zero-padded
    /// counter so lexicographic order is creation order.
    pub async fn persist(&self, container: &[u8]) -> Result<PathBuf> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{}{:08}.{}", SEGMENT_PREFIX, seq, SEGMENT_EXT));

        tokio::fs::write(&path, container).await.map_err(|e| {
            Error::Storage(format!("cannot write segment {}: {}", path.display(), e))
        })?;

        debug!("Persisted segment {} ({} bytes)", path.display(), container.len());
        Ok(path)
    }

    /// Delete a segment file once playback is done with it. Failure is
    /// logged, not surfaced; the sweep will catch the file later.
    pub async fn release(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to release segment {}: {}", path.display(), e);
        }
    }

    /// Delete every segment file beyond the most recent `keep_recent`.
    /// Returns how many files were removed.
    pub async fn sweep(&self) -> Result<usize> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            Error::Storage(format!("cannot list segment dir {}: {}", self.dir.display(), e))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("cannot read segment dir entry: {}", e)))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(SEGMENT_PREFIX) && name.ends_with(SEGMENT_EXT) {
                names.push(name.to_string());
            }
        }

        // Newest first; the counter in the name is creation order.
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for name in names.iter().skip(self.keep_recent) {
            let path = self.dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Sweep could not remove {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            debug!("Swept {} stale segment files", removed);
        }
        Ok(removed)
    }
}

/// Run `sweep` forever at a fixed interval. The caller owns the handle and
/// aborts it at teardown.
pub fn spawn_sweeper(store: Arc<SegmentStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh session
        // does not sweep an empty directory.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = store.sweep().await {
                warn!("Segment sweep failed: {}", e);
            }
        }
    })
}
