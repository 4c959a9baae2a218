use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::audio::capture::CaptureFrame;

/// Bounded holding pen for capture frames produced before the session is
/// ready to transmit. When full, the oldest frame is evicted so the buffer
/// always holds the most recent audio.
#[derive(Debug)]
pub struct RecordingBuffer {
    frames: VecDeque<CaptureFrame>,
    capacity: usize,
    evicted: u64,
}

impl RecordingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Append a frame, returning the evicted oldest frame if the buffer
    /// was full.
    pub fn push(&mut self, frame: CaptureFrame) -> Option<CaptureFrame> {
        let dropped = if self.frames.len() == self.capacity {
            self.evicted += 1;
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        dropped
    }

    /// Take every buffered frame in arrival order.
    pub fn drain(&mut self) -> Vec<CaptureFrame> {
        self.frames.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames evicted over the buffer's lifetime.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

/// What the pipeline decided to do with one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Session is ready; send it now.
    Transmit(CaptureFrame),
    /// Session not ready yet; the frame is parked in the buffer.
    Buffered,
    /// Mute is engaged; the frame was discarded at the gate.
    DroppedMuted,
}

/// Gate between the capture source and the wire. Applies mute before
/// anything else, then either hands the frame over for transmission or
/// parks it until the session finishes its handshake.
#[derive(Debug)]
pub struct CapturePipeline {
    muted: Arc<AtomicBool>,
    buffer: RecordingBuffer,
    dropped_muted: u64,
}

impl CapturePipeline {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(false)),
            buffer: RecordingBuffer::new(buffer_capacity),
            dropped_muted: 0,
        }
    }

    /// Shared mute flag. Flipping it takes effect on the very next frame;
    /// a frame already on the wire is not recalled.
    pub fn mute_handle(&self) -> Arc<AtomicBool> {
        self.muted.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Route one frame. `session_ready` is true once the handshake ack has
    /// arrived and transmission is allowed.
    pub fn on_frame(&mut self, frame: CaptureFrame, session_ready: bool) -> FrameDisposition {
        if self.muted.load(Ordering::Relaxed) {
            self.dropped_muted += 1;
            trace!("Dropped muted frame {}", frame.sequence);
            return FrameDisposition::DroppedMuted;
        }

        if session_ready {
            FrameDisposition::Transmit(frame)
        } else {
            if let Some(evicted) = self.buffer.push(frame) {
                debug!(
                    "Recording buffer full, evicted frame {} awaiting handshake",
                    evicted.sequence
                );
            }
            FrameDisposition::Buffered
        }
    }

    /// Release everything buffered during the handshake, oldest first.
    pub fn drain(&mut self) -> Vec<CaptureFrame> {
        self.buffer.drain()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frames evicted from the buffer to make room for newer audio.
    pub fn evicted(&self) -> u64 {
        self.buffer.evicted()
    }

    pub fn dropped_muted(&self) -> u64 {
        self.dropped_muted
    }
}
