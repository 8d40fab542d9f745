//! Bounded capture queue fed by the network legs.
//!
//! Frames are pushed by whichever thread receives them and drained in bulk by
//! the recording tick. Pushing past capacity evicts the oldest frames and
//! reports the loss through [`CaptureEvent::BufferOverflow`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::error::CaptureError;
use crate::event::{emit, CaptureEvent, EventCallback};
use crate::frame::{AudioFormat, AudioFrame};
use crate::source::{AudioSource, MediaKind, NetworkAudioIntake};

/// Default capacity of the capture queue, in frames.
pub const DEFAULT_CAPTURE_BUFFER_SIZE: usize = 1000;

struct CaptureState {
    capturing: bool,
    disposed: bool,
    /// Formats for raw packets arriving through [`NetworkAudioIntake`].
    sources: HashMap<AudioSource, AudioFormat>,
    next_sequence: HashMap<AudioSource, u32>,
    ring: HeapRb<AudioFrame>,
    max_size: usize,
}

impl CaptureState {
    fn check(&self) -> Result<(), CaptureError> {
        if self.disposed {
            Err(CaptureError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Pops oldest frames until `room` more fit. Returns how many were dropped.
    fn make_room(&mut self, room: usize) -> usize {
        let mut removed = 0;
        while self.ring.occupied_len() + room > self.max_size {
            if self.ring.try_pop().is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }
}

/// Point-in-time counters for a [`CaptureBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames currently queued.
    pub buffered: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Frames accepted since creation.
    pub frames_received: u64,
    /// Frames evicted by overflow since creation.
    pub frames_dropped: u64,
    /// Number of overflow episodes since creation.
    pub overflow_count: u64,
}

/// Bounded FIFO of captured frames.
///
/// The capture buffer starts out not capturing; frames offered before
/// [`start_capture`](Self::start_capture) are dropped silently. After
/// [`dispose`](Self::dispose) every call returns [`CaptureError::Disposed`].
///
/// # Example
///
/// ```
/// use call_audio::{AudioFormat, AudioFrame, AudioSource, CaptureBuffer};
///
/// let buffer = CaptureBuffer::new(100);
/// buffer.start_capture([(AudioSource::TelephonyIn, AudioFormat::ulaw_8k())]).unwrap();
///
/// let frame = AudioFrame::new(vec![0xFF; 160], AudioFormat::ulaw_8k(), AudioSource::TelephonyIn).unwrap();
/// buffer.push_frame(frame).unwrap();
///
/// let frames = buffer.get_buffered_frames(None).unwrap();
/// assert_eq!(frames.len(), 1);
/// ```
pub struct CaptureBuffer {
    state: Mutex<CaptureState>,
    on_event: Option<EventCallback<CaptureEvent>>,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    overflow_count: AtomicU64,
}

impl CaptureBuffer {
    /// Creates a buffer holding at most `max_size` frames (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            state: Mutex::new(CaptureState {
                capturing: false,
                disposed: false,
                sources: HashMap::new(),
                next_sequence: HashMap::new(),
                ring: HeapRb::new(max_size),
                max_size,
            }),
            on_event: None,
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Sets the callback for arrival and overflow events.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback<CaptureEvent>) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Starts capturing from the given sources.
    ///
    /// Each source is paired with the format of its raw packets. Calling this
    /// while already capturing changes nothing.
    pub fn start_capture(
        &self,
        sources: impl IntoIterator<Item = (AudioSource, AudioFormat)>,
    ) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.check()?;
        if state.capturing {
            tracing::trace!("capture already running");
            return Ok(());
        }
        state.sources = sources.into_iter().collect();
        state.next_sequence.clear();
        state.capturing = true;
        tracing::debug!(sources = state.sources.len(), "capture started");
        Ok(())
    }

    /// Stops capturing. Buffered frames stay until drained or cleared.
    pub fn stop_capture(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.check()?;
        if state.capturing {
            state.capturing = false;
            tracing::debug!(buffered = state.ring.occupied_len(), "capture stopped");
        }
        Ok(())
    }

    /// Returns `true` while capturing.
    pub fn is_capturing(&self) -> bool {
        self.state.lock().capturing
    }

    /// Enqueues a frame.
    ///
    /// Returns `Ok(false)` if the buffer is not capturing and the frame was
    /// dropped.
    pub fn push_frame(&self, frame: AudioFrame) -> Result<bool, CaptureError> {
        let source = frame.source();
        let len = frame.len();
        let sequence_number = frame.sequence_number();

        let (removed, buffered) = {
            let mut state = self.state.lock();
            state.check()?;
            if !state.capturing {
                return Ok(false);
            }
            let removed = state.make_room(1);
            // make_room guarantees space
            let _ = state.ring.try_push(frame);
            (removed, state.ring.occupied_len())
        };

        self.frames_received.fetch_add(1, Ordering::Relaxed);
        emit(
            self.on_event.as_ref(),
            CaptureEvent::FrameArrived {
                source,
                len,
                sequence_number,
            },
        );
        if removed > 0 {
            self.report_overflow(removed, buffered);
        }
        Ok(true)
    }

    fn report_overflow(&self, removed_count: usize, buffered: usize) {
        self.frames_dropped
            .fetch_add(removed_count as u64, Ordering::Relaxed);
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(removed_count, buffered, "capture buffer overflow");
        emit(
            self.on_event.as_ref(),
            CaptureEvent::BufferOverflow {
                removed_count,
                buffered,
            },
        );
    }

    /// Drains up to `max_count` frames (all if `None`), oldest first.
    pub fn get_buffered_frames(
        &self,
        max_count: Option<usize>,
    ) -> Result<Vec<AudioFrame>, CaptureError> {
        let mut state = self.state.lock();
        state.check()?;
        let count = max_count.map_or(state.ring.occupied_len(), |max| {
            max.min(state.ring.occupied_len())
        });
        Ok(state.ring.pop_iter().take(count).collect())
    }

    /// Number of frames currently queued.
    pub fn buffered_count(&self) -> usize {
        self.state.lock().ring.occupied_len()
    }

    /// Configured capacity.
    pub fn max_buffer_size(&self) -> usize {
        self.state.lock().max_size
    }

    /// Drops every queued frame without emitting events.
    pub fn clear_buffer(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.check()?;
        state.ring.clear();
        Ok(())
    }

    /// Changes the capacity, evicting the oldest frames if it shrinks.
    pub fn set_max_buffer_size(&self, max_size: usize) -> Result<(), CaptureError> {
        let max_size = max_size.max(1);
        let (removed, buffered) = {
            let mut state = self.state.lock();
            state.check()?;
            state.max_size = max_size;
            let removed = state.make_room(0);

            let mut ring = HeapRb::new(max_size);
            for frame in state.ring.pop_iter() {
                let _ = ring.try_push(frame);
            }
            state.ring = ring;
            (removed, state.ring.occupied_len())
        };

        if removed > 0 {
            self.report_overflow(removed, buffered);
        }
        Ok(())
    }

    /// Returns a snapshot of the buffer counters.
    pub fn stats(&self) -> CaptureStats {
        let (buffered, max_size) = {
            let state = self.state.lock();
            (state.ring.occupied_len(), state.max_size)
        };
        CaptureStats {
            buffered,
            max_size,
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
        }
    }

    /// Stops capturing and clears the buffer. Later calls fail.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.capturing = false;
        state.ring.clear();
        state.sources.clear();
        state.disposed = true;
        tracing::debug!("capture buffer disposed");
    }

    /// Returns `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl NetworkAudioIntake for CaptureBuffer {
    fn on_network_audio(
        &self,
        remote: SocketAddr,
        kind: MediaKind,
        payload: &[u8],
        source: AudioSource,
    ) -> bool {
        if kind != MediaKind::Audio || payload.is_empty() {
            return false;
        }

        let (format, sequence) = {
            let mut state = self.state.lock();
            if state.disposed || !state.capturing {
                return false;
            }
            let Some(&format) = state.sources.get(&source) else {
                tracing::trace!(%remote, %source, "packet from unconfigured source");
                return false;
            };
            let next = state.next_sequence.entry(source).or_insert(0);
            let sequence = *next;
            *next = next.wrapping_add(1);
            (format, sequence)
        };

        let Ok(frame) = AudioFrame::new(payload.to_vec(), format, source) else {
            return false;
        };
        matches!(self.push_frame(frame.with_sequence(sequence)), Ok(true))
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_BUFFER_SIZE)
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
