//! Runtime events emitted by pipeline components.
//!
//! Events are notifications, not errors: the component keeps running after
//! emitting one. Each component has its own closed set of payloads, delivered
//! synchronously through an [`EventCallback`].

use std::sync::Arc;
use std::time::Duration;

use crate::error::RecordingErrorCode;
use crate::frame::AudioFormat;
use crate::monitor::RecordingHealthStatus;
use crate::recording::RecordingStatus;
use crate::source::AudioSource;

/// Events from the [`CaptureBuffer`](crate::CaptureBuffer).
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A frame was accepted into the buffer.
    FrameArrived {
        /// Leg and direction of the frame.
        source: AudioSource,
        /// Payload size in bytes.
        len: usize,
        /// Transport sequence number, if any.
        sequence_number: Option<u32>,
    },

    /// The buffer exceeded its capacity and evicted its oldest frames.
    BufferOverflow {
        /// Number of frames dropped.
        removed_count: usize,
        /// Frames left in the buffer after eviction.
        buffered: usize,
    },
}

/// Events from the [`AudioBridge`](crate::AudioBridge).
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Audio passed through the bridge (for meters and passive observers).
    AudioReceived {
        /// Leg and direction.
        source: AudioSource,
        /// Payload size in bytes.
        bytes: usize,
        /// Payload format.
        format: AudioFormat,
    },
}

/// Events from the [`RecordingManager`](crate::RecordingManager).
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// The recording state changed. Carries the new status snapshot.
    StatusChanged(RecordingStatus),

    /// Periodic progress while recording.
    ProgressUpdated {
        /// Elapsed recording time.
        duration: Duration,
        /// Bytes handed to the encoder so far.
        bytes_recorded: u64,
        /// RMS level of recently written audio, 0.0..=1.0.
        audio_level: f32,
    },

    /// A failure moved the recording into the error state.
    ErrorOccurred {
        /// Failure category.
        code: RecordingErrorCode,
        /// Human-readable description.
        message: String,
    },
}

/// Events from the [`DataFlowMonitor`](crate::DataFlowMonitor).
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Quality or the issue list changed on the last health tick.
    HealthStatusChanged(RecordingHealthStatus),

    /// No audio has arrived for longer than the configured timeout.
    ///
    /// Emitted once per interruption; flow resuming re-arms it.
    DataFlowInterrupted {
        /// Time since the last received audio.
        silent_for: Duration,
    },
}

/// Callback type for receiving events of type `E`.
///
/// # Example
///
/// ```
/// use call_audio::{event_callback, CaptureEvent};
///
/// let callback = event_callback(|event: CaptureEvent| {
///     tracing::debug!(?event, "capture event");
/// });
/// ```
pub type EventCallback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
pub fn event_callback<E, F>(f: F) -> EventCallback<E>
where
    F: Fn(E) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invokes an optional callback.
pub(crate) fn emit<E>(callback: Option<&EventCallback<E>>, event: E) {
    if let Some(callback) = callback {
        callback(event);
    }
}
