//! Recording lifecycle state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordingErrorCode;

/// Where a recording is in its lifecycle.
///
/// ```text
/// Idle → Recording ⇄ Paused → Completed | Cancelled | Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordingState {
    /// Nothing has been recorded yet.
    #[default]
    Idle,
    /// Frames are being written.
    Recording,
    /// Frames are accepted and discarded.
    Paused,
    /// The last recording was stopped and finalized.
    Completed,
    /// The last recording was abandoned and deleted.
    Cancelled,
    /// The last operation failed; see the error fields.
    Error,
}

impl RecordingState {
    /// Returns `true` while a recording session is open.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Snapshot of the recording manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingStatus {
    /// Lifecycle state.
    pub state: RecordingState,
    /// Id of the current or last recording.
    pub recording_id: Option<String>,
    /// When the current or last recording started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the last recording ended.
    pub end_time: Option<DateTime<Utc>>,
    /// Recorded time, excluding pauses.
    pub duration: Duration,
    /// Output file of the current or last recording.
    pub current_file_path: Option<PathBuf>,
    /// Audio bytes handed to the encoder.
    pub bytes_recorded: u64,
    /// RMS level of the last written audio, 0.0..=1.0.
    pub audio_level: f32,
    /// Failure category when `state` is `Error`.
    pub error_code: Option<RecordingErrorCode>,
    /// Failure description when `state` is `Error`.
    pub error_message: Option<String>,
}

impl RecordingStatus {
    /// State is `Recording`.
    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// State is `Paused`.
    pub fn is_paused(&self) -> bool {
        self.state == RecordingState::Paused
    }

    /// State is `Completed`.
    pub fn is_completed(&self) -> bool {
        self.state == RecordingState::Completed
    }

    /// State is `Error`.
    pub fn has_error(&self) -> bool {
        self.state == RecordingState::Error
    }

    /// A new recording may be started.
    pub fn can_start(&self) -> bool {
        !self.state.is_active()
    }

    /// The current recording may be stopped or cancelled.
    pub fn can_stop(&self) -> bool {
        self.state.is_active()
    }

    /// The current recording may be paused.
    pub fn can_pause(&self) -> bool {
        self.is_recording()
    }

    /// The current recording may be resumed.
    pub fn can_resume(&self) -> bool {
        self.is_paused()
    }
}

/// Recorded time that stands still while paused.
#[derive(Debug, Default)]
pub(crate) struct RecordingClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl RecordingClock {
    pub(crate) fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    pub(crate) fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub(crate) fn resume(&mut self) {
        self.running_since.get_or_insert_with(Instant::now);
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}
