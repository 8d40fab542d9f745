//! # call-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Capture, mixing, conversion and recording of telephony call audio.
//!
//! `call-audio` takes media frames from the two legs of a call (the telephony
//! leg and the realtime-media leg), optionally mixes both directions of a leg
//! into one stream, converts it to the recording format and writes it through
//! a pluggable encoder, while a monitor keeps track of data-flow health. A
//! separate pull-based playback ring feeds synthesized audio back into a call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use call_audio::{AudioBridge, AudioFormat, AudioSource, RecordingManager, RecordingOptions};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), call_audio::RecordingError> {
//! let bridge = Arc::new(AudioBridge::new());
//! bridge.start().expect("fresh bridge");
//!
//! let manager = RecordingManager::builder()
//!     .bridge(Arc::clone(&bridge))
//!     .on_event(|e| tracing::debug!(?e, "recording event"))
//!     .build()?;
//!
//! manager.start_recording(RecordingOptions::new("recordings")).await?;
//!
//! // Network legs forward every frame they see.
//! bridge.forward_audio_data(AudioSource::TelephonyIn, vec![0xFF; 160], AudioFormat::ulaw_8k());
//!
//! let path = manager.stop_recording().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Producers never wait on file I/O:
//!
//! - **Network threads**: push frames into the bridge or capture buffer and return
//! - **Capture Buffer**: bounded FIFO; overflow drops the oldest frames and is reported
//! - **Writer task**: drains on a tick, mixes and converts, writes with retry and timeout
//! - **Monitor task**: turns counters into a health snapshot once per tick

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod encoder;
mod error;
mod event;
pub mod format;
mod frame;
mod monitor;
mod pipeline;
mod recording;
mod source;
mod storage;

pub use config::{
    CallMetadata, ManagerConfig, MonitorConfig, PlaybackConfig, PlaybackProfile, RecordingCodec,
    RecordingOptions, RecordingQuality, RetentionPolicy,
};
pub use encoder::{AudioEncoder, ChannelEncoder, WavEncoder, WavHeader};
pub use error::{
    BridgeError, CaptureError, EncoderError, FrameError, RecordingError, RecordingErrorCode,
    StorageError,
};
pub use event::{
    event_callback, BridgeEvent, CaptureEvent, EventCallback, MonitorEvent, RecordingEvent,
};
pub use frame::{AudioFormat, AudioFrame, SampleEncoding};
pub use monitor::{
    BufferUsage, DataFlowMonitor, EncoderHealth, FileSystemHealth, HealthQuality,
    RecordingHealthStatus,
};
pub use pipeline::{
    mix_frames, rms_level, rms_level_pcm16, AudioBridge, BridgeStats, CaptureBuffer, CaptureStats,
    PlaybackRing, PlaybackState, RecordingTarget, SourceStats, DEFAULT_CAPTURE_BUFFER_SIZE,
};
pub use recording::{RecordingManager, RecordingManagerBuilder, RecordingState, RecordingStatus};
pub use source::{AudioSource, MediaKind, NetworkAudioIntake};
pub use storage::{
    make_unique_path, metadata_path, read_metadata, recover_recording, sanitize_filename,
    validate_recording, write_metadata, FileManager, FileNameGenerator, PreparedRecording,
    RecordingFile, RecordingMetadata, RecordingValidation, TemplateVariables,
};
