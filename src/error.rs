//! Error types for call-audio.
//!
//! Errors are split by who can act on them:
//! - **Fatal recording errors** ([`RecordingError`]): the requested lifecycle
//!   operation did not happen. Each maps to a [`RecordingErrorCode`].
//! - **Encoder errors** ([`EncoderError`]): a single write failed. These are
//!   retried and surfaced through the data-flow monitor before they become fatal.
//! - **Storage errors** ([`StorageError`]): file manager failures.
//! - **Recoverable events**: overflow, interruptions and health changes are
//!   reported via event callbacks, not errors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::recording::RecordingState;

/// Category of a recording failure, stored in the recording status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingErrorCode {
    /// Invalid [`RecordingOptions`](crate::RecordingOptions), caught before any I/O.
    ConfigurationError,
    /// Encoder initialize, write or finalize failed.
    EncodingFailed,
    /// Directory/file creation, free space or permission failure.
    StorageError,
    /// Anything uncategorized.
    Unknown,
}

/// Errors returned by [`RecordingManager`](crate::RecordingManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    /// The manager was disposed; create a new one.
    #[error("recording manager has been disposed")]
    Disposed,

    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// State at the time of the call.
        state: RecordingState,
    },

    /// Recording options failed validation.
    #[error("invalid recording options: {}", violations.join("; "))]
    InvalidOptions {
        /// Every violated constraint, in field order.
        violations: Vec<String>,
    },

    /// The output file could not be prepared or closed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The encoder rejected initialize or finalize.
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncoderError),

    /// Another recording manager is registered with the bridge.
    #[error("bridge already has a registered recording manager")]
    BridgeBusy,
}

impl RecordingError {
    /// Maps this error to the status error code.
    pub fn code(&self) -> RecordingErrorCode {
        match self {
            Self::InvalidOptions { .. } => RecordingErrorCode::ConfigurationError,
            Self::Storage(_) => RecordingErrorCode::StorageError,
            Self::Encoding(_) => RecordingErrorCode::EncodingFailed,
            Self::Disposed | Self::InvalidState { .. } | Self::BridgeBusy => {
                RecordingErrorCode::Unknown
            }
        }
    }
}

/// Errors that can occur within an [`AudioEncoder`](crate::AudioEncoder).
///
/// Write errors are recoverable: the recording writer retries with backoff
/// and reports persistent failures to the monitor.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The encoder was used before `initialize`.
    #[error("encoder not initialized (call initialize first)")]
    NotInitialized,

    /// The format cannot be represented by this encoder.
    #[error("unsupported format: {format}")]
    UnsupportedFormat {
        /// Display form of the rejected format.
        format: String,
    },

    /// The operation did not complete in time.
    #[error("encoder operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Custom error for user-implemented encoders.
    #[error("{0}")]
    Custom(String),
}

impl EncoderError {
    /// Creates a custom encoder error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the [`FileManager`](crate::FileManager).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// File-system operation failed.
    #[error("storage error: {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Not enough free space in the output directory.
    #[error("insufficient disk space: {available} bytes available, {required} required")]
    InsufficientSpace {
        /// Bytes required.
        required: u64,
        /// Bytes available.
        available: u64,
    },

    /// The file name template cannot produce a usable name.
    #[error("invalid file name template: {reason}")]
    InvalidTemplate {
        /// Why the template was rejected.
        reason: String,
    },

    /// Sidecar metadata could not be (de)serialized.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid frame construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Frames must carry at least one byte.
    #[error("audio frame data is empty")]
    EmptyData,

    /// A zero field, or a bit depth the encoding cannot carry.
    #[error("invalid audio format: {sample_rate}Hz/{channels}ch/{bits_per_sample}bit")]
    InvalidFormat {
        /// Requested sample rate.
        sample_rate: u32,
        /// Requested channel count.
        channels: u8,
        /// Requested bit depth.
        bits_per_sample: u8,
    },
}

/// Errors from the [`CaptureBuffer`](crate::CaptureBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The buffer was disposed.
    #[error("capture buffer has been disposed")]
    Disposed,
}

/// Errors from the [`AudioBridge`](crate::AudioBridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The bridge was disposed.
    #[error("audio bridge has been disposed")]
    Disposed,

    /// A different recording target is already registered.
    #[error("a recording target is already registered")]
    AlreadyRegistered,
}
