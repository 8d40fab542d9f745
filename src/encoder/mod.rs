//! Encoder trait and implementations for recording output.
//!
//! An [`AudioEncoder`] is the only place container or codec bytes are
//! produced. The crate provides two built-in encoders:
//!
//! - [`WavEncoder`]: Writes frames to a RIFF/WAVE file
//! - [`ChannelEncoder`]: Forwards frames to a tokio mpsc channel
//!
//! Implement the trait for other containers or for network upload.

mod channel;
mod wav;

pub use channel::ChannelEncoder;
pub use wav::{WavEncoder, WavHeader};

pub(crate) use wav::{wav_header, WAV_HEADER_SIZE};

use std::path::Path;

use async_trait::async_trait;

use crate::error::EncoderError;
use crate::frame::{AudioFormat, AudioFrame};

/// A streaming recording encoder.
///
/// The recording manager calls `initialize` once, then `write_frame` for
/// every converted frame, then `flush` and `finalize` on stop.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`) if needed
/// - Frames passed to `write_frame` are already in the initialized format
/// - `write_frame` errors are retried by the caller; keep it idempotent on failure
/// - `finalize` is the single point that closes the output
///
/// # Example
///
/// ```
/// use call_audio::{AudioEncoder, AudioFormat, AudioFrame, EncoderError};
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// struct NullEncoder;
///
/// #[async_trait]
/// impl AudioEncoder for NullEncoder {
///     fn name(&self) -> &str {
///         "null"
///     }
///
///     async fn initialize(&self, _format: AudioFormat, _path: &Path) -> Result<(), EncoderError> {
///         Ok(())
///     }
///
///     async fn write_frame(&self, _frame: &AudioFrame) -> Result<(), EncoderError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    /// Human-readable name for logging and health reports.
    fn name(&self) -> &str;

    /// Prepares the output at `path` for frames in `format`.
    ///
    /// Errors here are fatal: the recording does not start.
    async fn initialize(&self, format: AudioFormat, path: &Path) -> Result<(), EncoderError>;

    /// Writes one frame.
    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), EncoderError>;

    /// Pushes buffered bytes to the output.
    ///
    /// Default implementation does nothing.
    async fn flush(&self) -> Result<(), EncoderError> {
        Ok(())
    }

    /// Completes and closes the output.
    ///
    /// Default implementation does nothing.
    async fn finalize(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}
