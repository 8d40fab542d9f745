//! Tokio mpsc channel encoder.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::encoder::AudioEncoder;
use crate::error::EncoderError;
use crate::frame::{AudioFormat, AudioFrame};

/// An encoder that sends recorded frames to a tokio mpsc channel.
///
/// Useful for live consumers of the recording stream (transcription, meters)
/// and for tests. The output path passed to `initialize` is ignored.
/// `finalize` drops the sender so the receiver sees the end of the stream.
///
/// # Example
///
/// ```
/// use call_audio::{AudioFrame, ChannelEncoder};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AudioFrame>(100);
/// let encoder = ChannelEncoder::new(tx);
///
/// // Hand the encoder to a RecordingManager...
/// // Then receive frames:
/// // while let Some(frame) = rx.recv().await { ... }
/// ```
pub struct ChannelEncoder {
    name: String,
    sender: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    format: Mutex<Option<AudioFormat>>,
}

impl ChannelEncoder {
    /// Creates a new channel encoder with the given sender.
    ///
    /// The sender should have sufficient buffer capacity for your use case;
    /// a full channel makes writes wait, which the recorder bounds with its
    /// encoder timeout.
    pub fn new(sender: mpsc::Sender<AudioFrame>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel encoder with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            name: name.into(),
            sender: Mutex::new(Some(sender)),
            format: Mutex::new(None),
        }
    }

    /// Format passed to the last `initialize`.
    pub fn format(&self) -> Option<AudioFormat> {
        *self.format.lock()
    }
}

#[async_trait]
impl AudioEncoder for ChannelEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, format: AudioFormat, _path: &Path) -> Result<(), EncoderError> {
        if self.sender.lock().is_none() {
            return Err(EncoderError::ChannelClosed);
        }
        *self.format.lock() = Some(format);
        Ok(())
    }

    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), EncoderError> {
        if self.format.lock().is_none() {
            return Err(EncoderError::NotInitialized);
        }
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(EncoderError::ChannelClosed)?;
        sender
            .send(frame.clone())
            .await
            .map_err(|_| EncoderError::ChannelClosed)
    }

    async fn finalize(&self) -> Result<(), EncoderError> {
        self.sender.lock().take();
        self.format.lock().take();
        Ok(())
    }
}
