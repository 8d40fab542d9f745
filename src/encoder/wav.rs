//! RIFF/WAVE encoder.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::encoder::AudioEncoder;
use crate::error::EncoderError;
use crate::frame::{AudioFormat, AudioFrame, SampleEncoding};
use crate::source::AudioSource;

// WAV file format constants
// See: http://soundfile.sapp.org/doc/WaveFormat/

/// Byte offset of the file size field in WAV header (RIFF chunk size).
const WAV_FILE_SIZE_OFFSET: u64 = 4;

/// Byte offset of the data chunk size field in WAV header.
const WAV_DATA_SIZE_OFFSET: u64 = 40;

/// Size of the WAV header in bytes (RIFF + fmt + data chunk headers).
pub(crate) const WAV_HEADER_SIZE: usize = 44;

/// Size of the fmt chunk data.
const WAV_FMT_CHUNK_SIZE: u32 = 16;

const WAV_FORMAT_PCM: u16 = 1;
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;
const WAV_FORMAT_ALAW: u16 = 6;
const WAV_FORMAT_ULAW: u16 = 7;

fn format_code(encoding: SampleEncoding) -> u16 {
    match encoding {
        SampleEncoding::Pcm => WAV_FORMAT_PCM,
        SampleEncoding::Float => WAV_FORMAT_IEEE_FLOAT,
        SampleEncoding::Alaw => WAV_FORMAT_ALAW,
        SampleEncoding::Ulaw => WAV_FORMAT_ULAW,
    }
}

fn encoding_for(code: u16) -> Option<SampleEncoding> {
    match code {
        WAV_FORMAT_PCM => Some(SampleEncoding::Pcm),
        WAV_FORMAT_IEEE_FLOAT => Some(SampleEncoding::Float),
        WAV_FORMAT_ALAW => Some(SampleEncoding::Alaw),
        WAV_FORMAT_ULAW => Some(SampleEncoding::Ulaw),
        _ => None,
    }
}

/// Builds a 44-byte canonical WAV header.
pub(crate) fn wav_header(format: &AudioFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];
    let file_size = (WAV_HEADER_SIZE as u32 - 8).saturating_add(data_size);

    // RIFF container header
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&file_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt subchunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&WAV_FMT_CHUNK_SIZE.to_le_bytes());
    header[20..22].copy_from_slice(&format_code(format.encoding()).to_le_bytes());
    header[22..24].copy_from_slice(&u16::from(format.channels()).to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate().to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&u16::from(format.bits_per_sample()).to_le_bytes());

    // data subchunk header
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Fields of a canonical WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Sample layout declared by the fmt chunk.
    pub format: AudioFormat,
    /// RIFF chunk size (file size minus 8).
    pub riff_size: u32,
    /// Declared data chunk size.
    pub data_size: u32,
}

impl WavHeader {
    /// Parses the first 44 bytes of a file.
    ///
    /// Returns `None` if the bytes are not a canonical header in a supported
    /// format.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < WAV_HEADER_SIZE
            || &bytes[0..4] != b"RIFF"
            || &bytes[8..12] != b"WAVE"
            || &bytes[12..16] != b"fmt "
            || &bytes[36..40] != b"data"
        {
            return None;
        }
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let encoding = encoding_for(u16_at(20))?;
        let channels = u8::try_from(u16_at(22)).ok()?;
        let bits = u8::try_from(u16_at(34)).ok()?;
        let format = AudioFormat::new(u32_at(24), channels, bits, encoding).ok()?;

        Some(Self {
            format,
            riff_size: u32_at(4),
            data_size: u32_at(40),
        })
    }
}

/// An encoder that writes frames to a WAV file.
///
/// `initialize` creates the file and writes a placeholder header; `finalize`
/// patches the sizes. PCM, IEEE float, A-law and µ-law are supported. All
/// file I/O is performed in a blocking thread pool to avoid blocking the
/// async runtime.
///
/// The encoder can be reused: initializing again starts a new file.
///
/// # Example
///
/// ```no_run
/// use call_audio::{AudioEncoder, AudioFormat, WavEncoder};
/// use std::path::Path;
///
/// # async fn run() -> Result<(), call_audio::EncoderError> {
/// let encoder = WavEncoder::new();
/// encoder.initialize(AudioFormat::ulaw_8k(), Path::new("call.wav")).await?;
/// // write frames...
/// encoder.finalize().await?;
/// # Ok(())
/// # }
/// ```
pub struct WavEncoder {
    state: Arc<Mutex<WavState>>,
}

#[derive(Default)]
struct WavState {
    file: Option<File>,
    path: PathBuf,
    format: Option<AudioFormat>,
    /// Data bytes known to be on disk after the header.
    bytes_written: u64,
    /// Last frame written by a call whose caller stopped waiting.
    unacknowledged: Option<FrameKey>,
}

/// Identifies a frame across a retried write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameKey {
    timestamp: Instant,
    sequence_number: Option<u32>,
    source: AudioSource,
    len: usize,
}

impl FrameKey {
    fn of(frame: &AudioFrame) -> Self {
        Self {
            timestamp: frame.timestamp(),
            sequence_number: frame.sequence_number(),
            source: frame.source(),
            len: frame.len(),
        }
    }
}

impl WavEncoder {
    /// Creates an encoder with no open file.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WavState::default())),
        }
    }

    /// Data bytes written to the current file.
    pub async fn bytes_written(&self) -> u64 {
        self.state.lock().await.bytes_written
    }

    fn create_blocking(
        state: &mut WavState,
        format: AudioFormat,
        path: PathBuf,
    ) -> Result<(), EncoderError> {
        // An unfinished previous file is abandoned as-is.
        state.file = None;
        state.unacknowledged = None;

        let mut file = File::create(&path).map_err(|e| EncoderError::file_error(&path, e))?;

        // Placeholder header, patched on finalize
        file.write_all(&wav_header(&format, 0))
            .map_err(|e| EncoderError::file_error(&path, e))?;

        state.file = Some(file);
        state.path = path;
        state.format = Some(format);
        state.bytes_written = 0;
        Ok(())
    }

    /// Appends `data` at the committed end of the data chunk.
    ///
    /// A failed write is cut back to the committed length, so a retry
    /// starts from the same place.
    fn write_blocking(state: &mut WavState, data: &[u8], key: FrameKey) -> Result<(), EncoderError> {
        let WavState {
            file,
            path,
            bytes_written,
            unacknowledged,
            ..
        } = state;
        let file = file.as_mut().ok_or(EncoderError::NotInitialized)?;
        let committed = WAV_HEADER_SIZE as u64 + *bytes_written;

        let result = file
            .seek(SeekFrom::Start(committed))
            .and_then(|_| file.write_all(data));
        if let Err(e) = result {
            if let Err(truncate) = file.set_len(committed) {
                tracing::warn!(path = %path.display(), error = %truncate, "wav rollback failed");
            }
            return Err(EncoderError::file_error(path.as_path(), e));
        }

        *bytes_written += data.len() as u64;
        *unacknowledged = Some(key);
        Ok(())
    }

    /// Seeks back to update the file size and data size fields.
    fn update_header(file: &mut File, data_size: u32) -> std::io::Result<()> {
        let file_size = (WAV_HEADER_SIZE as u32 - 8).saturating_add(data_size);
        file.seek(SeekFrom::Start(WAV_FILE_SIZE_OFFSET))?;
        file.write_all(&file_size.to_le_bytes())?;

        file.seek(SeekFrom::Start(WAV_DATA_SIZE_OFFSET))?;
        file.write_all(&data_size.to_le_bytes())?;
        Ok(())
    }

    fn finalize_blocking(state: &mut WavState) -> Result<(), EncoderError> {
        let Some(mut file) = state.file.take() else {
            return Err(EncoderError::NotInitialized);
        };
        state.unacknowledged = None;
        let data_size = u32::try_from(state.bytes_written).unwrap_or(u32::MAX);
        let path = state.path.as_path();

        Self::update_header(&mut file, data_size).map_err(|e| EncoderError::file_error(path, e))?;
        file.sync_all()
            .map_err(|e| EncoderError::file_error(path, e))?;

        tracing::debug!(path = %path.display(), data_size, "wav finalized");
        Ok(())
    }
}

impl Default for WavEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioEncoder for WavEncoder {
    fn name(&self) -> &str {
        "wav"
    }

    async fn initialize(&self, format: AudioFormat, path: &Path) -> Result<(), EncoderError> {
        let state = Arc::clone(&self.state);
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::create_blocking(&mut state, format, path)
        })
        .await
        .map_err(|e| EncoderError::custom(format!("initialize task panicked: {e}")))?
    }

    /// Writes one frame.
    ///
    /// If an earlier call for this same frame was abandoned (for example on
    /// a timeout) but its write completed, the frame is already on disk and
    /// is not written again.
    async fn write_frame(&self, frame: &AudioFrame) -> Result<(), EncoderError> {
        let key = FrameKey::of(frame);

        // Held until the blocking write is done; waits for any earlier one.
        let mut state = Arc::clone(&self.state).lock_owned().await;
        match state.format {
            None => return Err(EncoderError::NotInitialized),
            Some(format) if !format.is_compatible(frame.format()) => {
                return Err(EncoderError::UnsupportedFormat {
                    format: frame.format().to_string(),
                });
            }
            Some(_) => {}
        }
        if state.unacknowledged.take() == Some(key) {
            tracing::debug!(bytes = frame.len(), "wav write already committed");
            return Ok(());
        }

        tracing::trace!(bytes = frame.len(), source = %frame.source(), "wav write");

        let data = frame.data().to_vec();
        tokio::task::spawn_blocking(move || Self::write_blocking(&mut state, &data, key))
            .await
            .map_err(|e| EncoderError::custom(format!("write task panicked: {e}")))??;

        let mut state = self.state.lock().await;
        if state.unacknowledged == Some(key) {
            state.unacknowledged = None;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), EncoderError> {
        let state = Arc::clone(&self.state);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            let WavState { file, path, .. } = &mut *state;
            if let Some(file) = file {
                file.sync_data()
                    .map_err(|e| EncoderError::file_error(path.as_path(), e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| EncoderError::custom(format!("flush task panicked: {e}")))?
    }

    async fn finalize(&self) -> Result<(), EncoderError> {
        let state = Arc::clone(&self.state);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::finalize_blocking(&mut state)
        })
        .await
        .map_err(|e| EncoderError::custom(format!("finalize task panicked: {e}")))?
    }
}
