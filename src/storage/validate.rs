//! Inspection and repair of finished recordings.
//!
//! A crash or a failed finalize can leave a file that is empty, holds only a
//! header, or has a header whose sizes were never patched. The first two can
//! be rebuilt from frames that were still buffered; the last only needs its
//! header rewritten.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::encoder::{wav_header, WavHeader, WAV_HEADER_SIZE};
use crate::error::StorageError;
use crate::format::convert_format;
use crate::frame::{AudioFormat, AudioFrame};

/// Outcome of [`validate_recording`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingValidation {
    /// No file at the path.
    Missing,
    /// Zero-byte file.
    Empty,
    /// Shorter than a WAV header, or not a WAV file at all.
    Invalid,
    /// A valid header and no audio.
    HeaderOnly,
    /// The header does not match the audio that follows it.
    SizeMismatch {
        /// Data size the header declares.
        declared: u32,
        /// Audio bytes actually present.
        actual: u64,
    },
    /// A consistent file.
    Valid {
        /// Audio bytes.
        data_size: u32,
        /// Declared layout.
        format: AudioFormat,
    },
}

impl RecordingValidation {
    /// Returns `true` for [`RecordingValidation::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns `true` if [`recover_recording`] can do something useful.
    pub fn is_recoverable(&self) -> bool {
        !self.is_valid()
    }
}

/// Checks a WAV recording on disk.
pub fn validate_recording(path: &Path) -> Result<RecordingValidation, StorageError> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RecordingValidation::Missing);
        }
        Err(e) => return Err(StorageError::io(path, e)),
    };
    let len = file
        .metadata()
        .map_err(|e| StorageError::io(path, e))?
        .len();

    if len == 0 {
        return Ok(RecordingValidation::Empty);
    }
    if len < WAV_HEADER_SIZE as u64 {
        return Ok(RecordingValidation::Invalid);
    }

    let mut bytes = [0u8; WAV_HEADER_SIZE];
    file.read_exact(&mut bytes)
        .map_err(|e| StorageError::io(path, e))?;
    let Some(header) = WavHeader::parse(&bytes) else {
        return Ok(RecordingValidation::Invalid);
    };

    let actual = len - WAV_HEADER_SIZE as u64;
    Ok(if actual == 0 && header.data_size == 0 {
        RecordingValidation::HeaderOnly
    } else if u64::from(header.data_size) != actual {
        RecordingValidation::SizeMismatch {
            declared: header.data_size,
            actual,
        }
    } else {
        RecordingValidation::Valid {
            data_size: header.data_size,
            format: header.format,
        }
    })
}

/// Repairs a recording so it validates.
///
/// - A size mismatch is fixed by rewriting the header from the file length.
/// - A missing, empty, header-only or invalid file is rebuilt from `frames`,
///   converted to `format`. Without frames it stays as it is.
///
/// Returns the validation result after the attempt.
pub fn recover_recording(
    path: &Path,
    format: &AudioFormat,
    frames: &[AudioFrame],
) -> Result<RecordingValidation, StorageError> {
    match validate_recording(path)? {
        valid @ RecordingValidation::Valid { .. } => Ok(valid),
        RecordingValidation::SizeMismatch { actual, .. } => {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| StorageError::io(path, e))?;
            let mut bytes = [0u8; WAV_HEADER_SIZE];
            file.read_exact(&mut bytes)
                .map_err(|e| StorageError::io(path, e))?;
            let declared_format = WavHeader::parse(&bytes).map_or(*format, |h| h.format);

            let data_size = u32::try_from(actual).unwrap_or(u32::MAX);
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&wav_header(&declared_format, data_size)))
                .and_then(|()| file.sync_all())
                .map_err(|e| StorageError::io(path, e))?;
            tracing::info!(path = %path.display(), data_size, "recording header repaired");
            validate_recording(path)
        }
        broken => {
            let data: Vec<u8> = frames
                .iter()
                .cloned()
                .filter_map(|frame| convert_format(frame, format))
                .flat_map(AudioFrame::into_data)
                .collect();
            if data.is_empty() {
                tracing::warn!(path = %path.display(), ?broken, "nothing to recover recording from");
                return Ok(broken);
            }

            let data_size = u32::try_from(data.len()).unwrap_or(u32::MAX);
            let mut contents = Vec::with_capacity(WAV_HEADER_SIZE + data.len());
            contents.extend_from_slice(&wav_header(format, data_size));
            contents.extend_from_slice(&data);
            std::fs::write(path, contents).map_err(|e| StorageError::io(path, e))?;
            tracing::info!(path = %path.display(), data_size, "recording rebuilt from buffered frames");
            validate_recording(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AudioSource;
    use tempfile::tempdir;

    fn pcm_frame(data: Vec<u8>) -> AudioFrame {
        AudioFrame::new(data, AudioFormat::pcm16(8000, 1), AudioSource::Mixed).unwrap()
    }

    #[test]
    fn test_validate_states() {
        let dir = tempdir().unwrap();
        let format = AudioFormat::pcm16(8000, 1);

        let missing = dir.path().join("missing.wav");
        assert_eq!(validate_recording(&missing).unwrap(), RecordingValidation::Missing);

        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(validate_recording(&empty).unwrap(), RecordingValidation::Empty);

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"hello").unwrap();
        assert_eq!(validate_recording(&garbage).unwrap(), RecordingValidation::Invalid);

        let header_only = dir.path().join("header.wav");
        std::fs::write(&header_only, wav_header(&format, 0)).unwrap();
        assert_eq!(
            validate_recording(&header_only).unwrap(),
            RecordingValidation::HeaderOnly
        );

        let valid = dir.path().join("valid.wav");
        let mut bytes = wav_header(&format, 4).to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        std::fs::write(&valid, bytes).unwrap();
        assert_eq!(
            validate_recording(&valid).unwrap(),
            RecordingValidation::Valid {
                data_size: 4,
                format
            }
        );
    }

    #[test]
    fn test_recover_unpatched_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unfinalized.wav");
        let format = AudioFormat::pcm16(8000, 1);
        let mut bytes = wav_header(&format, 0).to_vec();
        bytes.extend_from_slice(&[0; 10]);
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(
            validate_recording(&path).unwrap(),
            RecordingValidation::SizeMismatch {
                declared: 0,
                actual: 10
            }
        );
        let result = recover_recording(&path, &format, &[]).unwrap();
        assert_eq!(
            result,
            RecordingValidation::Valid {
                data_size: 10,
                format
            }
        );
    }

    #[test]
    fn test_recover_empty_from_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();
        let format = AudioFormat::pcm16(8000, 1);

        let frames = vec![pcm_frame(vec![1, 2]), pcm_frame(vec![3, 4])];
        let result = recover_recording(&path, &format, &frames).unwrap();
        assert!(result.is_valid());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[WAV_HEADER_SIZE..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_recover_converts_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.wav");
        let frame = AudioFrame::new(vec![0xFF; 8], AudioFormat::ulaw_8k(), AudioSource::TelephonyIn)
            .unwrap();

        let format = AudioFormat::pcm16(8000, 1);
        let result = recover_recording(&path, &format, &[frame]).unwrap();
        assert_eq!(
            result,
            RecordingValidation::Valid {
                data_size: 16,
                format
            }
        );
    }

    #[test]
    fn test_recover_without_frames_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();

        let result = recover_recording(&path, &AudioFormat::pcm16(8000, 1), &[]).unwrap();
        assert_eq!(result, RecordingValidation::Empty);
        assert!(result.is_recoverable());
    }
}
