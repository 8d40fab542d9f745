//! Sidecar metadata stored next to each recording.
//!
//! For `call.wav` the sidecar is `call.metadata.json`: a pretty-printed JSON
//! document that can be read without touching the audio.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{RecordingCodec, RecordingQuality};
use crate::error::StorageError;

const SIDECAR_SUFFIX: &str = "metadata.json";

/// Description of one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Recording id.
    pub id: String,
    /// Audio file name (no directory).
    pub file_name: String,
    /// Calling party.
    pub caller: Option<String>,
    /// Called party.
    pub callee: Option<String>,
    /// Signaling call id.
    pub call_id: Option<String>,
    /// When recording started.
    pub start_time: DateTime<Utc>,
    /// When recording ended. `None` while in progress.
    pub end_time: Option<DateTime<Utc>>,
    /// Recorded length in milliseconds.
    pub duration_ms: u64,
    /// Output codec.
    pub codec: RecordingCodec,
    /// Output sample rate.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u8,
    /// Quality preset.
    pub quality: RecordingQuality,
    /// Audio bytes written (excluding container header).
    pub bytes_recorded: u64,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Path of the sidecar for `audio_path`.
pub fn metadata_path(audio_path: &Path) -> PathBuf {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    audio_path.with_file_name(format!("{stem}.{SIDECAR_SUFFIX}"))
}

/// Writes the sidecar for `audio_path`, replacing any existing one.
pub fn write_metadata(audio_path: &Path, metadata: &RecordingMetadata) -> Result<PathBuf, StorageError> {
    let path = metadata_path(audio_path);
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&path, json).map_err(|e| StorageError::io(&path, e))?;
    tracing::trace!(path = %path.display(), "metadata written");
    Ok(path)
}

/// Reads the sidecar for `audio_path`.
pub fn read_metadata(audio_path: &Path) -> Result<RecordingMetadata, StorageError> {
    let path = metadata_path(audio_path);
    let json = std::fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(file_name: &str) -> RecordingMetadata {
        RecordingMetadata {
            id: "rec-1".to_string(),
            file_name: file_name.to_string(),
            caller: Some("+15550100".to_string()),
            callee: Some("+15550199".to_string()),
            call_id: None,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
            codec: RecordingCodec::Ulaw,
            sample_rate: 8000,
            channels: 1,
            quality: RecordingQuality::Low,
            bytes_recorded: 0,
            tags: vec!["support".to_string()],
        }
    }

    #[test]
    fn test_metadata_path() {
        assert_eq!(
            metadata_path(Path::new("/rec/call_001.wav")),
            PathBuf::from("/rec/call_001.metadata.json")
        );
    }

    #[test]
    fn test_sidecar_is_human_readable_json() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("call.wav");
        let written = write_metadata(&audio, &sample("call.wav")).unwrap();

        let text = std::fs::read_to_string(&written).unwrap();
        assert!(text.contains("\"caller\": \"+15550100\""));
        assert!(text.contains("\"codec\": \"ulaw\""));

        let read = read_metadata(&audio).unwrap();
        assert_eq!(read, sample_with_time(&read));
    }

    fn sample_with_time(read: &RecordingMetadata) -> RecordingMetadata {
        RecordingMetadata {
            start_time: read.start_time,
            ..sample("call.wav")
        }
    }

    #[test]
    fn test_read_missing_sidecar() {
        let dir = tempdir().unwrap();
        let err = read_metadata(&dir.path().join("nothing.wav")).unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
