//! Recording files on disk: naming, sidecar metadata, retention and repair.

mod metadata;
mod naming;
mod validate;

pub use metadata::{metadata_path, read_metadata, write_metadata, RecordingMetadata};
pub use naming::{make_unique_path, sanitize_filename, FileNameGenerator, TemplateVariables};
pub use validate::{recover_recording, validate_recording, RecordingValidation};

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};

use crate::config::{RecordingOptions, RetentionPolicy};
use crate::error::StorageError;
use crate::frame::{AudioFormat, AudioFrame};

const WRITE_CHECK_NAME: &str = ".call-audio-write-check";

/// A recording found by [`FileManager::list_recordings`].
#[derive(Debug, Clone)]
pub struct RecordingFile {
    /// Audio file.
    pub path: PathBuf,
    /// Audio file size in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
    /// Sidecar contents, if a readable sidecar exists.
    pub metadata: Option<RecordingMetadata>,
}

/// Output path chosen for a new recording.
#[derive(Debug, Clone)]
pub struct PreparedRecording {
    /// Free path the audio will be written to.
    pub path: PathBuf,
    /// Variables the name was generated from. Kept so the name can be
    /// regenerated once `{duration}` is known.
    pub variables: TemplateVariables,
}

/// Creates, names, describes and cleans up recording files.
///
/// # Example
///
/// ```no_run
/// use call_audio::{FileManager, RetentionPolicy};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), call_audio::StorageError> {
/// let files = FileManager::new()?;
/// let policy = RetentionPolicy {
///     max_age: Some(Duration::from_secs(30 * 24 * 60 * 60)),
///     max_files: Some(500),
/// };
/// let removed = files.cleanup("recordings".as_ref(), &policy)?;
/// println!("removed {} recordings", removed.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileManager {
    naming: FileNameGenerator,
    min_free_space: u64,
}

impl FileManager {
    /// Creates a file manager with no free-space requirement.
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            naming: FileNameGenerator::new()?,
            min_free_space: 0,
        })
    }

    /// Refuses to prepare recordings when the output directory has less
    /// than `bytes` available.
    #[must_use]
    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    /// Configured free-space requirement.
    pub fn min_free_space(&self) -> u64 {
        self.min_free_space
    }

    /// Creates the output directory, checks free space and picks a unique
    /// file name from the options' template.
    ///
    /// The name is reserved by creating an empty file, which the encoder
    /// later opens. Release it with [`delete_recording`](Self::delete_recording)
    /// if the recording does not start.
    pub fn prepare_recording_path(
        &self,
        options: &RecordingOptions,
        id: &str,
        started_at: DateTime<Local>,
    ) -> Result<PreparedRecording, StorageError> {
        let dir = &options.output_directory;
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

        if self.min_free_space > 0 {
            let available = self.available_space(dir)?;
            if available < self.min_free_space {
                tracing::warn!(
                    dir = %dir.display(),
                    available,
                    required = self.min_free_space,
                    "not enough free space for recording"
                );
                return Err(StorageError::InsufficientSpace {
                    required: self.min_free_space,
                    available,
                });
            }
        }

        let variables = TemplateVariables::for_recording(options, id, started_at);
        let name = self.naming.generate(
            &options.file_name_template,
            &variables,
            options.codec.extension(),
        )?;
        let path = make_unique_path(&dir.join(name))?;
        tracing::debug!(path = %path.display(), "recording path prepared");
        Ok(PreparedRecording { path, variables })
    }

    /// Renames a finished recording once its duration is known.
    ///
    /// Only templates using `{duration}` are affected; otherwise `path` is
    /// returned unchanged. A missing file is left alone.
    pub fn finalize_file_name(
        &self,
        path: &Path,
        template: &str,
        variables: &mut TemplateVariables,
        duration: Duration,
    ) -> Result<PathBuf, StorageError> {
        if !self.naming.uses_duration(template) || !path.exists() {
            return Ok(path.to_path_buf());
        }

        variables.set_duration(duration);
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("wav");
        let name = self.naming.generate(template, variables, extension)?;
        let parent = path.parent().unwrap_or(Path::new("."));
        let target = parent.join(name);
        if target == path {
            return Ok(target);
        }

        // The reserved placeholder is replaced by the rename.
        let target = make_unique_path(&target)?;
        std::fs::rename(path, &target).map_err(|e| StorageError::io(path, e))?;
        tracing::debug!(from = %path.display(), to = %target.display(), "recording renamed");
        Ok(target)
    }

    /// Bytes available to unprivileged users in `dir`.
    pub fn available_space(&self, dir: &Path) -> Result<u64, StorageError> {
        fs2::available_space(dir).map_err(|e| StorageError::io(dir, e))
    }

    /// Returns `true` if a file can be created in `dir`.
    pub fn is_writable(&self, dir: &Path) -> bool {
        let marker = dir.join(WRITE_CHECK_NAME);
        let created = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&marker)
            .is_ok();
        if created {
            let _ = std::fs::remove_file(&marker);
        }
        created
    }

    /// Writes the sidecar for `audio_path`.
    pub fn write_metadata(
        &self,
        audio_path: &Path,
        metadata: &RecordingMetadata,
    ) -> Result<PathBuf, StorageError> {
        write_metadata(audio_path, metadata)
    }

    /// Reads the sidecar for `audio_path`.
    pub fn read_metadata(&self, audio_path: &Path) -> Result<RecordingMetadata, StorageError> {
        read_metadata(audio_path)
    }

    /// Reads, modifies and rewrites the sidecar for `audio_path`.
    pub fn update_metadata<F>(&self, audio_path: &Path, update: F) -> Result<RecordingMetadata, StorageError>
    where
        F: FnOnce(&mut RecordingMetadata),
    {
        let mut metadata = read_metadata(audio_path)?;
        update(&mut metadata);
        write_metadata(audio_path, &metadata)?;
        Ok(metadata)
    }

    /// Deletes a recording and its sidecar. Missing files are not an error.
    pub fn delete_recording(&self, audio_path: &Path) -> Result<(), StorageError> {
        for path in [audio_path.to_path_buf(), metadata_path(audio_path)] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
        Ok(())
    }

    /// Recordings in `dir`, newest first. A missing directory is empty.
    pub fn list_recordings(&self, dir: &Path) -> Result<Vec<RecordingFile>, StorageError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(dir, e)),
        };

        let mut recordings = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(dir, e))?;
            let path = entry.path();
            let is_audio = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
            if !is_audio {
                continue;
            }
            let Ok(info) = entry.metadata() else {
                continue;
            };
            if !info.is_file() {
                continue;
            }
            recordings.push(RecordingFile {
                metadata: read_metadata(&path).ok(),
                size: info.len(),
                modified: info.modified().ok(),
                path,
            });
        }

        recordings.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(recordings)
    }

    /// Deletes recordings in `dir` that fall outside `policy`.
    ///
    /// Recordings older than `max_age` go first; of the rest, only the
    /// newest `max_files` are kept. Returns the deleted audio paths.
    pub fn cleanup(&self, dir: &Path, policy: &RetentionPolicy) -> Result<Vec<PathBuf>, StorageError> {
        let now = SystemTime::now();
        let mut kept = 0usize;
        let mut removed = Vec::new();

        for recording in self.list_recordings(dir)? {
            let expired = match (policy.max_age, recording.modified) {
                (Some(max_age), Some(modified)) => now
                    .duration_since(modified)
                    .is_ok_and(|age| age > max_age),
                _ => false,
            };
            let over_count = policy.max_files.is_some_and(|max| kept >= max);

            if expired || over_count {
                self.delete_recording(&recording.path)?;
                removed.push(recording.path);
            } else {
                kept += 1;
            }
        }

        if !removed.is_empty() {
            tracing::info!(dir = %dir.display(), removed = removed.len(), "recordings cleaned up");
        }
        Ok(removed)
    }

    /// See [`validate_recording`].
    pub fn validate_recording(&self, path: &Path) -> Result<RecordingValidation, StorageError> {
        validate_recording(path)
    }

    /// See [`recover_recording`].
    pub fn recover_recording(
        &self,
        path: &Path,
        format: &AudioFormat,
        frames: &[AudioFrame],
    ) -> Result<RecordingValidation, StorageError> {
        recover_recording(path, format, frames)
    }
}
