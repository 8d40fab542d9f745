//! The recording state machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ManagerConfig, RecordingOptions};
use crate::encoder::AudioEncoder;
use crate::error::{EncoderError, RecordingError};
use crate::event::{emit, EventCallback, RecordingEvent};
use crate::frame::{AudioFormat, AudioFrame};
use crate::monitor::{DataFlowMonitor, RecordingHealthStatus};
use crate::pipeline::{AudioBridge, CaptureBuffer, RecordingTarget};
use crate::recording::builder::RecordingManagerBuilder;
use crate::recording::status::{RecordingClock, RecordingState, RecordingStatus};
use crate::recording::writer::{RecordingWriter, WriterCommand, WriterReport};
use crate::source::AudioSource;
use crate::storage::{metadata_path, FileManager, RecordingMetadata, TemplateVariables};

/// Channel capacity for writer commands. Commands are rare (Stop, Discard).
const COMMAND_CHANNEL_CAPACITY: usize = 1;

/// An open recording session.
struct ActiveRecording {
    id: String,
    options: RecordingOptions,
    format: AudioFormat,
    path: PathBuf,
    variables: TemplateVariables,
    started_at: DateTime<Utc>,
    cmd_tx: mpsc::Sender<WriterCommand>,
    writer: JoinHandle<WriterReport>,
}

/// State shared between the manager handle, the writer task and the bridge.
pub(crate) struct ManagerInner {
    pub(super) config: ManagerConfig,
    pub(super) encoder: Arc<dyn AudioEncoder>,
    pub(super) files: FileManager,
    pub(super) bridge: Option<Arc<AudioBridge>>,
    pub(super) monitor: Arc<DataFlowMonitor>,
    pub(super) capture: CaptureBuffer,
    pub(super) leg_formats: HashMap<AudioSource, AudioFormat>,
    pub(super) on_event: Option<EventCallback<RecordingEvent>>,
    status: Mutex<RecordingStatus>,
    clock: Mutex<RecordingClock>,
    disposed: AtomicBool,
    /// Serializes lifecycle transitions and owns the open session.
    session: tokio::sync::Mutex<Option<ActiveRecording>>,
}

impl ManagerInner {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: ManagerConfig,
        encoder: Arc<dyn AudioEncoder>,
        files: FileManager,
        bridge: Option<Arc<AudioBridge>>,
        monitor: Arc<DataFlowMonitor>,
        capture: CaptureBuffer,
        leg_formats: HashMap<AudioSource, AudioFormat>,
        on_event: Option<EventCallback<RecordingEvent>>,
    ) -> Self {
        Self {
            config,
            encoder,
            files,
            bridge,
            monitor,
            capture,
            leg_formats,
            on_event,
            status: Mutex::new(RecordingStatus::default()),
            clock: Mutex::new(RecordingClock::default()),
            disposed: AtomicBool::new(false),
            session: tokio::sync::Mutex::new(None),
        }
    }

    fn check(&self) -> Result<(), RecordingError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(RecordingError::Disposed)
        } else {
            Ok(())
        }
    }

    pub(super) fn state(&self) -> RecordingState {
        self.status.lock().state
    }

    /// Applies `update` to the status and emits `StatusChanged`.
    fn transition(&self, update: impl FnOnce(&mut RecordingStatus)) {
        let snapshot = {
            let mut status = self.status.lock();
            update(&mut status);
            status.clone()
        };
        tracing::debug!(state = ?snapshot.state, "recording state changed");
        emit(self.on_event.as_ref(), RecordingEvent::StatusChanged(snapshot));
    }

    /// Moves to `Error`, emits the error and hands it back.
    fn fail(&self, error: RecordingError) -> RecordingError {
        let code = error.code();
        let message = error.to_string();
        tracing::error!(?code, %message, "recording failed");
        self.transition(|status| {
            status.state = RecordingState::Error;
            status.error_code = Some(code);
            status.error_message = Some(message.clone());
        });
        emit(
            self.on_event.as_ref(),
            RecordingEvent::ErrorOccurred { code, message },
        );
        error
    }

    /// Records writer progress. Returns the recorded duration.
    pub(super) fn publish_progress(&self, bytes_recorded: u64, audio_level: f32) -> Duration {
        let duration = self.clock.lock().elapsed();
        {
            let mut status = self.status.lock();
            if !status.state.is_active() {
                return duration;
            }
            status.duration = duration;
            status.bytes_recorded = bytes_recorded;
            status.audio_level = audio_level;
        }
        emit(
            self.on_event.as_ref(),
            RecordingEvent::ProgressUpdated {
                duration,
                bytes_recorded,
                audio_level,
            },
        );
        duration
    }

    /// Stops the recording from inside the writer task.
    pub(super) fn spawn_stop(self: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = self.stop_recording().await {
                tracing::warn!(error = %e, "automatic stop failed");
            }
        });
    }

    async fn encoder_call<F>(&self, call: F) -> Result<(), EncoderError>
    where
        F: std::future::Future<Output = Result<(), EncoderError>>,
    {
        match tokio::time::timeout(self.config.encoder_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EncoderError::Timeout {
                timeout_ms: self.config.encoder_timeout.as_millis() as u64,
            }),
        }
    }

    fn unregister(self: &Arc<Self>) {
        if let Some(bridge) = &self.bridge {
            bridge.unregister(self);
        }
    }

    /// Ends capture, the bridge registration and monitoring.
    fn close_inputs(self: &Arc<Self>) {
        let _ = self.capture.stop_capture();
        let _ = self.capture.clear_buffer();
        self.unregister();
        self.monitor.stop_monitoring();
    }

    fn metadata(&self, active: &ActiveRecording, path: &Path) -> RecordingMetadata {
        let status = self.status.lock().clone();
        let call = &active.options.metadata;
        RecordingMetadata {
            id: active.id.clone(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            caller: call.caller.clone(),
            callee: call.callee.clone(),
            call_id: call.call_id.clone(),
            start_time: active.started_at,
            end_time: status.end_time,
            duration_ms: status.duration.as_millis() as u64,
            codec: active.options.codec,
            sample_rate: active.format.sample_rate(),
            channels: active.format.channels(),
            quality: active.options.quality,
            bytes_recorded: status.bytes_recorded,
            tags: call.tags.clone(),
        }
    }

    /// Removes the file reserved for a recording that never started.
    fn release_path(&self, path: &Path) {
        if let Err(e) = self.files.delete_recording(path) {
            tracing::warn!(error = %e, path = %path.display(), "failed to release recording path");
        }
    }

    fn write_sidecar(&self, active: &ActiveRecording, path: &Path) {
        if !self.config.write_metadata {
            return;
        }
        if let Err(e) = self.files.write_metadata(path, &self.metadata(active, path)) {
            tracing::warn!(error = %e, path = %path.display(), "failed to write recording metadata");
        }
    }

    pub(super) async fn start_recording(self: &Arc<Self>, options: RecordingOptions) -> Result<(), RecordingError> {
        self.check()?;
        let mut session = self.session.lock().await;

        let state = self.state();
        if state.is_active() {
            return Err(RecordingError::InvalidState {
                operation: "start recording",
                state,
            });
        }

        let violations = options.validate();
        if !violations.is_empty() {
            return Err(self.fail(RecordingError::InvalidOptions { violations }));
        }
        let Some(format) = options.output_format() else {
            return Err(self.fail(RecordingError::InvalidOptions {
                violations: vec!["output format is not representable".to_string()],
            }));
        };

        let id = uuid::Uuid::new_v4().to_string();
        let started_local = Local::now();
        let prepared = match self.files.prepare_recording_path(&options, &id, started_local) {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.fail(e.into())),
        };
        let dir = &options.output_directory;
        self.monitor
            .record_file_system_status(dir, self.files.is_writable(dir));

        if let Some(bridge) = &self.bridge {
            if bridge.register(self).is_err() {
                self.release_path(&prepared.path);
                return Err(self.fail(RecordingError::BridgeBusy));
            }
        }

        if let Err(e) = self
            .encoder_call(self.encoder.initialize(format, &prepared.path))
            .await
        {
            self.unregister();
            self.release_path(&prepared.path);
            return Err(self.fail(e.into()));
        }

        let _ = self.capture.clear_buffer();
        let legs = AudioSource::LEGS
            .iter()
            .map(|&leg| (leg, self.leg_formats.get(&leg).copied().unwrap_or(format)));
        if self.capture.start_capture(legs).is_err() {
            self.unregister();
            let _ = self.encoder.finalize().await;
            self.release_path(&prepared.path);
            return Err(self.fail(RecordingError::Disposed));
        }

        self.monitor.reset();
        self.monitor.start_monitoring();
        self.clock.lock().start();

        let started_at = started_local.with_timezone(&Utc);
        self.transition(|status| {
            *status = RecordingStatus {
                state: RecordingState::Recording,
                recording_id: Some(id.clone()),
                start_time: Some(started_at),
                current_file_path: Some(prepared.path.clone()),
                ..RecordingStatus::default()
            };
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let writer = RecordingWriter::new(Arc::clone(self), &options, format, prepared.path.clone());
        let writer = tokio::spawn(writer.run(cmd_rx));

        let active = ActiveRecording {
            id,
            options,
            format,
            path: prepared.path,
            variables: prepared.variables,
            started_at,
            cmd_tx,
            writer,
        };
        self.write_sidecar(&active, &active.path);
        tracing::info!(
            id = %active.id,
            path = %active.path.display(),
            format = %format,
            "recording started"
        );
        *session = Some(active);
        Ok(())
    }

    pub(super) async fn stop_recording(self: &Arc<Self>) -> Result<Option<PathBuf>, RecordingError> {
        self.check()?;
        let mut session = self.session.lock().await;
        let Some(mut active) = session.take() else {
            return Ok(None);
        };

        let _ = active.cmd_tx.send(WriterCommand::Stop).await;
        let report = match (&mut active.writer).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "recording writer task failed");
                WriterReport::default()
            }
        };
        self.close_inputs();
        self.clock.lock().pause();
        let duration = self.clock.lock().elapsed();

        let closed = match self.encoder_call(self.encoder.flush()).await {
            Ok(()) => self.encoder_call(self.encoder.finalize()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = closed {
            // Leave a playable file behind if the header was never patched.
            if let Ok(validation) = self.files.recover_recording(&active.path, &active.format, &[]) {
                tracing::debug!(?validation, "recording checked after failed finalize");
            }
            return Err(self.fail(e.into()));
        }

        let path = match self.files.finalize_file_name(
            &active.path,
            &active.options.file_name_template,
            &mut active.variables,
            duration,
        ) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "failed to apply final file name");
                active.path.clone()
            }
        };

        if path != active.path {
            let _ = std::fs::remove_file(metadata_path(&active.path));
        }

        self.transition(|status| {
            status.state = RecordingState::Completed;
            status.end_time = Some(Utc::now());
            status.duration = duration;
            status.bytes_recorded = report.bytes_recorded;
            status.current_file_path = Some(path.clone());
        });
        self.write_sidecar(&active, &path);

        tracing::info!(
            path = %path.display(),
            bytes = report.bytes_recorded,
            dropped = report.frames_dropped,
            ?duration,
            limit = ?report.limit,
            "recording completed"
        );
        Ok(Some(path))
    }

    pub(super) async fn pause_recording(&self) -> Result<(), RecordingError> {
        self.check()?;
        let _session = self.session.lock().await;
        let state = self.state();
        if state != RecordingState::Recording {
            return Err(RecordingError::InvalidState {
                operation: "pause recording",
                state,
            });
        }
        self.clock.lock().pause();
        self.transition(|status| status.state = RecordingState::Paused);
        Ok(())
    }

    pub(super) async fn resume_recording(&self) -> Result<(), RecordingError> {
        self.check()?;
        let _session = self.session.lock().await;
        let state = self.state();
        if state != RecordingState::Paused {
            return Err(RecordingError::InvalidState {
                operation: "resume recording",
                state,
            });
        }
        self.clock.lock().resume();
        self.transition(|status| status.state = RecordingState::Recording);
        Ok(())
    }

    pub(super) async fn cancel_recording(self: &Arc<Self>) -> Result<(), RecordingError> {
        self.check()?;
        let mut session = self.session.lock().await;
        let Some(mut active) = session.take() else {
            return Err(RecordingError::InvalidState {
                operation: "cancel recording",
                state: self.state(),
            });
        };

        let _ = active.cmd_tx.send(WriterCommand::Discard).await;
        let _ = (&mut active.writer).await;
        self.close_inputs();
        self.clock.lock().pause();

        if let Err(e) = self.encoder_call(self.encoder.finalize()).await {
            tracing::warn!(error = %e, "encoder finalize failed during cancel");
        }
        if let Err(e) = self.files.delete_recording(&active.path) {
            tracing::warn!(error = %e, path = %active.path.display(), "failed to delete cancelled recording");
        }

        self.transition(|status| {
            status.state = RecordingState::Cancelled;
            status.end_time = Some(Utc::now());
            status.current_file_path = None;
        });
        tracing::info!(id = %active.id, "recording cancelled");
        Ok(())
    }

    pub(super) async fn dispose(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.state().is_active() {
            if let Err(e) = self.stop_recording().await {
                tracing::warn!(error = %e, "failed to stop recording during dispose");
            }
        }
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.unregister();
        self.monitor.stop_monitoring();
        self.capture.dispose();
        tracing::debug!("recording manager disposed");
    }
}

impl RecordingTarget for ManagerInner {
    fn is_recording(&self) -> bool {
        !self.disposed.load(Ordering::Acquire) && self.state() == RecordingState::Recording
    }

    fn process_audio_frame(&self, frame: AudioFrame) {
        if !self.is_recording() {
            return;
        }
        let _ = self.capture.push_frame(frame);
    }
}

/// Records one call at a time.
///
/// The manager owns a capture buffer fed either by a registered
/// [`AudioBridge`], by [`process_audio_frame`](Self::process_audio_frame), or
/// by network legs through [`capture_buffer`](Self::capture_buffer). A
/// background writer drains it on every tick, mixes both directions of a leg
/// when asked to, converts to the output format and hands frames to the
/// [`AudioEncoder`].
///
/// Lifecycle calls are serialized: two concurrent starts never both succeed.
/// After [`dispose`](Self::dispose) every call returns
/// [`RecordingError::Disposed`].
///
/// # Example
///
/// ```no_run
/// use call_audio::{RecordingManager, RecordingOptions};
///
/// # async fn run() -> Result<(), call_audio::RecordingError> {
/// let manager = RecordingManager::builder()
///     .on_event(|e| tracing::debug!(?e, "recording event"))
///     .build()?;
///
/// manager.start_recording(RecordingOptions::new("recordings")).await?;
/// // ... frames arrive ...
/// let path = manager.stop_recording().await?;
/// println!("saved to {path:?}");
/// # Ok(())
/// # }
/// ```
pub struct RecordingManager {
    inner: Arc<ManagerInner>,
}

impl RecordingManager {
    /// Returns a builder.
    pub fn builder() -> RecordingManagerBuilder {
        RecordingManagerBuilder::new()
    }

    pub(super) fn from_inner(inner: ManagerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Starts a recording.
    ///
    /// Fails with [`RecordingError::InvalidOptions`] (state becomes `Error`)
    /// if the options do not validate, and with
    /// [`RecordingError::InvalidState`] if a recording is already open; the
    /// open recording is left alone.
    pub async fn start_recording(&self, options: RecordingOptions) -> Result<(), RecordingError> {
        self.inner.start_recording(options).await
    }

    /// Writes what is still buffered, finalizes the file and returns its
    /// path. `Ok(None)` if nothing was recording.
    pub async fn stop_recording(&self) -> Result<Option<PathBuf>, RecordingError> {
        self.inner.stop_recording().await
    }

    /// Stops writing; frames arriving while paused are discarded.
    pub async fn pause_recording(&self) -> Result<(), RecordingError> {
        self.inner.pause_recording().await
    }

    /// Resumes writing after a pause.
    pub async fn resume_recording(&self) -> Result<(), RecordingError> {
        self.inner.resume_recording().await
    }

    /// Abandons the recording and deletes its file and sidecar.
    pub async fn cancel_recording(&self) -> Result<(), RecordingError> {
        self.inner.cancel_recording().await
    }

    /// Queues a frame for writing. Ignored unless recording.
    pub fn process_audio_frame(&self, frame: AudioFrame) -> Result<(), RecordingError> {
        self.inner.check()?;
        self.inner.process_audio_frame(frame);
        Ok(())
    }

    /// Snapshot of the recording status.
    pub fn current_status(&self) -> Result<RecordingStatus, RecordingError> {
        self.inner.check()?;
        Ok(self.inner.status.lock().clone())
    }

    /// Snapshot of the data-flow health.
    pub fn current_health_status(&self) -> Result<RecordingHealthStatus, RecordingError> {
        self.inner.check()?;
        Ok(self.inner.monitor.current_health_status())
    }

    /// The data-flow monitor fed by this manager.
    pub fn monitor(&self) -> &Arc<DataFlowMonitor> {
        &self.inner.monitor
    }

    /// The capture buffer, for network legs delivering raw packets through
    /// [`NetworkAudioIntake`](crate::NetworkAudioIntake).
    pub fn capture_buffer(&self) -> &CaptureBuffer {
        &self.inner.capture
    }

    /// Stops any open recording (keeping the file) and releases resources.
    pub async fn dispose(&self) {
        self.inner.dispose().await;
    }

    /// Returns `true` once disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RecordingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingManager")
            .field("encoder", &self.inner.encoder.name())
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl Drop for RecordingManager {
    fn drop(&mut self) {
        if !self.inner.state().is_active() {
            return;
        }
        // Dropped without stop(): finish the file in the background.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move {
                if let Err(e) = inner.stop_recording().await {
                    tracing::warn!(error = %e, "failed to stop recording on drop");
                }
            });
        }
    }
}
