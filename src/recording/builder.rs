//! Builder for [`RecordingManager`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ManagerConfig, MonitorConfig};
use crate::encoder::{AudioEncoder, WavEncoder};
use crate::error::RecordingError;
use crate::event::{event_callback, CaptureEvent, EventCallback, RecordingEvent};
use crate::frame::AudioFormat;
use crate::monitor::DataFlowMonitor;
use crate::pipeline::{AudioBridge, CaptureBuffer};
use crate::recording::manager::{ManagerInner, RecordingManager};
use crate::source::AudioSource;
use crate::storage::FileManager;

/// Configures and creates a [`RecordingManager`].
///
/// Use [`RecordingManager::builder()`] to create a new builder. Everything
/// is optional:
///
/// - encoder: [`WavEncoder`]
/// - file manager: [`FileManager`] requiring
///   [`ManagerConfig::min_free_space_bytes`]
/// - bridge: none; frames come through
///   [`process_audio_frame`](RecordingManager::process_audio_frame) or the
///   capture buffer
/// - monitor: a fresh [`DataFlowMonitor`] with default settings
/// - leg formats: the recording's output format
///
/// # Example
///
/// ```
/// use call_audio::{AudioBridge, AudioFormat, AudioSource, ManagerConfig, RecordingManager};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let bridge = Arc::new(AudioBridge::new());
/// let manager = RecordingManager::builder()
///     .bridge(Arc::clone(&bridge))
///     .leg_format(AudioSource::TelephonyIn, AudioFormat::ulaw_8k())
///     .with_config(ManagerConfig {
///         tick_interval: Duration::from_millis(20),
///         ..Default::default()
///     })
///     .on_event(|e| tracing::debug!(?e, "recording event"))
///     .build()
///     .unwrap();
/// ```
#[must_use]
pub struct RecordingManagerBuilder {
    encoder: Option<Arc<dyn AudioEncoder>>,
    files: Option<FileManager>,
    bridge: Option<Arc<AudioBridge>>,
    monitor: Option<Arc<DataFlowMonitor>>,
    leg_formats: HashMap<AudioSource, AudioFormat>,
    event_callback: Option<EventCallback<RecordingEvent>>,
    config: ManagerConfig,
}

impl Default for RecordingManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            encoder: None,
            files: None,
            bridge: None,
            monitor: None,
            leg_formats: HashMap::new(),
            event_callback: None,
            config: ManagerConfig::default(),
        }
    }

    /// Sets the encoder recordings are written with.
    pub fn encoder<E: AudioEncoder + 'static>(mut self, encoder: E) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// Sets the file manager used for naming, sidecars and cleanup.
    pub fn file_manager(mut self, files: FileManager) -> Self {
        self.files = Some(files);
        self
    }

    /// Registers with `bridge` for the duration of each recording.
    pub fn bridge(mut self, bridge: Arc<AudioBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Reports data-flow health to `monitor`.
    pub fn monitor(mut self, monitor: Arc<DataFlowMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Format of raw packets arriving from `source` through the capture
    /// buffer's network intake.
    pub fn leg_format(mut self, source: AudioSource, format: AudioFormat) -> Self {
        self.leg_formats.insert(source, format);
        self
    }

    /// Set a callback to receive recording events.
    ///
    /// Events include state changes, progress ticks and errors.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RecordingEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom manager configuration.
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates the manager. Nothing is started.
    pub fn build(self) -> Result<RecordingManager, RecordingError> {
        let files = match self.files {
            Some(files) => files,
            None => FileManager::new()?.with_min_free_space(self.config.min_free_space_bytes),
        };
        let encoder = self
            .encoder
            .unwrap_or_else(|| Arc::new(WavEncoder::new()));
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(DataFlowMonitor::new(MonitorConfig::default())));

        // Overflows feed the monitor directly; written audio is reported by the writer.
        let max_size = self.config.capture_buffer_size;
        let capture_monitor = Arc::clone(&monitor);
        let capture = CaptureBuffer::new(max_size).with_event_callback(event_callback(
            move |event: CaptureEvent| match event {
                CaptureEvent::FrameArrived { .. } => {}
                CaptureEvent::BufferOverflow { buffered, .. } => {
                    capture_monitor.record_buffer_status(buffered, max_size, true);
                }
            },
        ));

        tracing::debug!(
            encoder = encoder.name(),
            bridge = self.bridge.is_some(),
            "recording manager built"
        );
        Ok(RecordingManager::from_inner(ManagerInner::new(
            self.config,
            encoder,
            files,
            self.bridge,
            monitor,
            capture,
            self.leg_formats,
            self.event_callback,
        )))
    }
}
