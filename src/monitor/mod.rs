//! Data-flow health monitoring.
//!
//! The monitor is purely diagnostic: producers report what they see
//! (`record_*`), and a periodic tick turns those reports into a
//! [`RecordingHealthStatus`] with a quality grade and a list of issues.

mod health;

pub use health::{BufferUsage, EncoderHealth, FileSystemHealth, HealthQuality, RecordingHealthStatus};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::event::{emit, EventCallback, MonitorEvent};
use crate::source::AudioSource;

/// Command sent to the monitor task.
enum MonitorCommand {
    Stop,
}

struct MonitorTask {
    cmd_tx: mpsc::Sender<MonitorCommand>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct MonitorState {
    health: RecordingHealthStatus,
    monitoring_since: Option<Instant>,
    first_received: Option<Instant>,
    last_received: Option<Instant>,
    last_sequence: HashMap<AudioSource, u32>,
    overflowed_since_tick: bool,
    interrupted: bool,
    encode_samples: u64,
    reported: Option<(HealthQuality, Vec<String>)>,
}

/// Tracks whether audio is reaching the recording and how healthy the
/// path to disk is.
///
/// # Example
///
/// ```
/// use call_audio::{AudioSource, DataFlowMonitor, MonitorConfig};
///
/// let monitor = DataFlowMonitor::new(MonitorConfig::default());
/// for seq in [1, 2, 5, 6] {
///     monitor.record_audio_data(160, AudioSource::TelephonyIn, Some(seq));
/// }
/// let health = monitor.current_health_status();
/// assert_eq!(health.audio_frame_count, 4);
/// assert_eq!(health.lost_frame_count, 2);
/// ```
pub struct DataFlowMonitor {
    config: MonitorConfig,
    state: Arc<Mutex<MonitorState>>,
    event_callback: Option<EventCallback<MonitorEvent>>,
    task: Mutex<Option<MonitorTask>>,
}

impl DataFlowMonitor {
    /// Creates an idle monitor.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MonitorState::default())),
            event_callback: None,
            task: Mutex::new(None),
        }
    }

    /// Sets the callback for health events.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback<MonitorEvent>) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Starts the periodic health tick on the current tokio runtime.
    ///
    /// Does nothing if already monitoring or if called outside a runtime.
    pub fn start_monitoring(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("data-flow monitor needs a tokio runtime; not started");
            return;
        };

        self.state.lock().monitoring_since = Some(Instant::now());

        let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let callback = self.event_callback.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => refresh(&state, &config, callback.as_ref()),
                    cmd = cmd_rx.recv() => match cmd {
                        Some(MonitorCommand::Stop) | None => break,
                    },
                }
            }
            tracing::trace!("data-flow monitor stopped");
        });

        *task = Some(MonitorTask { cmd_tx, handle });
        tracing::debug!(interval = ?self.config.tick_interval, "data-flow monitor started");
    }

    /// Stops the periodic tick. Collected figures are kept.
    pub fn stop_monitoring(&self) {
        if let Some(task) = self.task.lock().take() {
            let _ = task.cmd_tx.try_send(MonitorCommand::Stop);
        }
        self.state.lock().monitoring_since = None;
    }

    /// Returns `true` while the tick task runs.
    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Reports received audio.
    ///
    /// A jump of more than one in `sequence_number` for the same source
    /// counts the skipped numbers as lost. Numbers compare with wrap-around:
    /// anything less than half the `u32` range ahead is newer. Late or
    /// repeated numbers are counted as received but do not affect loss.
    pub fn record_audio_data(&self, len: usize, source: AudioSource, sequence_number: Option<u32>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.first_received.get_or_insert(now);
        state.last_received = Some(now);

        let mut lost = 0u64;
        if let Some(seq) = sequence_number {
            match state.last_sequence.get(&source).copied() {
                Some(last) => {
                    let ahead = seq.wrapping_sub(last);
                    if ahead != 0 && ahead < u32::MAX / 2 {
                        lost = u64::from(ahead - 1);
                        state.last_sequence.insert(source, seq);
                    }
                }
                None => {
                    state.last_sequence.insert(source, seq);
                }
            }
        }
        if lost > 0 {
            tracing::debug!(?source, lost, "sequence gap");
        }

        let health = &mut state.health;
        health.bytes_written += len as u64;
        health.audio_frame_count += 1;
        health.lost_frame_count += lost;
        let total = health.audio_frame_count + health.lost_frame_count;
        health.frame_loss_rate = health.lost_frame_count as f64 / total as f64;
        health.is_data_flowing = true;
    }

    /// Reports capture buffer occupancy.
    pub fn record_buffer_status(&self, current_size: usize, max_size: usize, overflowed: bool) {
        let mut state = self.state.lock();
        if overflowed {
            state.overflowed_since_tick = true;
        }
        let usage = &mut state.health.buffer_usage;
        usage.current_size = current_size;
        usage.max_size = max_size;
        usage.usage_percentage = if max_size == 0 {
            0.0
        } else {
            current_size as f64 / max_size as f64 * 100.0
        };
        usage.is_near_full = usage.usage_percentage >= self.config.near_full_threshold * 100.0;
        if overflowed {
            usage.overflow_count += 1;
        }
    }

    /// Reports the outcome of an encoder call.
    pub fn record_encoder_status(
        &self,
        is_working: bool,
        encode_time: Option<Duration>,
        encoder_type: Option<&str>,
    ) {
        let mut state = self.state.lock();
        if let Some(elapsed) = encode_time {
            state.encode_samples += 1;
            let n = state.encode_samples;
            let encoder = &mut state.health.encoder_health;
            encoder.average_encode_time = (encoder.average_encode_time * (n - 1) as u32
                + elapsed)
                / n as u32;
        }

        let encoder = &mut state.health.encoder_health;
        if !is_working {
            encoder.failure_count += 1;
            tracing::warn!(failures = encoder.failure_count, "encoder failure reported");
        }
        encoder.is_working = is_working;
        if let Some(name) = encoder_type {
            encoder.encoder_type = Some(name.to_string());
        }
    }

    /// Reports whether the output location accepts writes.
    pub fn record_file_system_status(&self, output_path: &Path, is_writable: bool) {
        let mut state = self.state.lock();
        let fs = &mut state.health.file_system_health;
        fs.output_path = Some(output_path.to_path_buf());
        fs.is_writable = is_writable;
        if !is_writable {
            fs.write_failure_count += 1;
        }
    }

    /// Recomputes quality and issues and emits any resulting events.
    ///
    /// This is the body of the periodic tick.
    pub fn refresh_health(&self) {
        refresh(&self.state, &self.config, self.event_callback.as_ref());
    }

    /// Snapshot of the current health.
    pub fn current_health_status(&self) -> RecordingHealthStatus {
        self.state.lock().health.clone()
    }

    /// Clears all counters and per-source sequence state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let monitoring_since = state.monitoring_since.map(|_| Instant::now());
        *state = MonitorState {
            monitoring_since,
            ..MonitorState::default()
        };
    }
}

impl std::fmt::Debug for DataFlowMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFlowMonitor")
            .field("config", &self.config)
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}

impl Drop for DataFlowMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.cmd_tx.try_send(MonitorCommand::Stop);
        }
    }
}

fn refresh(
    state: &Mutex<MonitorState>,
    config: &MonitorConfig,
    callback: Option<&EventCallback<MonitorEvent>>,
) {
    let now = Instant::now();
    let mut events = Vec::new();

    {
        let mut guard = state.lock();
        let state = &mut *guard;

        let silent_for = state
            .last_received
            .or(state.monitoring_since)
            .map(|since| now.saturating_duration_since(since));
        let flowing = state.last_received.is_some()
            && silent_for.is_some_and(|silent| silent <= config.data_timeout);

        let mut issues = Vec::new();
        if let Some(silent) = silent_for.filter(|_| !flowing) {
            if silent > config.data_timeout {
                issues.push(format!("No audio data received for {}ms", silent.as_millis()));
                if !state.interrupted {
                    state.interrupted = true;
                    tracing::warn!(?silent, "audio data flow interrupted");
                    events.push(MonitorEvent::DataFlowInterrupted { silent_for: silent });
                }
            }
        }
        if flowing {
            state.interrupted = false;
        }

        let overflowed = std::mem::take(&mut state.overflowed_since_tick);
        if overflowed {
            issues.push("Buffer overflows detected".to_string());
        }
        if !state.health.encoder_health.is_working {
            issues.push("Encoder not working".to_string());
        }
        if !state.health.file_system_health.is_writable {
            issues.push("File system not writable".to_string());
        }
        let loss = state.health.frame_loss_rate;
        if loss > config.poor_loss_rate {
            issues.push(format!("High frame loss rate: {:.1}%", loss * 100.0));
        }

        let health = &mut state.health;
        health.is_data_flowing = flowing;
        if let Some(first) = state.first_received {
            let elapsed = now.saturating_duration_since(first).as_secs_f64();
            if elapsed > 0.0 {
                health.average_data_rate = health.bytes_written as f64 / elapsed;
            }
        }
        health.quality = if health.audio_frame_count == 0 {
            HealthQuality::Unknown
        } else if !issues.is_empty() {
            HealthQuality::Poor
        } else if loss < config.excellent_loss_rate && !health.buffer_usage.is_near_full {
            HealthQuality::Excellent
        } else {
            HealthQuality::Good
        };
        health.issues = issues;

        let current = (health.quality, health.issues.clone());
        if state.reported.as_ref() != Some(&current) {
            state.reported = Some(current);
            events.push(MonitorEvent::HealthStatusChanged(state.health.clone()));
        }
    }

    for event in events {
        emit(callback, event);
    }
}
