//! Health snapshot types.

use std::path::PathBuf;
use std::time::Duration;

/// Aggregate recording quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthQuality {
    /// No audio has been seen yet.
    #[default]
    Unknown,
    /// Data is missing or a collaborator is failing.
    Poor,
    /// Healthy with some loss or buffer pressure.
    Good,
    /// Healthy, negligible loss.
    Excellent,
}

/// Capture buffer pressure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferUsage {
    /// Frames buffered at the last report.
    pub current_size: usize,
    /// Buffer capacity.
    pub max_size: usize,
    /// `current_size / max_size` in percent.
    pub usage_percentage: f64,
    /// Overflows reported since the monitor was reset.
    pub overflow_count: u64,
    /// Usage reached the near-full threshold.
    pub is_near_full: bool,
}

/// Encoder state as reported by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderHealth {
    /// Last write succeeded.
    pub is_working: bool,
    /// Mean time per encoder call.
    pub average_encode_time: Duration,
    /// Writes that failed after every retry.
    pub failure_count: u64,
    /// Encoder name.
    pub encoder_type: Option<String>,
}

impl Default for EncoderHealth {
    fn default() -> Self {
        Self {
            is_working: true,
            average_encode_time: Duration::ZERO,
            failure_count: 0,
            encoder_type: None,
        }
    }
}

/// Output location state.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSystemHealth {
    /// Where the recording is written.
    pub output_path: Option<PathBuf>,
    /// Last check found the location writable.
    pub is_writable: bool,
    /// Checks that found it unwritable.
    pub write_failure_count: u64,
}

impl Default for FileSystemHealth {
    fn default() -> Self {
        Self {
            output_path: None,
            is_writable: true,
            write_failure_count: 0,
        }
    }
}

/// Snapshot returned by
/// [`DataFlowMonitor::current_health_status`](crate::DataFlowMonitor::current_health_status).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingHealthStatus {
    /// Aggregate quality from the last tick.
    pub quality: HealthQuality,
    /// Audio arrived within the data timeout.
    pub is_data_flowing: bool,
    /// Audio bytes received.
    pub bytes_written: u64,
    /// Audio frames received.
    pub audio_frame_count: u64,
    /// Frames missing from sequence number gaps.
    pub lost_frame_count: u64,
    /// `lost / (received + lost)`.
    pub frame_loss_rate: f64,
    /// Bytes per second since the first frame.
    pub average_data_rate: f64,
    /// Capture buffer pressure.
    pub buffer_usage: BufferUsage,
    /// Encoder state.
    pub encoder_health: EncoderHealth,
    /// Output location state.
    pub file_system_health: FileSystemHealth,
    /// Problems found on the last tick.
    pub issues: Vec<String>,
}

impl RecordingHealthStatus {
    /// Returns `true` if the last tick found no issues.
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}
