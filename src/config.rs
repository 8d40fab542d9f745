//! Configuration types for recordings and the components around them.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::{AudioFormat, SampleEncoding};

/// Output codec of a recording. All codecs are written as WAV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingCodec {
    /// 16-bit linear PCM.
    #[default]
    Pcm,
    /// G.711 A-law, 8 bits per sample.
    Alaw,
    /// G.711 µ-law, 8 bits per sample.
    Ulaw,
    /// 32-bit IEEE float.
    Float,
}

impl RecordingCodec {
    /// Sample encoding written to disk.
    pub fn encoding(self) -> SampleEncoding {
        match self {
            Self::Pcm => SampleEncoding::Pcm,
            Self::Alaw => SampleEncoding::Alaw,
            Self::Ulaw => SampleEncoding::Ulaw,
            Self::Float => SampleEncoding::Float,
        }
    }

    /// Bits per stored sample.
    pub fn bits_per_sample(self) -> u8 {
        match self {
            Self::Pcm => 16,
            Self::Alaw | Self::Ulaw => 8,
            Self::Float => 32,
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        "wav"
    }

    /// Short name used in file name templates and metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Alaw => "alaw",
            Self::Ulaw => "ulaw",
            Self::Float => "float",
        }
    }
}

/// Quality preset. Recorded in metadata; picks the default bit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingQuality {
    /// Narrowband telephony.
    Low,
    /// Wideband speech.
    #[default]
    Medium,
    /// Full-band audio.
    High,
}

impl RecordingQuality {
    /// Suggested bit rate in bits per second.
    pub fn bit_rate(self) -> u32 {
        match self {
            Self::Low => 64_000,
            Self::Medium => 128_000,
            Self::High => 256_000,
        }
    }
}

/// Who was on the call. Feeds file naming and the sidecar record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallMetadata {
    /// Calling party number or identity.
    pub caller: Option<String>,
    /// Called party number or identity.
    pub callee: Option<String>,
    /// Signaling-level call identifier.
    pub call_id: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

/// Everything needed to start one recording.
///
/// Call [`validate`](Self::validate) before use; the recording manager does so
/// on every start.
///
/// # Example
///
/// ```
/// use call_audio::RecordingOptions;
///
/// let options = RecordingOptions {
///     sample_rate: 0,
///     channels: 9,
///     ..RecordingOptions::new("/tmp/recordings")
/// };
/// assert_eq!(options.validate().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingOptions {
    /// Output codec.
    /// Default: PCM
    pub codec: RecordingCodec,

    /// Output sample rate, 1..=192000 Hz.
    /// Default: 8000
    pub sample_rate: u32,

    /// Output channel count, 1..=8.
    /// Default: 1
    pub channels: u8,

    /// Nominal bit rate, 1..=320000 bps.
    /// Default: 128000
    pub bit_rate: u32,

    /// Directory the recording is written to.
    pub output_directory: PathBuf,

    /// File name template, see [`FileManager`](crate::FileManager).
    /// Default: `{timestamp}_{caller}`
    pub file_name_template: String,

    /// Start as soon as the call connects. Informational for callers.
    pub auto_start: bool,

    /// Mix both directions of a leg into one stream.
    /// Default: true
    pub record_both_parties: bool,

    /// The recording stops itself after this long.
    /// Default: 2 hours
    pub max_duration: Duration,

    /// The recording stops itself once this many bytes were written.
    /// Default: 500 MiB
    pub max_file_size: u64,

    /// Quality preset.
    pub quality: RecordingQuality,

    /// Reserved for a noise suppression stage.
    pub noise_reduction: bool,

    /// Reserved for a loudness normalization stage.
    pub volume_normalization: bool,

    /// Call parties and labels.
    pub metadata: CallMetadata,
}

impl RecordingOptions {
    /// Default options writing into `output_directory`.
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            ..Self::default()
        }
    }

    /// Lists every violated constraint, in field order. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if !(1..=192_000).contains(&self.sample_rate) {
            violations.push(format!(
                "sample rate must be between 1 and 192000 Hz, got {}",
                self.sample_rate
            ));
        }
        if !(1..=8).contains(&self.channels) {
            violations.push(format!(
                "channels must be between 1 and 8, got {}",
                self.channels
            ));
        }
        if !(1..=320_000).contains(&self.bit_rate) {
            violations.push(format!(
                "bit rate must be between 1 and 320000 bps, got {}",
                self.bit_rate
            ));
        }
        if self.output_directory.to_string_lossy().trim().is_empty() {
            violations.push("output directory must not be blank".to_string());
        }
        if self.file_name_template.trim().is_empty() {
            violations.push("file name template must not be blank".to_string());
        }
        if self.max_duration.is_zero() {
            violations.push("max duration must be positive".to_string());
        }
        if self.max_file_size == 0 {
            violations.push("max file size must be positive".to_string());
        }

        violations
    }

    /// Returns `true` if [`validate`](Self::validate) finds nothing.
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// The format frames are converted to before encoding.
    ///
    /// `None` if the sample rate or channel count is zero.
    pub fn output_format(&self) -> Option<AudioFormat> {
        AudioFormat::new(
            self.sample_rate,
            self.channels,
            self.codec.bits_per_sample(),
            self.codec.encoding(),
        )
        .ok()
    }
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            codec: RecordingCodec::default(),
            sample_rate: 8000,
            channels: 1,
            bit_rate: RecordingQuality::default().bit_rate(),
            output_directory: PathBuf::from("recordings"),
            file_name_template: "{timestamp}_{caller}".to_string(),
            auto_start: false,
            record_both_parties: true,
            max_duration: Duration::from_secs(2 * 60 * 60),
            max_file_size: 500 * 1024 * 1024,
            quality: RecordingQuality::default(),
            noise_reduction: false,
            volume_normalization: false,
            metadata: CallMetadata::default(),
        }
    }
}

/// Tuning for the [`RecordingManager`](crate::RecordingManager).
///
/// # Example
///
/// ```
/// use call_audio::ManagerConfig;
/// use std::time::Duration;
///
/// let config = ManagerConfig {
///     tick_interval: Duration::from_millis(20),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often buffered frames are drained, written and progress reported.
    ///
    /// Frames from opposite directions drained in the same tick are paired
    /// for mixing.
    /// Default: 100ms
    pub tick_interval: Duration,

    /// Capacity of the capture queue in frames.
    ///
    /// If it fills, oldest frames are dropped and the monitor records an
    /// overflow.
    /// Default: 1000
    pub capture_buffer_size: usize,

    /// Number of retry attempts for a failed encoder write.
    ///
    /// Default: 3
    pub encoder_retry_attempts: u32,

    /// Initial delay between encoder retry attempts.
    ///
    /// Uses exponential backoff (delay doubles each attempt).
    /// Default: 50ms
    pub encoder_retry_delay: Duration,

    /// Upper bound for a single encoder call.
    ///
    /// Default: 5s
    pub encoder_timeout: Duration,

    /// Free space required in the output directory to start.
    ///
    /// Default: 50 MiB
    pub min_free_space_bytes: u64,

    /// Write a sidecar metadata record next to each recording.
    ///
    /// Default: true
    pub write_metadata: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            capture_buffer_size: 1000,
            encoder_retry_attempts: 3,
            encoder_retry_delay: Duration::from_millis(50),
            encoder_timeout: Duration::from_secs(5),
            min_free_space_bytes: 50 * 1024 * 1024,
            write_metadata: true,
        }
    }
}

/// Tuning for the [`DataFlowMonitor`](crate::DataFlowMonitor).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often health is recomputed.
    /// Default: 1s
    pub tick_interval: Duration,

    /// Silence longer than this counts as a data-flow interruption.
    /// Default: 3s
    pub data_timeout: Duration,

    /// Buffer usage fraction at which the buffer is reported near full.
    /// Default: 0.8
    pub near_full_threshold: f64,

    /// Frame loss rate above which quality is poor.
    /// Default: 0.1
    pub poor_loss_rate: f64,

    /// Frame loss rate below which quality can be excellent.
    /// Default: 0.01
    pub excellent_loss_rate: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            data_timeout: Duration::from_secs(3),
            near_full_threshold: 0.8,
            poor_loss_rate: 0.1,
            excellent_loss_rate: 0.01,
        }
    }
}

/// Sample layout of the audio clock pulling from a
/// [`PlaybackRing`](crate::PlaybackRing). Samples are 16-bit mono.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackProfile {
    /// Clock sample rate.
    pub sample_rate: u32,
    /// Samples emitted per pull.
    pub samples_per_frame: usize,
}

impl PlaybackProfile {
    /// Bytes emitted per pull.
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame * 2
    }
}

impl Default for PlaybackProfile {
    /// 20ms frames at 8kHz.
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            samples_per_frame: 160,
        }
    }
}

/// Tuning for the [`PlaybackRing`](crate::PlaybackRing).
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Audio queued before playback starts.
    /// Default: 200ms
    pub prebuffer_duration: Duration,

    /// Clock profile until [`init`](crate::PlaybackRing::init) is called.
    pub profile: PlaybackProfile,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            prebuffer_duration: Duration::from_millis(200),
            profile: PlaybackProfile::default(),
        }
    }
}

/// Which finished recordings [`FileManager::cleanup`](crate::FileManager::cleanup)
/// deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Delete recordings older than this.
    pub max_age: Option<Duration>,
    /// Keep at most this many recordings, newest first.
    pub max_files: Option<usize>,
}
