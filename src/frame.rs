//! Audio format model and the frame envelope passed through the pipeline.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::source::AudioSource;

/// How individual samples are represented in a frame's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    /// Linear PCM. 8-bit is unsigned, wider depths are signed little-endian.
    Pcm,
    /// G.711 A-law, one byte per sample.
    Alaw,
    /// G.711 µ-law, one byte per sample.
    Ulaw,
    /// IEEE-754 float, little-endian.
    Float,
}

impl SampleEncoding {
    /// Returns `true` for the logarithmically companded G.711 encodings.
    pub fn is_companded(self) -> bool {
        matches!(self, Self::Alaw | Self::Ulaw)
    }
}

/// Describes the layout of raw audio bytes.
///
/// Two formats are compatible (for mixing and identity checks) iff all four
/// fields are equal, which is exactly `PartialEq`.
///
/// # Example
///
/// ```
/// use call_audio::{AudioFormat, SampleEncoding};
///
/// let format = AudioFormat::new(8000, 1, 16, SampleEncoding::Pcm).unwrap();
/// assert_eq!(format.byte_rate(), 16000);
/// assert_eq!(format.block_align(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u8,
    encoding: SampleEncoding,
}

impl AudioFormat {
    /// Creates a format.
    ///
    /// Rejects zero-valued fields and bit depths the encoding cannot carry:
    /// PCM is 8, 16, 24 or 32 bits, G.711 is 8 bits and float is 32 bits.
    pub fn new(
        sample_rate: u32,
        channels: u8,
        bits_per_sample: u8,
        encoding: SampleEncoding,
    ) -> Result<Self, FrameError> {
        let depth_ok = match encoding {
            SampleEncoding::Pcm => matches!(bits_per_sample, 8 | 16 | 24 | 32),
            SampleEncoding::Alaw | SampleEncoding::Ulaw => bits_per_sample == 8,
            SampleEncoding::Float => bits_per_sample == 32,
        };
        if sample_rate == 0 || channels == 0 || !depth_ok {
            return Err(FrameError::InvalidFormat {
                sample_rate,
                channels,
                bits_per_sample,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            encoding,
        })
    }

    /// 16-bit signed linear PCM.
    pub fn pcm16(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            bits_per_sample: 16,
            encoding: SampleEncoding::Pcm,
        }
    }

    /// 8 kHz mono µ-law, the usual telephony leg format.
    pub fn ulaw_8k() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 8,
            encoding: SampleEncoding::Ulaw,
        }
    }

    /// 8 kHz mono A-law.
    pub fn alaw_8k() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 8,
            encoding: SampleEncoding::Alaw,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Bits per single-channel sample.
    pub fn bits_per_sample(&self) -> u8 {
        self.bits_per_sample
    }

    /// Sample encoding.
    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Bytes per second: `sample_rate * channels * bits / 8`.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    /// Bytes per multi-channel frame: `channels * bits / 8`.
    pub fn block_align(&self) -> u16 {
        u16::from(self.channels) * u16::from(self.bits_per_sample) / 8
    }

    /// Bytes per single-channel sample, never zero.
    pub fn bytes_per_sample(&self) -> usize {
        (usize::from(self.bits_per_sample) / 8).max(1)
    }

    /// Returns `true` if the two formats can be mixed without conversion.
    pub fn is_compatible(&self, other: &AudioFormat) -> bool {
        self == other
    }

    /// Playback duration of `len` bytes in this format.
    pub fn duration_of(&self, len: usize) -> Duration {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / f64::from(byte_rate))
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}Hz/{}ch/{}bit",
            self.encoding, self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// One chunk of audio tagged with its format and provenance.
///
/// Frames are immutable once built. The byte buffer is owned and moves
/// through queues without copying; use [`AudioFrame::into_data`] to take it
/// back out.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    data: Vec<u8>,
    format: AudioFormat,
    source: AudioSource,
    timestamp: Instant,
    sequence_number: Option<u32>,
}

impl AudioFrame {
    /// Creates a frame stamped with the current instant.
    ///
    /// Empty data is rejected.
    pub fn new(data: Vec<u8>, format: AudioFormat, source: AudioSource) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::EmptyData);
        }
        Ok(Self {
            data,
            format,
            source,
            timestamp: Instant::now(),
            sequence_number: None,
        })
    }

    /// Attaches a transport sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence_number: u32) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    /// Overrides the capture instant.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builds a frame with new data and format but this frame's metadata.
    pub(crate) fn derive(&self, data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data,
            format,
            source: self.source,
            timestamp: self.timestamp,
            sequence_number: self.sequence_number,
        }
    }

    /// Returns this frame relabeled with another source.
    pub(crate) fn relabel(mut self, source: AudioSource) -> Self {
        self.source = source;
        self
    }

    /// Raw sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the frame, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Sample layout.
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Which leg and direction produced the frame.
    pub fn source(&self) -> AudioSource {
        self.source
    }

    /// Capture instant.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Transport sequence number, if the leg supplied one.
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false` for a constructed frame; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of this frame.
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.data.len())
    }
}
