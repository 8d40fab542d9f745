//! Pull-based playback queue for synthesized audio.
//!
//! A synthesis source pushes 16-bit mono PCM with [`PlaybackRing::enqueue`];
//! the outbound audio clock pulls one fixed-size frame per tick with
//! [`PlaybackRing::read_next_frame`]. The clock always gets a full frame: when
//! there is nothing to play it gets silence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::config::{PlaybackConfig, PlaybackProfile};
use crate::pipeline::level::rms_level_pcm16;

/// Playback state of a [`PlaybackRing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not started. Reads return silence.
    Stopped,
    /// Collecting audio until the pre-buffer threshold is reached.
    Buffering,
    /// Reads consume queued audio.
    Playing,
}

struct PlaybackInner {
    state: PlaybackState,
    paused: bool,
    chunks: VecDeque<Vec<u8>>,
    /// Bytes of the front chunk already consumed.
    offset: usize,
    buffered: usize,
    profile: PlaybackProfile,
    threshold: usize,
}

impl PlaybackInner {
    fn clear(&mut self) {
        self.chunks.clear();
        self.offset = 0;
        self.buffered = 0;
    }

    /// Copies up to `out.len()` bytes from the queue. Returns bytes copied.
    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;
        while written < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let available = &front[self.offset..];
            let take = available.len().min(out.len() - written);
            out[written..written + take].copy_from_slice(&available[..take]);
            written += take;
            self.offset += take;

            if self.offset >= front.len() {
                self.chunks.pop_front();
                self.offset = 0;
            }
        }
        self.buffered -= written;
        written
    }
}

fn threshold_bytes(profile: &PlaybackProfile, config: &PlaybackConfig) -> usize {
    let bytes_per_second = f64::from(profile.sample_rate) * 2.0;
    (bytes_per_second * config.prebuffer_duration.as_secs_f64()) as usize
}

/// Producer/consumer buffer with pre-buffering.
///
/// # Example
///
/// ```
/// use call_audio::{PlaybackConfig, PlaybackRing, PlaybackState};
/// use std::time::Duration;
///
/// let ring = PlaybackRing::new(PlaybackConfig {
///     prebuffer_duration: Duration::from_millis(20),
///     ..Default::default()
/// });
/// ring.start();
///
/// // Below the threshold the clock hears silence.
/// assert!(ring.read_next_frame().iter().all(|&b| b == 0));
///
/// ring.enqueue(&[1u8; 320]);
/// assert_eq!(ring.state(), PlaybackState::Playing);
/// assert_eq!(ring.read_next_frame(), vec![1u8; 320]);
/// ```
pub struct PlaybackRing {
    config: PlaybackConfig,
    inner: Mutex<PlaybackInner>,
    /// Last emitted RMS level as `f32` bits.
    level: AtomicU32,
}

impl PlaybackRing {
    /// Creates a stopped ring using `config.profile`.
    pub fn new(config: PlaybackConfig) -> Self {
        let profile = config.profile;
        let threshold = threshold_bytes(&profile, &config);
        Self {
            config,
            inner: Mutex::new(PlaybackInner {
                state: PlaybackState::Stopped,
                paused: false,
                chunks: VecDeque::new(),
                offset: 0,
                buffered: 0,
                profile,
                threshold,
            }),
            level: AtomicU32::new(0),
        }
    }

    /// Adopts the clock profile and recomputes the pre-buffer threshold.
    pub fn init(&self, profile: PlaybackProfile) {
        let threshold = threshold_bytes(&profile, &self.config);
        let mut inner = self.inner.lock();
        inner.profile = profile;
        inner.threshold = threshold;
        tracing::debug!(
            sample_rate = profile.sample_rate,
            samples_per_frame = profile.samples_per_frame,
            threshold,
            "playback ring initialized"
        );
    }

    /// Clears queued audio and begins buffering.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.clear();
        inner.paused = false;
        inner.state = PlaybackState::Buffering;
        self.level.store(0, Ordering::Relaxed);
    }

    /// Clears queued audio and stops.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.clear();
        inner.paused = false;
        inner.state = PlaybackState::Stopped;
        self.level.store(0, Ordering::Relaxed);
    }

    /// Suspends consumption. Queued audio is kept.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Resumes consumption.
    pub fn resume(&self) {
        self.inner.lock().paused = false;
    }

    /// Appends a copy of `pcm` to the queue.
    ///
    /// Crossing the pre-buffer threshold while buffering starts playback.
    pub fn enqueue(&self, pcm: &[u8]) {
        if pcm.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.chunks.push_back(pcm.to_vec());
        inner.buffered += pcm.len();

        if inner.state == PlaybackState::Buffering && inner.buffered >= inner.threshold {
            inner.state = PlaybackState::Playing;
            tracing::trace!(buffered = inner.buffered, "playback started");
        }
    }

    /// Returns exactly one frame of audio.
    ///
    /// Silence while stopped, paused or buffering. While playing, consumes one
    /// frame; a short read is padded with silence and drops back to buffering.
    pub fn read_next_frame(&self) -> Vec<u8> {
        let frame = {
            let mut inner = self.inner.lock();
            let mut frame = vec![0u8; inner.profile.frame_bytes()];

            if inner.state == PlaybackState::Playing && !inner.paused {
                let read = inner.drain_into(&mut frame);
                if read < frame.len() {
                    inner.state = PlaybackState::Buffering;
                    tracing::trace!(read, "playback starved, buffering");
                }
            }
            frame
        };

        let level = rms_level_pcm16(&frame);
        self.level.store(level.to_bits(), Ordering::Relaxed);
        frame
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Bytes queued and not yet played.
    pub fn buffered_bytes(&self) -> usize {
        self.inner.lock().buffered
    }

    /// Bytes needed before playback starts.
    pub fn prebuffer_threshold_bytes(&self) -> usize {
        self.inner.lock().threshold
    }

    /// Bytes per emitted frame.
    pub fn frame_bytes(&self) -> usize {
        self.inner.lock().profile.frame_bytes()
    }

    /// RMS level of the last emitted frame, 0.0..=1.0.
    pub fn playback_level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

impl Default for PlaybackRing {
    fn default() -> Self {
        Self::new(PlaybackConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// 8kHz, 4 samples per frame, 1ms pre-buffer (16 bytes).
    fn small_ring() -> PlaybackRing {
        let ring = PlaybackRing::new(PlaybackConfig {
            prebuffer_duration: Duration::from_millis(1),
            ..Default::default()
        });
        ring.init(PlaybackProfile {
            sample_rate: 8000,
            samples_per_frame: 4,
        });
        ring
    }

    #[test]
    fn test_default_threshold() {
        let ring = PlaybackRing::default();
        // 200ms of 16-bit 8kHz
        assert_eq!(ring.prebuffer_threshold_bytes(), 3200);
        assert_eq!(ring.frame_bytes(), 320);
        assert_eq!(ring.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_stopped_returns_silence() {
        let ring = small_ring();
        ring.enqueue(&[5; 32]);
        assert_eq!(ring.read_next_frame(), vec![0; 8]);
        assert_eq!(ring.buffered_bytes(), 32);
    }

    #[test]
    fn test_silence_until_threshold() {
        let ring = small_ring();
        ring.start();
        ring.enqueue(&[7; 8]);

        assert_eq!(ring.state(), PlaybackState::Buffering);
        assert_eq!(ring.read_next_frame(), vec![0; 8]);
        assert_eq!(ring.buffered_bytes(), 8);

        ring.enqueue(&[9; 8]);
        assert_eq!(ring.state(), PlaybackState::Playing);
        assert_eq!(ring.read_next_frame(), vec![7; 8]);
        assert_eq!(ring.read_next_frame(), vec![9; 8]);
    }

    #[test]
    fn test_reads_span_chunks() {
        let ring = small_ring();
        ring.start();
        ring.enqueue(&[1; 5]);
        ring.enqueue(&[2; 11]);

        assert_eq!(ring.read_next_frame(), vec![1, 1, 1, 1, 1, 2, 2, 2]);
        assert_eq!(ring.read_next_frame(), vec![2; 8]);
    }

    #[test]
    fn test_underrun_pads_and_rebuffers() {
        let ring = small_ring();
        ring.start();
        ring.enqueue(&[3; 20]);

        assert_eq!(ring.read_next_frame(), vec![3; 8]);
        assert_eq!(ring.read_next_frame(), vec![3; 8]);
        assert_eq!(ring.read_next_frame(), vec![3, 3, 3, 3, 0, 0, 0, 0]);
        assert_eq!(ring.state(), PlaybackState::Buffering);

        // Below threshold again: silence, nothing consumed.
        ring.enqueue(&[4; 8]);
        assert_eq!(ring.read_next_frame(), vec![0; 8]);
        assert_eq!(ring.buffered_bytes(), 8);
    }

    #[test]
    fn test_pause_keeps_content() {
        let ring = small_ring();
        ring.start();
        ring.enqueue(&[6; 16]);
        ring.pause();

        assert!(ring.is_paused());
        assert_eq!(ring.read_next_frame(), vec![0; 8]);
        assert_eq!(ring.buffered_bytes(), 16);

        ring.resume();
        assert_eq!(ring.read_next_frame(), vec![6; 8]);
    }

    #[test]
    fn test_stop_clears() {
        let ring = small_ring();
        ring.start();
        ring.enqueue(&[6; 16]);
        ring.stop();

        assert_eq!(ring.state(), PlaybackState::Stopped);
        assert_eq!(ring.buffered_bytes(), 0);
    }

    #[test]
    fn test_playback_level() {
        let ring = small_ring();
        ring.start();
        let loud: Vec<u8> = [16384i16, -16384, 16384, -16384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        ring.enqueue(&loud);
        ring.enqueue(&loud);

        ring.read_next_frame();
        assert!((ring.playback_level() - 0.5).abs() < 0.001);

        ring.stop();
        ring.read_next_frame();
        assert_eq!(ring.playback_level(), 0.0);
    }
}
