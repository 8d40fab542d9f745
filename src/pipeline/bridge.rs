//! Fan-out hub between the network legs and the active recorder.
//!
//! Legs push every frame they see into the bridge; they never need to know
//! whether a recording is running. The bridge forwards to at most one
//! registered [`RecordingTarget`] and reports traffic to passive observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::BridgeError;
use crate::event::{emit, BridgeEvent, EventCallback};
use crate::frame::{AudioFormat, AudioFrame};
use crate::source::AudioSource;

/// Something that consumes frames from the bridge.
///
/// Implemented by [`RecordingManager`](crate::RecordingManager).
pub trait RecordingTarget: Send + Sync {
    /// Returns `true` while frames should be delivered.
    fn is_recording(&self) -> bool;

    /// Accepts one frame. Must not block.
    fn process_audio_frame(&self, frame: AudioFrame);
}

/// Frame and byte counters for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Frames forwarded.
    pub frames: u64,
    /// Bytes forwarded.
    pub bytes: u64,
}

/// Snapshot of bridge traffic since the last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames forwarded across all sources.
    pub total_frames: u64,
    /// Bytes forwarded across all sources.
    pub total_bytes: u64,
    /// Frames delivered to a recording target.
    pub delivered_frames: u64,
    /// Per-source breakdown.
    pub per_source: HashMap<AudioSource, SourceStats>,
}

impl BridgeStats {
    /// Counters for one source (zero if it never sent anything).
    pub fn source(&self, source: AudioSource) -> SourceStats {
        self.per_source.get(&source).copied().unwrap_or_default()
    }
}

/// Always-on forwarding point for network audio.
///
/// # Example
///
/// ```
/// use call_audio::{AudioBridge, AudioFormat, AudioSource};
///
/// let bridge = AudioBridge::new();
/// bridge.start().unwrap();
/// bridge.forward_audio_data(AudioSource::TelephonyIn, vec![0xFF; 160], AudioFormat::ulaw_8k());
///
/// assert_eq!(bridge.stats().total_frames, 1);
/// ```
pub struct AudioBridge {
    running: AtomicBool,
    disposed: AtomicBool,
    target: Mutex<Option<Weak<dyn RecordingTarget>>>,
    stats: Mutex<BridgeStats>,
    on_event: Option<EventCallback<BridgeEvent>>,
}

impl AudioBridge {
    /// Creates a stopped bridge with no registered target.
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            target: Mutex::new(None),
            stats: Mutex::new(BridgeStats::default()),
            on_event: None,
        }
    }

    /// Sets the callback for [`BridgeEvent`]s.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback<BridgeEvent>) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn check(&self) -> Result<(), BridgeError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(BridgeError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Enables forwarding.
    pub fn start(&self) -> Result<(), BridgeError> {
        self.check()?;
        if !self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("audio bridge started");
        }
        Ok(())
    }

    /// Disables forwarding. Registration is kept.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::debug!("audio bridge stopped");
        }
    }

    /// Returns `true` while forwarding is enabled.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers the recording target.
    ///
    /// Only one target may be registered at a time. Registering the same
    /// target again is a no-op; a target that has been dropped no longer
    /// counts as registered.
    pub fn register<T>(&self, target: &Arc<T>) -> Result<(), BridgeError>
    where
        T: RecordingTarget + 'static,
    {
        self.check()?;
        let weak: Weak<dyn RecordingTarget> = Arc::downgrade(target) as Weak<T>;

        let mut slot = self.target.lock();
        if let Some(existing) = slot.as_ref() {
            if existing.strong_count() > 0 && !Weak::ptr_eq(existing, &weak) {
                return Err(BridgeError::AlreadyRegistered);
            }
        }
        *slot = Some(weak);
        tracing::debug!("recording target registered");
        Ok(())
    }

    /// Removes `target` if it is the registered one.
    pub fn unregister<T>(&self, target: &Arc<T>)
    where
        T: RecordingTarget + 'static,
    {
        let weak: Weak<dyn RecordingTarget> = Arc::downgrade(target) as Weak<T>;
        let mut slot = self.target.lock();
        if slot.as_ref().is_some_and(|existing| Weak::ptr_eq(existing, &weak)) {
            *slot = None;
            tracing::debug!("recording target unregistered");
        }
    }

    /// Returns `true` if a live target is registered.
    pub fn has_target(&self) -> bool {
        self.target
            .lock()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Forwards one chunk of audio.
    ///
    /// Does nothing if the bridge is stopped or disposed, or `data` is empty.
    /// Otherwise emits [`BridgeEvent::AudioReceived`] and, if the registered
    /// target is recording, hands it the frame. Returns `true` if the frame
    /// was delivered.
    pub fn forward_audio_data(&self, source: AudioSource, data: Vec<u8>, format: AudioFormat) -> bool {
        if self.disposed.load(Ordering::Acquire) || !self.is_running() || data.is_empty() {
            return false;
        }

        let bytes = data.len();
        emit(
            self.on_event.as_ref(),
            BridgeEvent::AudioReceived {
                source,
                bytes,
                format,
            },
        );

        let target = self.target.lock().as_ref().and_then(Weak::upgrade);
        let delivered = match target {
            Some(target) if target.is_recording() => match AudioFrame::new(data, format, source) {
                Ok(frame) => {
                    target.process_audio_frame(frame);
                    true
                }
                Err(_) => false,
            },
            _ => false,
        };

        let mut stats = self.stats.lock();
        stats.total_frames += 1;
        stats.total_bytes += bytes as u64;
        if delivered {
            stats.delivered_frames += 1;
        }
        let per_source = stats.per_source.entry(source).or_default();
        per_source.frames += 1;
        per_source.bytes += bytes as u64;

        delivered
    }

    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats.lock().clone()
    }

    /// Zeroes every counter.
    pub fn reset_stats(&self) {
        *self.stats.lock() = BridgeStats::default();
    }

    /// Stops forwarding and drops the registration. Later `start` and
    /// `register` calls fail; forwarding silently does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        *self.target.lock() = None;
        tracing::debug!("audio bridge disposed");
    }
}

impl Default for AudioBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBridge")
            .field("running", &self.is_running())
            .field("has_target", &self.has_target())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_callback;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        recording: AtomicBool,
        frames: Mutex<Vec<AudioFrame>>,
    }

    impl RecordingTarget for Recorder {
        fn is_recording(&self) -> bool {
            self.recording.load(Ordering::SeqCst)
        }

        fn process_audio_frame(&self, frame: AudioFrame) {
            self.frames.lock().push(frame);
        }
    }

    fn recorder(recording: bool) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        recorder.recording.store(recording, Ordering::SeqCst);
        recorder
    }

    #[test]
    fn test_forward_requires_running() {
        let bridge = AudioBridge::new();
        let target = recorder(true);
        bridge.register(&target).unwrap();

        assert!(!bridge.forward_audio_data(AudioSource::TelephonyIn, vec![1], AudioFormat::ulaw_8k()));
        assert_eq!(bridge.stats().total_frames, 0);

        bridge.start().unwrap();
        assert!(bridge.forward_audio_data(AudioSource::TelephonyIn, vec![1], AudioFormat::ulaw_8k()));
        assert_eq!(target.frames.lock().len(), 1);
    }

    #[test]
    fn test_forward_skips_idle_target_but_notifies_observers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let bridge = AudioBridge::new().with_event_callback(event_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let target = recorder(false);
        bridge.register(&target).unwrap();
        bridge.start().unwrap();

        assert!(!bridge.forward_audio_data(AudioSource::RealtimeIn, vec![1, 2], AudioFormat::pcm16(16000, 1)));
        assert!(!bridge.forward_audio_data(AudioSource::RealtimeIn, Vec::new(), AudioFormat::pcm16(16000, 1)));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(target.frames.lock().is_empty());
    }

    #[test]
    fn test_registration_is_exclusive() {
        let bridge = AudioBridge::new();
        let first = recorder(true);
        let second = recorder(true);

        bridge.register(&first).unwrap();
        bridge.register(&first).unwrap();
        assert_eq!(bridge.register(&second), Err(BridgeError::AlreadyRegistered));

        bridge.unregister(&second);
        assert!(bridge.has_target());
        bridge.unregister(&first);
        bridge.register(&second).unwrap();
    }

    #[test]
    fn test_dropped_target_frees_slot() {
        let bridge = AudioBridge::new();
        let first = recorder(true);
        bridge.register(&first).unwrap();
        drop(first);

        assert!(!bridge.has_target());
        bridge.register(&recorder(true)).unwrap();
    }

    #[test]
    fn test_stats_per_source_and_reset() {
        let bridge = AudioBridge::new();
        bridge.start().unwrap();
        bridge.forward_audio_data(AudioSource::TelephonyIn, vec![0; 160], AudioFormat::ulaw_8k());
        bridge.forward_audio_data(AudioSource::TelephonyIn, vec![0; 160], AudioFormat::ulaw_8k());
        bridge.forward_audio_data(AudioSource::RealtimeOut, vec![0; 320], AudioFormat::pcm16(8000, 1));

        let stats = bridge.stats();
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.total_bytes, 640);
        assert_eq!(stats.source(AudioSource::TelephonyIn).frames, 2);
        assert_eq!(stats.source(AudioSource::RealtimeOut).bytes, 320);
        assert_eq!(stats.source(AudioSource::RealtimeIn), SourceStats::default());

        bridge.reset_stats();
        assert_eq!(bridge.stats(), BridgeStats::default());
    }

    #[test]
    fn test_dispose() {
        let bridge = AudioBridge::new();
        bridge.start().unwrap();
        bridge.dispose();

        assert!(!bridge.forward_audio_data(AudioSource::TelephonyIn, vec![1], AudioFormat::ulaw_8k()));
        assert_eq!(bridge.start(), Err(BridgeError::Disposed));
        assert_eq!(bridge.register(&recorder(true)), Err(BridgeError::Disposed));
    }
}
