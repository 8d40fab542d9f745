//! Background task that moves captured frames into the encoder.
//!
//! Every tick the writer drains the capture buffer, pairs opposite
//! directions of the same leg, converts to the output format and writes.
//! Encoder calls are retried with exponential backoff and bounded by a
//! timeout; a frame that still fails is dropped and reported to the monitor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::RecordingOptions;
use crate::error::EncoderError;
use crate::format::{convert_format, decode_to_linear16};
use crate::frame::{AudioFormat, AudioFrame};
use crate::pipeline::{mix_frames, rms_level};
use crate::recording::manager::ManagerInner;
use crate::recording::RecordingState;
use crate::source::AudioSource;

/// Command sent to the writer task.
pub(super) enum WriterCommand {
    /// Write what is still buffered, then exit.
    Stop,
    /// Exit without writing anything else.
    Discard,
}

/// Which limit ended a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RecordingLimit {
    Duration,
    FileSize,
}

/// What the writer did over its lifetime.
#[derive(Debug, Default)]
pub(super) struct WriterReport {
    pub bytes_recorded: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub limit: Option<RecordingLimit>,
}

pub(super) struct RecordingWriter {
    inner: Arc<ManagerInner>,
    format: AudioFormat,
    output_path: PathBuf,
    mix_directions: bool,
    max_duration: Duration,
    max_file_size: u64,
    report: WriterReport,
}

impl RecordingWriter {
    pub(super) fn new(
        inner: Arc<ManagerInner>,
        options: &RecordingOptions,
        format: AudioFormat,
        output_path: PathBuf,
    ) -> Self {
        Self {
            inner,
            format,
            output_path,
            mix_directions: options.record_both_parties,
            max_duration: options.max_duration,
            max_file_size: options.max_file_size,
            report: WriterReport::default(),
        }
    }

    /// Runs until told to stop or a recording limit is reached.
    pub(super) async fn run(mut self, mut cmd_rx: mpsc::Receiver<WriterCommand>) -> WriterReport {
        let mut ticker = tokio::time::interval(self.inner.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(limit) = self.tick().await {
                        tracing::info!(?limit, path = %self.output_path.display(), "recording limit reached");
                        self.report.limit = Some(limit);
                        Arc::clone(&self.inner).spawn_stop();
                        break;
                    }
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(WriterCommand::Stop) | None => {
                        self.tick().await;
                        break;
                    }
                    Some(WriterCommand::Discard) => break,
                },
            }
        }

        tracing::debug!(
            bytes = self.report.bytes_recorded,
            written = self.report.frames_written,
            dropped = self.report.frames_dropped,
            "recording writer finished"
        );
        self.report
    }

    /// Drains and writes one batch. Returns the limit if one was reached.
    async fn tick(&mut self) -> Option<RecordingLimit> {
        let capture = &self.inner.capture;
        let frames = capture.get_buffered_frames(None).unwrap_or_default();
        self.inner
            .monitor
            .record_buffer_status(capture.buffered_count(), capture.max_buffer_size(), false);

        if self.inner.state() == RecordingState::Paused {
            if !frames.is_empty() {
                tracing::trace!(discarded = frames.len(), "paused; frames discarded");
            }
            return None;
        }

        let frames = if self.mix_directions {
            pair_directions(frames)
        } else {
            frames
        };

        let mut samples = Vec::new();
        for frame in frames {
            let Some(frame) = convert_format(frame, &self.format) else {
                continue;
            };
            if self.write_with_retry(&frame).await {
                // Mixed frames carry the first direction's numbering only.
                let sequence_number = match frame.source() {
                    AudioSource::Mixed => None,
                    _ => frame.sequence_number(),
                };
                self.inner
                    .monitor
                    .record_audio_data(frame.len(), frame.source(), sequence_number);
                self.report.bytes_recorded += frame.len() as u64;
                self.report.frames_written += 1;
                samples.extend(decode_to_linear16(frame.data(), &self.format));
            } else {
                self.report.frames_dropped += 1;
            }
        }

        let duration = self
            .inner
            .publish_progress(self.report.bytes_recorded, rms_level(&samples));

        if duration >= self.max_duration {
            Some(RecordingLimit::Duration)
        } else if self.report.bytes_recorded >= self.max_file_size {
            Some(RecordingLimit::FileSize)
        } else {
            None
        }
    }

    /// Writes one frame, retrying with backoff. Returns `true` on success.
    async fn write_with_retry(&self, frame: &AudioFrame) -> bool {
        let encoder = &self.inner.encoder;
        let config = &self.inner.config;
        let monitor = &self.inner.monitor;

        let mut attempts = 0;
        let mut delay = config.encoder_retry_delay;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(config.encoder_timeout, encoder.write_frame(frame)).await {
                Ok(result) => result,
                Err(_) => Err(EncoderError::Timeout {
                    timeout_ms: config.encoder_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(()) => {
                    monitor.record_encoder_status(true, Some(started.elapsed()), Some(encoder.name()));
                    return true;
                }
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        encoder = encoder.name(),
                        attempt = attempts,
                        error = %e,
                        "encoder write failed"
                    );
                    if let EncoderError::FileError { path, .. } = &e {
                        monitor.record_file_system_status(path, false);
                    }

                    if attempts >= config.encoder_retry_attempts.max(1) {
                        monitor.record_encoder_status(false, None, Some(encoder.name()));
                        return false;
                    }

                    // Exponential backoff
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// Mixes each frame with the first later frame from the opposite direction
/// of the same leg. Frames without a compatible partner pass through alone.
/// Output keeps the order of the first frame of each pair.
pub(super) fn pair_directions(frames: Vec<AudioFrame>) -> Vec<AudioFrame> {
    let mut slots: Vec<Option<AudioFrame>> = frames.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());

    for i in 0..slots.len() {
        let Some(frame) = slots[i].take() else {
            continue;
        };
        let partner = frame.source().counterpart().and_then(|counterpart| {
            (i + 1..slots.len()).find(|&j| {
                slots[j].as_ref().is_some_and(|candidate| {
                    candidate.source() == counterpart && candidate.format().is_compatible(frame.format())
                })
            })
        });

        match partner.and_then(|j| slots[j].take()) {
            Some(other) => {
                if let Some(mixed) = mix_frames(vec![frame, other]) {
                    out.push(mixed);
                }
            }
            None => out.push(frame),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(source: AudioSource, value: u8) -> AudioFrame {
        AudioFrame::new(vec![value, 0, value, 0], AudioFormat::pcm16(8000, 1), source).unwrap()
    }

    #[test]
    fn test_pairs_opposite_directions() {
        let frames = vec![
            frame(AudioSource::TelephonyIn, 10),
            frame(AudioSource::TelephonyOut, 30),
        ];
        let out = pair_directions(frames);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source(), AudioSource::Mixed);
        assert_eq!(out[0].data(), &[20, 0, 20, 0]);
    }

    #[test]
    fn test_unpaired_frames_pass_through() {
        let frames = vec![
            frame(AudioSource::TelephonyIn, 1),
            frame(AudioSource::TelephonyIn, 2),
            frame(AudioSource::RealtimeIn, 3),
        ];
        let out = pair_directions(frames);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].source(), AudioSource::TelephonyIn);
        assert_eq!(out[2].source(), AudioSource::RealtimeIn);
    }

    #[test]
    fn test_legs_are_not_mixed_across() {
        let frames = vec![
            frame(AudioSource::TelephonyIn, 1),
            frame(AudioSource::RealtimeOut, 2),
            frame(AudioSource::RealtimeIn, 4),
            frame(AudioSource::TelephonyOut, 3),
        ];
        let out = pair_directions(frames);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.source() == AudioSource::Mixed));
        assert_eq!(out[0].data()[0], 2);
        assert_eq!(out[1].data()[0], 3);
    }

    #[test]
    fn test_incompatible_formats_are_not_paired() {
        let ulaw = AudioFrame::new(vec![0xFF; 4], AudioFormat::ulaw_8k(), AudioSource::TelephonyOut).unwrap();
        let out = pair_directions(vec![frame(AudioSource::TelephonyIn, 1), ulaw]);
        assert_eq!(out.len(), 2);
    }
}
