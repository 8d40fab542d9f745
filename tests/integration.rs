//! Integration tests for call-audio.
//!
//! These drive the public API end to end: network frames in, WAV files and
//! sidecar records out.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use call_audio::{
    event_callback, AudioBridge, AudioFormat, AudioFrame, AudioSource, CaptureBuffer,
    CaptureEvent, FileManager, ManagerConfig, MediaKind, NetworkAudioIntake, PlaybackConfig,
    PlaybackRing, PlaybackState, RecordingEvent, RecordingManager, RecordingOptions,
    RecordingState, RecordingValidation, RetentionPolicy, WavHeader,
};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> ManagerConfig {
    ManagerConfig {
        tick_interval: Duration::from_millis(10),
        encoder_retry_delay: Duration::from_millis(1),
        min_free_space_bytes: 0,
        ..Default::default()
    }
}

fn options(dir: &Path) -> RecordingOptions {
    RecordingOptions {
        file_name_template: "{id}".to_string(),
        ..RecordingOptions::new(dir)
    }
}

/// Canonical 8kHz mono 16-bit header declaring `data_size` bytes.
fn pcm16_header(data_size: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_size).to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&8000u32.to_le_bytes());
    header.extend_from_slice(&16_000u32.to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());
    header
}

fn remote() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

#[tokio::test]
async fn test_end_to_end_pcm_recording() {
    init_tracing();
    let dir = tempdir().unwrap();
    let manager = RecordingManager::builder()
        .with_config(fast_config())
        .build()
        .unwrap();

    manager.start_recording(options(dir.path())).await.unwrap();
    for value in [10u8, 20, 30] {
        let frame = AudioFrame::new(
            vec![value, 0],
            AudioFormat::pcm16(8000, 1),
            AudioSource::TelephonyIn,
        )
        .unwrap();
        manager.process_audio_frame(frame).unwrap();
    }
    let path = manager.stop_recording().await.unwrap().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let header = WavHeader::parse(&bytes).unwrap();
    assert_eq!(header.data_size, 6);
    assert_eq!(header.format, AudioFormat::pcm16(8000, 1));
    assert_eq!(manager.current_status().unwrap().bytes_recorded, 6);

    let files = FileManager::new().unwrap();
    let listed = files.list_recordings(dir.path()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, path);
    assert_eq!(listed[0].metadata.as_ref().map(|m| m.bytes_recorded), Some(6));

    assert!(files.validate_recording(&path).unwrap().is_valid());
}

#[tokio::test]
async fn test_bridge_feeds_active_recording() {
    init_tracing();
    let dir = tempdir().unwrap();
    let bridge = Arc::new(AudioBridge::new());
    bridge.start().unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let completed_clone = Arc::clone(&completed);
    let manager = RecordingManager::builder()
        .bridge(Arc::clone(&bridge))
        .with_config(fast_config())
        .on_event(move |event| {
            if let RecordingEvent::StatusChanged(status) = event {
                if status.state == RecordingState::Completed {
                    completed_clone.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
        .build()
        .unwrap();

    // No recorder yet: nothing is delivered.
    assert!(!bridge.forward_audio_data(
        AudioSource::TelephonyIn,
        vec![1, 0],
        AudioFormat::pcm16(8000, 1)
    ));

    manager.start_recording(options(dir.path())).await.unwrap();
    assert!(bridge.has_target());
    assert!(bridge.forward_audio_data(
        AudioSource::TelephonyIn,
        vec![1, 0, 2, 0],
        AudioFormat::pcm16(8000, 1)
    ));

    let path = manager.stop_recording().await.unwrap().unwrap();
    assert!(!bridge.has_target());
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    let stats = bridge.stats();
    assert_eq!(stats.total_frames, 2);
    assert_eq!(stats.delivered_frames, 1);
    assert_eq!(stats.source(AudioSource::TelephonyIn).bytes, 6);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(WavHeader::parse(&bytes).unwrap().data_size, 4);
}

#[tokio::test]
async fn test_ulaw_leg_is_transcoded_to_pcm() {
    init_tracing();
    let dir = tempdir().unwrap();
    let manager = RecordingManager::builder()
        .leg_format(AudioSource::TelephonyIn, AudioFormat::ulaw_8k())
        .with_config(fast_config())
        .build()
        .unwrap();

    manager.start_recording(options(dir.path())).await.unwrap();
    let capture = manager.capture_buffer();
    assert!(capture.on_network_audio(remote(), MediaKind::Audio, &[0xFF; 4], AudioSource::TelephonyIn));
    assert!(!capture.on_network_audio(remote(), MediaKind::Video, &[0xFF; 4], AudioSource::TelephonyIn));

    let path = manager.stop_recording().await.unwrap().unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let header = WavHeader::parse(&bytes).unwrap();
    // 4 µ-law samples become 4 16-bit samples; 0xFF decodes to silence.
    assert_eq!(header.data_size, 8);
    assert!(bytes[44..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_cancelled_recording_leaves_nothing_behind() {
    init_tracing();
    let dir = tempdir().unwrap();
    let manager = RecordingManager::builder()
        .with_config(fast_config())
        .build()
        .unwrap();

    manager.start_recording(options(dir.path())).await.unwrap();
    manager.cancel_recording().await.unwrap();

    assert_eq!(manager.current_status().unwrap().state, RecordingState::Cancelled);
    let files = FileManager::new().unwrap();
    assert!(files.list_recordings(dir.path()).unwrap().is_empty());
}

#[test]
fn test_capture_overflow_keeps_newest_frames() {
    init_tracing();
    let overflows = Arc::new(AtomicUsize::new(0));
    let overflows_clone = Arc::clone(&overflows);
    let buffer = CaptureBuffer::new(2).with_event_callback(event_callback(move |event: CaptureEvent| {
        if let CaptureEvent::BufferOverflow { removed_count, .. } = event {
            overflows_clone.fetch_add(removed_count, Ordering::SeqCst);
        }
    }));
    buffer
        .start_capture([(AudioSource::RealtimeIn, AudioFormat::pcm16(8000, 1))])
        .unwrap();

    for value in 1u8..=3 {
        assert!(buffer.on_network_audio(remote(), MediaKind::Audio, &[value, 0], AudioSource::RealtimeIn));
    }

    assert_eq!(overflows.load(Ordering::SeqCst), 1);
    let frames = buffer.get_buffered_frames(None).unwrap();
    let firsts: Vec<u8> = frames.iter().map(|f| f.data()[0]).collect();
    assert_eq!(firsts, vec![2, 3]);
    assert_eq!(frames[0].sequence_number(), Some(1));

    let stats = buffer.stats();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.overflow_count, 1);
}

#[test]
fn test_playback_prebuffers_then_plays() {
    init_tracing();
    let ring = PlaybackRing::new(PlaybackConfig {
        prebuffer_duration: Duration::from_millis(20),
        ..Default::default()
    });
    // 20ms at 8kHz is 320 bytes, one 160-sample frame.
    assert_eq!(ring.prebuffer_threshold_bytes(), 320);
    assert_eq!(ring.frame_bytes(), 320);

    ring.start();
    ring.enqueue(&[1u8; 200]);
    assert_eq!(ring.state(), PlaybackState::Buffering);
    assert!(ring.read_next_frame().iter().all(|&b| b == 0));

    ring.enqueue(&[1u8; 200]);
    assert_eq!(ring.state(), PlaybackState::Playing);
    let frame = ring.read_next_frame();
    assert_eq!(frame.len(), 320);
    assert!(frame.iter().all(|&b| b == 1));
    assert_eq!(ring.buffered_bytes(), 80);

    // Short read pads with silence and drops back to buffering.
    let frame = ring.read_next_frame();
    assert!(frame[..80].iter().all(|&b| b == 1));
    assert!(frame[80..].iter().all(|&b| b == 0));
    assert_eq!(ring.state(), PlaybackState::Buffering);

    ring.stop();
    assert_eq!(ring.state(), PlaybackState::Stopped);
    assert_eq!(ring.buffered_bytes(), 0);
}

#[tokio::test]
async fn test_retention_cleanup_keeps_newest() {
    init_tracing();
    let dir = tempdir().unwrap();
    let manager = RecordingManager::builder()
        .with_config(fast_config())
        .build()
        .unwrap();

    let mut paths = Vec::new();
    for _ in 0..3 {
        manager.start_recording(options(dir.path())).await.unwrap();
        paths.push(manager.stop_recording().await.unwrap().unwrap());
        // Distinct modification times.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let files = FileManager::new().unwrap();
    let removed = files
        .cleanup(
            dir.path(),
            &RetentionPolicy {
                max_files: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(removed.len(), 2);
    let remaining = files.list_recordings(dir.path()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, paths[2]);
}

#[test]
fn test_truncated_header_is_recovered() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("call.wav");

    // Header claims no data but four bytes follow, as after a crash.
    let mut bytes = pcm16_header(0);
    bytes.extend_from_slice(&[1, 0, 2, 0]);
    std::fs::write(&path, &bytes).unwrap();

    let files = FileManager::new().unwrap();
    assert_eq!(
        files.validate_recording(&path).unwrap(),
        RecordingValidation::SizeMismatch {
            declared: 0,
            actual: 4
        }
    );

    let recovered = files
        .recover_recording(&path, &AudioFormat::pcm16(8000, 1), &[])
        .unwrap();
    assert!(recovered.is_valid());
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(WavHeader::parse(&bytes).unwrap().data_size, 4);
}
