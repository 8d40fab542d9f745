//! Audio pipeline components.
//!
//! ```text
//! Network legs ─→ Bridge ─→ Capture Buffer ─→ Mixer/Converter ─→ Encoder
//!                  │
//!                  └─→ observers (meters)
//!
//! Synthesis ─→ Playback Ring ─→ audio clock (pull)
//! ```
//!
//! - **Bridge**: Always-on fan-out to whichever recorder is active
//! - **Capture Buffer**: Bounded FIFO; overflow evicts the oldest frames
//! - **Mixer**: Combines both directions of a leg into one stream
//! - **Playback Ring**: Pre-buffered queue drained one frame per clock pull

mod bridge;
mod capture;
mod level;
mod mixer;
mod playback;

pub use bridge::{AudioBridge, BridgeStats, RecordingTarget, SourceStats};
pub use capture::{CaptureBuffer, CaptureStats, DEFAULT_CAPTURE_BUFFER_SIZE};
pub use level::{rms_level, rms_level_pcm16};
pub use mixer::mix_frames;
pub use playback::{PlaybackRing, PlaybackState};
