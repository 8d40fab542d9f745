//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Encoding conversion (PCM, A-law, µ-law, float)
//! - Bit depth and channel count conversion
//! - Sample rate conversion (resampling)
//!
//! None of these functions panic. Empty input yields `None`.

mod convert;
pub mod g711;
mod resample;

pub use convert::{convert_bit_depth, convert_channels, convert_format, f32_to_i16, i16_to_f32};
pub use resample::resample_audio;

pub(crate) use convert::{decode_pcm, decode_to_linear16, encode_pcm};
