//! Sample rate conversion.
//!
//! Basic resampling using linear interpolation. Good enough for speech;
//! not a substitute for a polyphase resampler.

use crate::format::convert::{decode_pcm, encode_pcm, is_pcm_depth, sample_width};

/// Number of output frames for a rate change.
///
/// `round(frames × to / from)`, nudged so a downsample always shrinks and an
/// upsample always grows.
fn output_frames(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    let from = u64::from(from_rate.max(1));
    let to = u64::from(to_rate);
    let rounded = ((frames as u64 * to + from / 2) / from) as usize;

    if to < from {
        rounded.min(frames.saturating_sub(1))
    } else {
        rounded.max(frames + 1)
    }
}

/// Resamples interleaved samples, one channel at a time.
fn resample_samples(samples: &[i32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<i32> {
    let frames = samples.len() / channels;
    let out_frames = output_frames(frames, from_rate, to_rate);
    let mut output = Vec::with_capacity(out_frames * channels);

    if frames == 0 {
        return output;
    }

    let step = f64::from(from_rate) / f64::from(to_rate.max(1));
    for i in 0..out_frames {
        let src_pos = i as f64 * step;
        let src_idx = (src_pos.floor() as usize).min(frames - 1);
        let frac = src_pos - src_idx as f64;
        let next_idx = (src_idx + 1).min(frames - 1);

        for c in 0..channels {
            let s1 = f64::from(samples[src_idx * channels + c]);
            let s2 = f64::from(samples[next_idx * channels + c]);
            output.push((s1 + (s2 - s1) * frac.min(1.0)).round() as i32);
        }
    }

    output
}

/// Resamples interleaved PCM bytes from one sample rate to another.
///
/// Returns the input unchanged when the rates match. Otherwise returns
/// `None` for input shorter than one frame or an unsupported bit depth.
/// Trailing bytes that do not form a whole frame are dropped.
///
/// # Example
///
/// ```
/// use call_audio::format::resample_audio;
///
/// let input = vec![0u8; 320]; // 160 samples of 16-bit mono
/// let output = resample_audio(&input, 8000, 16000, 1, 16).unwrap();
/// assert_eq!(output.len(), 640);
/// ```
pub fn resample_audio(
    data: &[u8],
    src_rate: u32,
    dst_rate: u32,
    channels: u8,
    bits: u8,
) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }
    if src_rate == dst_rate {
        return Some(data.to_vec());
    }

    if !is_pcm_depth(bits) {
        return None;
    }

    let channels = usize::from(channels.max(1));
    let frame_bytes = sample_width(bits) * channels;
    let whole = data.len() - data.len() % frame_bytes;
    if whole == 0 {
        return None;
    }

    let samples = decode_pcm(&data[..whole], bits);
    let resampled = resample_samples(&samples, channels, src_rate, dst_rate);
    Some(encode_pcm(&resampled, bits))
}
