//! Sample format, bit depth and channel conversion.
//!
//! All conversions work on raw little-endian bytes. 8-bit PCM is unsigned
//! with a 128 offset; wider PCM depths are signed. Every function is total:
//! empty input yields `None`, anything else yields a buffer.

use crate::format::g711;
use crate::format::resample::resample_audio;
use crate::frame::{AudioFormat, AudioFrame, SampleEncoding};

/// Converts f32 samples to i16.
///
/// Input should be in the range [-1.0, 1.0].
/// Values outside this range are clamped.
///
/// Uses × 32767 (not 32768) for symmetric scaling. This means -1.0 maps
/// to -32767 rather than -32768, losing 1 LSB at the negative extreme.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Converts i16 samples to f32.
///
/// Output will be in the range [-1.0, 1.0].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Returns `true` for the PCM depths these conversions handle.
pub(crate) fn is_pcm_depth(bits: u8) -> bool {
    matches!(bits, 8 | 16 | 24 | 32)
}

/// Bytes used to store one sample of the given bit depth.
pub(crate) fn sample_width(bits: u8) -> usize {
    (usize::from(bits) / 8).max(1)
}

/// Reads one PCM sample as a signed value in its native range.
pub(crate) fn read_sample(bytes: &[u8]) -> i32 {
    match bytes.len() {
        1 => i32::from(bytes[0]) - 128,
        2 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        3 => {
            let raw = i32::from(bytes[0]) | i32::from(bytes[1]) << 8 | i32::from(bytes[2]) << 16;
            // sign-extend from 24 bits
            (raw << 8) >> 8
        }
        _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Appends one PCM sample of `width` bytes, clamping to its range.
pub(crate) fn write_sample(out: &mut Vec<u8>, value: i32, width: usize) {
    match width {
        1 => out.push((value.clamp(-128, 127) + 128) as u8),
        2 => out.extend_from_slice(&(value.clamp(-32768, 32767) as i16).to_le_bytes()),
        3 => {
            let value = value.clamp(-8_388_608, 8_388_607);
            out.extend_from_slice(&value.to_le_bytes()[..3]);
        }
        _ => out.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Decodes interleaved PCM bytes into signed samples, dropping any partial sample.
pub(crate) fn decode_pcm(data: &[u8], bits: u8) -> Vec<i32> {
    data.chunks_exact(sample_width(bits)).map(read_sample).collect()
}

/// Encodes signed samples as interleaved PCM bytes.
pub(crate) fn encode_pcm(samples: &[i32], bits: u8) -> Vec<u8> {
    let width = sample_width(bits);
    let mut out = Vec::with_capacity(samples.len() * width);
    for &sample in samples {
        write_sample(&mut out, sample, width);
    }
    out
}

fn rescale(value: i32, from_width: usize, to_width: usize) -> i32 {
    let shift = (to_width as i32 - from_width as i32) * 8;
    if shift >= 0 {
        value.checked_shl(shift as u32).unwrap_or(0)
    } else {
        value.checked_shr(shift.unsigned_abs()).unwrap_or(0)
    }
}

/// Changes the bit depth of interleaved PCM.
///
/// 16→8 yields exactly half the bytes (high byte, re-biased to unsigned);
/// 8→16 yields exactly double (scaled up by 256). Trailing bytes that do not
/// form a whole multi-channel frame are dropped. Depths other than 8, 16, 24
/// and 32 bits yield `None`.
///
/// # Example
///
/// ```
/// use call_audio::format::convert_bit_depth;
///
/// let pcm16 = vec![0x00, 0x40, 0x00, 0xC0]; // 16384, -16384
/// let pcm8 = convert_bit_depth(&pcm16, 16, 8, 1).unwrap();
/// assert_eq!(pcm8, vec![128 + 64, 128 - 64]);
/// ```
pub fn convert_bit_depth(data: &[u8], src_bits: u8, dst_bits: u8, channels: u8) -> Option<Vec<u8>> {
    if data.is_empty() || !is_pcm_depth(src_bits) || !is_pcm_depth(dst_bits) {
        return None;
    }
    if src_bits == dst_bits {
        return Some(data.to_vec());
    }

    let src_width = sample_width(src_bits);
    let dst_width = sample_width(dst_bits);
    let frame_bytes = src_width * usize::from(channels.max(1));
    let whole = data.len() - data.len() % frame_bytes;

    let mut out = Vec::with_capacity(whole / src_width * dst_width);
    for sample in data[..whole].chunks_exact(src_width) {
        let value = rescale(read_sample(sample), src_width, dst_width);
        write_sample(&mut out, value, dst_width);
    }
    Some(out)
}

/// Changes the channel count of interleaved PCM.
///
/// Output channel `c` takes input channel `c % src` when widening (mono→stereo
/// duplicates), and averages every input channel `i` with `i % dst == c` when
/// narrowing (stereo→mono averages each pair).
///
/// # Example
///
/// ```
/// use call_audio::format::convert_channels;
///
/// let stereo = [100i16, 300].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<_>>();
/// let mono = convert_channels(&stereo, 2, 1, 16).unwrap();
/// assert_eq!(mono, 200i16.to_le_bytes().to_vec());
/// ```
pub fn convert_channels(data: &[u8], src_channels: u8, dst_channels: u8, bits: u8) -> Option<Vec<u8>> {
    if data.is_empty() || !is_pcm_depth(bits) {
        return None;
    }
    if src_channels == dst_channels {
        return Some(data.to_vec());
    }

    let src = usize::from(src_channels.max(1));
    let dst = usize::from(dst_channels.max(1));
    let width = sample_width(bits);
    let samples = decode_pcm(data, bits);

    let mut mixed = Vec::with_capacity(samples.len() / src * dst);
    for frame in samples.chunks_exact(src) {
        if dst > src {
            mixed.extend((0..dst).map(|c| frame[c % src]));
        } else {
            for c in 0..dst {
                let (sum, count) = frame
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| i % dst == c)
                    .fold((0i64, 0i64), |(sum, count), (_, &s)| {
                        (sum + i64::from(s), count + 1)
                    });
                mixed.push((sum / count.max(1)) as i32);
            }
        }
    }

    let mut out = Vec::with_capacity(mixed.len() * width);
    for sample in mixed {
        write_sample(&mut out, sample, width);
    }
    Some(out)
}

/// Decodes any supported encoding to 16-bit linear samples.
pub(crate) fn decode_to_linear16(data: &[u8], format: &AudioFormat) -> Vec<i16> {
    match format.encoding() {
        SampleEncoding::Alaw => g711::decode_alaw(data),
        SampleEncoding::Ulaw => g711::decode_ulaw(data),
        SampleEncoding::Float => data
            .chunks_exact(4)
            .map(|b| f32_to_i16(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect(),
        SampleEncoding::Pcm if !is_pcm_depth(format.bits_per_sample()) => Vec::new(),
        SampleEncoding::Pcm => {
            let width = sample_width(format.bits_per_sample());
            data.chunks_exact(width)
                .map(|s| rescale(read_sample(s), width, 2) as i16)
                .collect()
        }
    }
}

/// Encodes 16-bit linear samples into the target encoding.
fn encode_from_linear16(samples: &[i16], format: &AudioFormat) -> Vec<u8> {
    match format.encoding() {
        SampleEncoding::Alaw => g711::encode_alaw(samples),
        SampleEncoding::Ulaw => g711::encode_ulaw(samples),
        SampleEncoding::Float => samples
            .iter()
            .flat_map(|&s| i16_to_f32(s).to_le_bytes())
            .collect(),
        SampleEncoding::Pcm => {
            let widened: Vec<i32> = samples.iter().map(|&s| i32::from(s)).collect();
            let pcm16 = encode_pcm(&widened, 16);
            convert_bit_depth(&pcm16, 16, format.bits_per_sample(), format.channels())
                .unwrap_or_default()
        }
    }
}

/// Converts a frame to `target`.
///
/// A frame already in a compatible format is returned as-is without
/// allocating. Otherwise the frame is decoded to linear PCM if needed, then
/// bit depth, channel count and sample rate are converted in that order, and
/// finally the target encoding is applied. Source, timestamp and sequence
/// number carry over; the format becomes `target`.
pub fn convert_format(frame: AudioFrame, target: &AudioFormat) -> Option<AudioFrame> {
    if frame.is_empty() {
        return None;
    }
    if frame.format().is_compatible(target) {
        return Some(frame);
    }

    let source = *frame.format();

    // Work in linear PCM: companded and float input become 16-bit.
    let (linear, linear_bits) = if source.encoding() == SampleEncoding::Pcm {
        (frame.data().to_vec(), source.bits_per_sample())
    } else {
        let samples: Vec<i32> = decode_to_linear16(frame.data(), &source)
            .into_iter()
            .map(i32::from)
            .collect();
        (encode_pcm(&samples, 16), 16)
    };

    let target_bits = if target.encoding() == SampleEncoding::Pcm {
        target.bits_per_sample()
    } else {
        16
    };

    let data = convert_bit_depth(&linear, linear_bits, target_bits, source.channels())?;
    let data = convert_channels(&data, source.channels(), target.channels(), target_bits)?;
    let data = resample_audio(
        &data,
        source.sample_rate(),
        target.sample_rate(),
        target.channels(),
        target_bits,
    )?;

    let data = match target.encoding() {
        SampleEncoding::Pcm => data,
        _ => {
            let samples: Vec<i16> = decode_pcm(&data, 16).into_iter().map(|s| s as i16).collect();
            encode_from_linear16(&samples, target)
        }
    };

    if data.is_empty() {
        return None;
    }
    Some(frame.derive(data, *target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AudioSource;

    fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn pcm16_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_f32_to_i16_full_range() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(2.0), 32767);
    }

    #[test]
    fn test_i16_to_f32_full_range() {
        let min = i16_to_f32(-32768);
        assert!((min - (-1.0)).abs() < 0.001);
        assert_eq!(i16_to_f32(0), 0.0);
    }

    #[test]
    fn test_unsupported_depths_are_none() {
        assert!(convert_bit_depth(&[1, 0], 16, 64, 1).is_none());
        assert!(convert_bit_depth(&[1, 0, 0, 0, 0, 0, 0, 0], 64, 16, 1).is_none());
        assert!(convert_channels(&[1, 0], 1, 2, 12).is_none());
        assert_eq!(rescale(1, 1, 8), 0);
    }

    #[test]
    fn test_empty_input_is_none() {
        assert!(convert_bit_depth(&[], 16, 8, 1).is_none());
        assert!(convert_channels(&[], 1, 2, 16).is_none());
    }

    #[test]
    fn test_bit_depth_identity() {
        let data = pcm16_bytes(&[1, 2, 3]);
        assert_eq!(convert_bit_depth(&data, 16, 16, 1).unwrap(), data);
    }

    #[test]
    fn test_bit_depth_16_to_8_halves_length() {
        let data = pcm16_bytes(&[0, 32767, -32768, 256]);
        let out = convert_bit_depth(&data, 16, 8, 1).unwrap();
        assert_eq!(out.len(), data.len() / 2);
        assert_eq!(out, vec![128, 255, 0, 129]);
    }

    #[test]
    fn test_bit_depth_8_to_16_doubles_length() {
        let data = vec![128u8, 255, 0];
        let out = convert_bit_depth(&data, 8, 16, 1).unwrap();
        assert_eq!(out.len(), data.len() * 2);
        assert_eq!(pcm16_samples(&out), vec![0, 127 * 256, -128 * 256]);
    }

    #[test]
    fn test_bit_depth_16_to_24_sign_extends() {
        let data = pcm16_bytes(&[-1]);
        let out = convert_bit_depth(&data, 16, 24, 1).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(read_sample(&out), -256);
    }

    #[test]
    fn test_bit_depth_preserves_interleaving() {
        let data = pcm16_bytes(&[256, -256, 512, -512]);
        let out = convert_bit_depth(&data, 16, 8, 2).unwrap();
        assert_eq!(out, vec![129, 127, 130, 126]);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let data = pcm16_bytes(&[100, 200]);
        let out = convert_channels(&data, 1, 2, 16).unwrap();
        assert_eq!(out.len(), data.len() * 2);
        assert_eq!(pcm16_samples(&out), vec![100, 100, 200, 200]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let data = pcm16_bytes(&[100, 200, 300, 400]);
        let out = convert_channels(&data, 2, 1, 16).unwrap();
        assert_eq!(out.len(), data.len() / 2);
        assert_eq!(pcm16_samples(&out), vec![150, 350]);
    }

    #[test]
    fn test_stereo_to_mono_cancellation() {
        let data = pcm16_bytes(&[1000, -1000]);
        let out = convert_channels(&data, 2, 1, 16).unwrap();
        assert_eq!(pcm16_samples(&out), vec![0]);
    }

    #[test]
    fn test_channels_general_mapping() {
        // 4 -> 2: channel 0 averages inputs 0 and 2, channel 1 averages 1 and 3
        let data = pcm16_bytes(&[10, 20, 30, 40]);
        let out = convert_channels(&data, 4, 2, 16).unwrap();
        assert_eq!(pcm16_samples(&out), vec![20, 30]);

        // 2 -> 3: channel 2 repeats channel 0
        let data = pcm16_bytes(&[1, 2]);
        let out = convert_channels(&data, 2, 3, 16).unwrap();
        assert_eq!(pcm16_samples(&out), vec![1, 2, 1]);
    }

    #[test]
    fn test_convert_format_identity_returns_same_frame() {
        let format = AudioFormat::pcm16(8000, 1);
        let frame = AudioFrame::new(pcm16_bytes(&[1, 2, 3]), format, AudioSource::TelephonyIn)
            .unwrap()
            .with_sequence(9);
        let expected = frame.clone();
        let out = convert_format(frame, &format).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_convert_format_ulaw_to_pcm16() {
        let frame = AudioFrame::new(vec![0xFF; 160], AudioFormat::ulaw_8k(), AudioSource::TelephonyIn)
            .unwrap()
            .with_sequence(3);
        let target = AudioFormat::pcm16(8000, 1);
        let out = convert_format(frame, &target).unwrap();

        assert_eq!(out.len(), 320);
        assert!(out.data().iter().all(|&b| b == 0));
        assert_eq!(*out.format(), target);
        assert_eq!(out.source(), AudioSource::TelephonyIn);
        assert_eq!(out.sequence_number(), Some(3));
    }

    #[test]
    fn test_convert_format_full_chain() {
        // 8kHz mono 16-bit -> 16kHz stereo 16-bit
        let frame = AudioFrame::new(
            pcm16_bytes(&[1000; 80]),
            AudioFormat::pcm16(8000, 1),
            AudioSource::RealtimeIn,
        )
        .unwrap();
        let target = AudioFormat::pcm16(16000, 2);
        let out = convert_format(frame, &target).unwrap();

        // 80 frames -> 160 frames, 2 channels, 2 bytes
        assert_eq!(out.len(), 160 * 2 * 2);
        assert!(pcm16_samples(out.data()).iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_convert_format_pcm_to_alaw() {
        let frame = AudioFrame::new(
            pcm16_bytes(&[0; 10]),
            AudioFormat::pcm16(8000, 1),
            AudioSource::RealtimeOut,
        )
        .unwrap();
        let out = convert_format(frame, &AudioFormat::alaw_8k()).unwrap();
        assert_eq!(out.data(), &[0xD5; 10]);
    }

    #[test]
    fn test_convert_format_float_to_pcm() {
        let data: Vec<u8> = [0.5f32, -0.5].iter().flat_map(|s| s.to_le_bytes()).collect();
        let format = AudioFormat::new(8000, 1, 32, SampleEncoding::Float).unwrap();
        let frame = AudioFrame::new(data, format, AudioSource::RealtimeIn).unwrap();
        let out = convert_format(frame, &AudioFormat::pcm16(8000, 1)).unwrap();
        assert_eq!(pcm16_samples(out.data()), vec![16383, -16383]);
    }
}
