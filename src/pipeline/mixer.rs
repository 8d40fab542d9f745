//! Combines same-format frames into one.
//!
//! Mixing averages rather than sums. A silent party halves the other's level.

use crate::format::{decode_pcm, decode_to_linear16, encode_pcm, g711};
use crate::frame::{AudioFrame, SampleEncoding};
use crate::source::AudioSource;

/// Mixes frames into a single frame tagged [`AudioSource::Mixed`].
///
/// - No frames: `None`.
/// - One frame: its data unchanged, relabeled `Mixed`.
/// - Several frames: every format must be compatible, otherwise `None`.
///   Output length is the shortest frame's length. A trailing partial
///   sample is copied from the first frame.
///
/// Linear PCM is averaged per sample. A-law and µ-law are decoded, averaged
/// and re-encoded, so the output stays one byte per sample. Float and any
/// other encoding fall back to averaging raw bytes; that is numerically wrong
/// for IEEE-754 samples and only kept as a crude last resort.
///
/// # Example
///
/// ```
/// use call_audio::{mix_frames, AudioFormat, AudioFrame, AudioSource};
///
/// let format = AudioFormat::pcm16(8000, 1);
/// let a = AudioFrame::new(100i16.to_le_bytes().to_vec(), format, AudioSource::TelephonyIn).unwrap();
/// let b = AudioFrame::new(300i16.to_le_bytes().to_vec(), format, AudioSource::TelephonyOut).unwrap();
///
/// let mixed = mix_frames(vec![a, b]).unwrap();
/// assert_eq!(mixed.data(), 200i16.to_le_bytes());
/// assert_eq!(mixed.source(), AudioSource::Mixed);
/// ```
pub fn mix_frames(frames: Vec<AudioFrame>) -> Option<AudioFrame> {
    let mut frames = frames.into_iter();
    let first = frames.next()?;
    let rest: Vec<AudioFrame> = frames.collect();

    if rest.is_empty() {
        return Some(first.relabel(AudioSource::Mixed));
    }

    let format = *first.format();
    if rest.iter().any(|f| !f.format().is_compatible(&format)) {
        return None;
    }

    let all: Vec<&AudioFrame> = std::iter::once(&first).chain(rest.iter()).collect();
    let len = all.iter().map(|f| f.len()).min().unwrap_or(0);

    let data = match format.encoding() {
        SampleEncoding::Pcm => mix_pcm(&all, len, format.bits_per_sample()),
        SampleEncoding::Alaw | SampleEncoding::Ulaw => mix_companded(&all, len, format.encoding()),
        SampleEncoding::Float => mix_bytes(&all, len),
    };

    if data.is_empty() {
        return None;
    }
    Some(first.derive(data, format).relabel(AudioSource::Mixed))
}

fn mix_pcm(frames: &[&AudioFrame], len: usize, bits: u8) -> Vec<u8> {
    let decoded: Vec<Vec<i32>> = frames
        .iter()
        .map(|f| decode_pcm(&f.data()[..len], bits))
        .collect();
    let count = decoded.len() as i64;
    let samples = decoded.first().map_or(0, Vec::len);

    let mixed: Vec<i32> = (0..samples)
        .map(|i| {
            let sum: i64 = decoded.iter().map(|d| i64::from(d[i])).sum();
            (sum / count) as i32
        })
        .collect();

    // encode_pcm clamps to the sample range
    let mut out = encode_pcm(&mixed, bits);
    if let Some(first) = frames.first() {
        out.extend_from_slice(&first.data()[out.len()..len]);
    }
    out
}

fn mix_companded(frames: &[&AudioFrame], len: usize, encoding: SampleEncoding) -> Vec<u8> {
    let decoded: Vec<Vec<i16>> = frames
        .iter()
        .map(|f| decode_to_linear16(&f.data()[..len], f.format()))
        .collect();
    let count = decoded.len() as i32;

    let mixed: Vec<i16> = (0..len)
        .map(|i| {
            let sum: i32 = decoded.iter().map(|d| i32::from(d[i])).sum();
            (sum / count).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
        })
        .collect();

    match encoding {
        SampleEncoding::Alaw => g711::encode_alaw(&mixed),
        _ => g711::encode_ulaw(&mixed),
    }
}

fn mix_bytes(frames: &[&AudioFrame], len: usize) -> Vec<u8> {
    let count = frames.len() as u32;
    (0..len)
        .map(|i| {
            let sum: u32 = frames.iter().map(|f| u32::from(f.data()[i])).sum();
            (sum / count) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFormat;

    fn frame(data: Vec<u8>, format: AudioFormat, source: AudioSource) -> AudioFrame {
        AudioFrame::new(data, format, source).unwrap()
    }

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_mix_empty() {
        assert!(mix_frames(Vec::new()).is_none());
    }

    #[test]
    fn test_mix_single_frame_relabels() {
        let f = frame(vec![1, 2, 3, 4], AudioFormat::pcm16(8000, 1), AudioSource::RealtimeIn)
            .with_sequence(4);
        let mixed = mix_frames(vec![f]).unwrap();
        assert_eq!(mixed.data(), &[1, 2, 3, 4]);
        assert_eq!(mixed.source(), AudioSource::Mixed);
        assert_eq!(mixed.sequence_number(), Some(4));
    }

    #[test]
    fn test_mix_pcm_averages() {
        let format = AudioFormat::pcm16(8000, 1);
        let a = frame(pcm16(&[1000, -2000, 32767]), format, AudioSource::TelephonyIn);
        let b = frame(pcm16(&[3000, 2000, 32767]), format, AudioSource::TelephonyOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.data(), pcm16(&[2000, 0, 32767]).as_slice());
    }

    #[test]
    fn test_mix_float_falls_back_to_bytes() {
        let format = AudioFormat::new(8000, 1, 32, SampleEncoding::Float).unwrap();
        let a = frame(vec![100; 4], format, AudioSource::RealtimeIn);
        let b = frame(vec![200; 4], format, AudioSource::RealtimeOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.data(), &[150, 150, 150, 150]);
    }

    #[test]
    fn test_mix_uses_shortest_length() {
        let format = AudioFormat::pcm16(8000, 1);
        let a = frame(pcm16(&[10, 10]), format, AudioSource::TelephonyIn);
        let b = frame(pcm16(&[30, 30, 30, 30]), format, AudioSource::TelephonyOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.len(), 4);
        assert_eq!(mixed.data(), pcm16(&[20, 20]).as_slice());
    }

    #[test]
    fn test_mix_odd_length_keeps_trailing_byte() {
        let format = AudioFormat::pcm16(8000, 1);
        let mut odd = pcm16(&[10]);
        odd.push(0x7F);
        let a = frame(odd, format, AudioSource::TelephonyIn);
        let b = frame(pcm16(&[30, 30]), format, AudioSource::TelephonyOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.len(), 3);
        assert_eq!(mixed.data(), &[20, 0, 0x7F]);
    }

    #[test]
    fn test_mix_rejects_incompatible_formats() {
        let a = frame(pcm16(&[1]), AudioFormat::pcm16(8000, 1), AudioSource::TelephonyIn);
        let b = frame(pcm16(&[1]), AudioFormat::pcm16(16000, 1), AudioSource::TelephonyOut);
        assert!(mix_frames(vec![a, b]).is_none());
    }

    #[test]
    fn test_mix_companded_stays_one_byte_per_sample() {
        let format = AudioFormat::ulaw_8k();
        let loud = g711::linear_to_ulaw(8000);
        let quiet = g711::linear_to_ulaw(-8000);
        let a = frame(vec![loud; 160], format, AudioSource::TelephonyIn);
        let b = frame(vec![quiet; 160], format, AudioSource::TelephonyOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.len(), 160);
        // Opposite samples cancel to (near) silence.
        let level = g711::ulaw_to_linear(mixed.data()[0]);
        assert!(level.abs() < 16, "{level}");
    }

    #[test]
    fn test_mix_alaw_identical_frames() {
        let format = AudioFormat::alaw_8k();
        let byte = g711::linear_to_alaw(1200);
        let a = frame(vec![byte; 8], format, AudioSource::RealtimeIn);
        let b = frame(vec![byte; 8], format, AudioSource::RealtimeOut);

        let mixed = mix_frames(vec![a, b]).unwrap();
        assert_eq!(mixed.data(), &[byte; 8]);
    }
}
