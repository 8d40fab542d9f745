//! Signal level metering.

/// RMS of 16-bit samples, normalized to 0.0..=1.0.
///
/// Returns 0.0 for an empty slice.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = f64::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    ((sum_squares / samples.len() as f64).sqrt() as f32).min(1.0)
}

/// RMS of little-endian 16-bit PCM bytes. A trailing odd byte is ignored.
pub fn rms_level_pcm16(bytes: &[u8]) -> f32 {
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    rms_level(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(rms_level(&[0; 160]), 0.0);
    }

    #[test]
    fn test_full_scale_square_wave() {
        let level = rms_level(&[i16::MIN, i16::MIN]);
        assert!((level - 1.0).abs() < f32::EPSILON);

        let level = rms_level(&[16384, -16384]);
        assert!((level - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_pcm16_bytes() {
        let bytes: Vec<u8> = [16384i16, -16384].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert!((rms_level_pcm16(&bytes) - 0.5).abs() < 0.001);
    }
}
