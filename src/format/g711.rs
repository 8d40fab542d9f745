//! ITU-T G.711 A-law and µ-law companding.
//!
//! Conversions operate on 16-bit linear samples. Encoders use the standard
//! segment search; decoders expand the segment and mantissa back to linear.

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

const ULAW_SEGMENT_END: [i32; 8] = [0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF, 0x3FFF, 0x7FFF];
const ALAW_SEGMENT_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

fn segment(value: i32, table: &[i32; 8]) -> usize {
    table
        .iter()
        .position(|&end| value <= end)
        .unwrap_or(table.len())
}

/// Encodes a 16-bit linear sample as µ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut value = i32::from(sample);
    let mask: u8 = if value < 0 {
        value = -value;
        0x7F
    } else {
        0xFF
    };
    value = value.min(ULAW_CLIP) + ULAW_BIAS;

    let seg = segment(value, &ULAW_SEGMENT_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }
    let mantissa = ((value >> (seg + 3)) & 0x0F) as u8;
    ((seg as u8) << 4 | mantissa) ^ mask
}

/// Decodes a µ-law byte to a 16-bit linear sample.
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let mut value = ((i32::from(byte) & 0x0F) << 3) + ULAW_BIAS;
    value <<= (i32::from(byte) & 0x70) >> 4;
    let value = if byte & 0x80 != 0 {
        ULAW_BIAS - value
    } else {
        value - ULAW_BIAS
    };
    value as i16
}

/// Encodes a 16-bit linear sample as A-law.
pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut value = i32::from(sample) >> 3;
    let mask: u8 = if value >= 0 {
        0xD5
    } else {
        value = -value - 1;
        0x55
    };

    let seg = segment(value, &ALAW_SEGMENT_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }
    let mut encoded = (seg as u8) << 4;
    encoded |= if seg < 2 {
        ((value >> 1) & 0x0F) as u8
    } else {
        ((value >> seg) & 0x0F) as u8
    };
    encoded ^ mask
}

/// Decodes an A-law byte to a 16-bit linear sample.
pub fn alaw_to_linear(byte: u8) -> i16 {
    let byte = byte ^ 0x55;
    let mut value = (i32::from(byte) & 0x0F) << 4;
    let seg = (i32::from(byte) & 0x70) >> 4;
    match seg {
        0 => value += 8,
        1 => value += 0x108,
        _ => {
            value += 0x108;
            value <<= seg - 1;
        }
    }
    let value = if byte & 0x80 != 0 { value } else { -value };
    value as i16
}

/// Decodes a µ-law buffer into 16-bit linear samples.
pub fn decode_ulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| ulaw_to_linear(b)).collect()
}

/// Decodes an A-law buffer into 16-bit linear samples.
pub fn decode_alaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| alaw_to_linear(b)).collect()
}

/// Encodes 16-bit linear samples as µ-law bytes.
pub fn encode_ulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_ulaw(s)).collect()
}

/// Encodes 16-bit linear samples as A-law bytes.
pub fn encode_alaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_alaw(s)).collect()
}
