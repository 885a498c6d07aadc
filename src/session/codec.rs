//! PCM wire codec: f32 samples to base64 16-bit PCM and back.
//!
//! Outbound audio is 16 kHz mono, inbound model audio is 24 kHz mono.
//! Both directions use little-endian signed 16-bit PCM under base64.

use base64::{engine::general_purpose, Engine as _};

/// Convert a float sample in [-1.0, 1.0] to a signed 16-bit value.
///
/// Negative values scale by 32768 and non-negative by 32767 so both ends
/// of the range map onto the full i16 span without overflow.
#[inline]
fn sample_to_i16(sample: f32) -> i16 {
    let scaled = if sample < 0.0 {
        sample * 32768.0
    } else {
        sample * 32767.0
    };
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode float samples as base64 little-endian 16-bit PCM.
pub fn encode_pcm(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    general_purpose::STANDARD.encode(&bytes)
}

/// Decode raw little-endian PCM bytes into float samples. A trailing odd
/// byte is dropped rather than treated as an error; the server frames
/// payloads on sample boundaries.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_within_quantization_error() {
        let samples: Vec<f32> = (-100..=100).map(|i| i as f32 / 100.0).collect();
        let bytes = general_purpose::STANDARD
            .decode(encode_pcm(&samples))
            .unwrap();
        let decoded = bytes_to_samples(&bytes);
        assert_eq!(decoded.len(), samples.len());
        for (orig, back) in samples.iter().zip(decoded.iter()) {
            assert!(
                (orig - back).abs() <= 1.0 / 32768.0,
                "sample {} decoded as {}",
                orig,
                back
            );
        }
    }

    #[test]
    fn full_scale_endpoints() {
        assert_eq!(sample_to_i16(-1.0), i16::MIN);
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn out_of_range_input_clamps() {
        assert_eq!(sample_to_i16(2.0), i16::MAX);
        assert_eq!(sample_to_i16(-2.0), i16::MIN);
    }

    #[test]
    fn trailing_odd_byte_is_dropped() {
        let samples = bytes_to_samples(&[0x00, 0x80, 0xff]);
        assert_eq!(samples, vec![-1.0]);
    }

    #[test]
    fn empty_input_encodes_to_empty_payload() {
        assert!(encode_pcm(&[]).is_empty());
        assert!(bytes_to_samples(&[]).is_empty());
    }
}
