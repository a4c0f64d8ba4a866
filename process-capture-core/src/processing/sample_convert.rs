//! Conversion of raw OS sample bytes into the f32 output representation.
//!
//! All integer formats are little-endian signed PCM, scaled into [-1.0, 1.0).

use crate::models::format::SampleFormat;

const I16_SCALE: f32 = 32_768.0;
const I24_SCALE: f32 = 8_388_608.0;
const I32_SCALE: f32 = 2_147_483_648.0;

/// Decode `dst.len()` samples of `format` from `src` into `dst`.
///
/// Returns the number of samples actually decoded. If `src` holds fewer
/// samples than `dst` needs, the remainder of `dst` is zero-filled.
pub fn decode_into(format: SampleFormat, src: &[u8], dst: &mut [f32]) -> usize {
    let width = format.bytes_per_sample();
    let available = (src.len() / width).min(dst.len());
    let (head, tail) = dst.split_at_mut(available);

    match format {
        SampleFormat::F32 => {
            for (out, bytes) in head.iter_mut().zip(src.chunks_exact(4)) {
                *out = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        }
        SampleFormat::I16 => {
            for (out, bytes) in head.iter_mut().zip(src.chunks_exact(2)) {
                *out = i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / I16_SCALE;
            }
        }
        SampleFormat::I24 => {
            for (out, bytes) in head.iter_mut().zip(src.chunks_exact(3)) {
                // Place the 24 bits in the top of an i32 and shift back to sign-extend.
                let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
                *out = value as f32 / I24_SCALE;
            }
        }
        SampleFormat::I32 => {
            for (out, bytes) in head.iter_mut().zip(src.chunks_exact(4)) {
                let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                *out = value as f32 / I32_SCALE;
            }
        }
    }

    tail.fill(0.0);
    available
}

/// Encode f32 samples as raw little-endian bytes of `format`.
///
/// Used by backends that synthesize OS-shaped buffers.
pub fn encode(format: SampleFormat, samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    for &sample in samples {
        match format {
            SampleFormat::F32 => out.extend_from_slice(&sample.to_le_bytes()),
            SampleFormat::I16 => {
                let value = (sample.clamp(-1.0, 1.0) * I16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32);
                out.extend_from_slice(&(value as i16).to_le_bytes());
            }
            SampleFormat::I24 => {
                let value = (sample.clamp(-1.0, 1.0) * I24_SCALE).clamp(-I24_SCALE, I24_SCALE - 1.0) as i32;
                out.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            SampleFormat::I32 => {
                let value = (sample.clamp(-1.0, 1.0) as f64 * I32_SCALE as f64)
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn f32_passes_through() {
        let src = encode(SampleFormat::F32, &[0.25, -0.75, 1.5]);
        let mut dst = [0.0f32; 3];
        assert_eq!(decode_into(SampleFormat::F32, &src, &mut dst), 3);
        assert_eq!(dst, [0.25, -0.75, 1.5]);
    }

    #[test]
    fn i16_scales_to_unit_range() {
        let src: Vec<u8> = [i16::MIN, 0, 16_384, i16::MAX]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut dst = [0.0f32; 4];
        decode_into(SampleFormat::I16, &src, &mut dst);

        assert_eq!(dst[0], -1.0);
        assert_eq!(dst[1], 0.0);
        assert_relative_eq!(dst[2], 0.5);
        assert_relative_eq!(dst[3], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn i24_sign_extends() {
        // -1 and the most negative 24-bit value.
        let src = [0xff, 0xff, 0xff, 0x00, 0x00, 0x80];
        let mut dst = [0.0f32; 2];
        decode_into(SampleFormat::I24, &src, &mut dst);

        assert_relative_eq!(dst[0], -1.0 / I24_SCALE);
        assert_eq!(dst[1], -1.0);
    }

    #[test]
    fn i32_scales_to_unit_range() {
        let src: Vec<u8> = [i32::MIN, i32::MAX / 2]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut dst = [0.0f32; 2];
        decode_into(SampleFormat::I32, &src, &mut dst);

        assert_eq!(dst[0], -1.0);
        assert_relative_eq!(dst[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn short_source_is_zero_padded() {
        let src = encode(SampleFormat::I16, &[0.5]);
        let mut dst = [9.0f32; 3];
        assert_eq!(decode_into(SampleFormat::I16, &src, &mut dst), 1);
        assert_relative_eq!(dst[0], 0.5);
        assert_eq!(&dst[1..], &[0.0, 0.0]);
    }

    #[test]
    fn integer_encodings_decode_back_closely() {
        let samples = [0.0, 0.5, -0.5, 0.9];
        for format in [SampleFormat::I16, SampleFormat::I24, SampleFormat::I32] {
            let bytes = encode(format, &samples);
            assert_eq!(bytes.len(), samples.len() * format.bytes_per_sample());

            let mut dst = [0.0f32; 4];
            decode_into(format, &bytes, &mut dst);
            for (a, b) in samples.iter().zip(dst.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-4);
            }
        }
    }
}
