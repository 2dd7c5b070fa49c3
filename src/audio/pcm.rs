//! PCM sample conversion (the "blitter").
//!
//! Converts integer or floating-point PCM in any common width, endianness
//! and interleaving into the canonical packet representation: interleaved
//! `f32` normalized to [-1, +1]. Also provides the G.711 A-law/µ-law
//! expansion used by the telephony codecs in AU and AIFF-C files.

use crate::audio::Packet;
use crate::error::{Error, Result};

/// Samples are signed integers (absent: unsigned).
pub const SIGNED_INT: u32 = 1 << 0;
/// Samples are IEEE floats (32- or 64-bit).
pub const IEEE_FLOAT: u32 = 1 << 1;
/// Samples are big-endian (absent: little-endian).
pub const BIG_ENDIAN: u32 = 1 << 2;
/// Source planes are channel-separated (absent: interleaved).
pub const NON_INTERLEAVED: u32 = 1 << 3;

/// Source sample description.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spec {
    /// Significant bits per sample.
    pub bits_per_sample: u32,
    /// Container bytes per sample (≥ `bits_per_sample / 8`; e.g. 24-bit
    /// samples carried in 4-byte words).
    pub bytes_per_sample: u32,
    pub channels: u32,
    pub flags: u32,
}

/// Converts source PCM into normalized interleaved `f32`.
pub struct Blitter {
    spec: Spec,
    scale: f32,
}

impl Blitter {
    /// Validates the spec and prepares the scale factor.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` for widths outside 8–64 bits or a
    /// float width other than 32/64.
    pub fn new(spec: Spec) -> Result<Self> {
        if spec.channels == 0 {
            return Err(Error::unsupported_format("PCM spec has zero channels"));
        }
        if spec.bytes_per_sample == 0 || spec.bytes_per_sample > 8 {
            return Err(Error::unsupported_format(format!(
                "unsupported PCM container width: {} bytes",
                spec.bytes_per_sample
            )));
        }
        if spec.bits_per_sample == 0 || spec.bits_per_sample > spec.bytes_per_sample * 8 {
            return Err(Error::unsupported_format(format!(
                "unsupported PCM sample width: {} bits in {} bytes",
                spec.bits_per_sample, spec.bytes_per_sample
            )));
        }
        if spec.flags & IEEE_FLOAT != 0 && spec.bits_per_sample != 32 && spec.bits_per_sample != 64
        {
            return Err(Error::unsupported_format(format!(
                "unsupported float PCM width: {} bits",
                spec.bits_per_sample
            )));
        }

        let scale = if spec.flags & IEEE_FLOAT != 0 {
            1.0
        } else {
            1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32
        };
        Ok(Self { spec, scale })
    }

    #[must_use]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Converts interleaved source bytes into `pkt`, replacing its
    /// content. Trailing bytes that do not form a whole frame are
    /// ignored.
    pub fn convert(&self, src: &[u8], pkt: &mut Packet) {
        let step = self.spec.bytes_per_sample as usize;
        let frame_bytes = step * self.spec.channels as usize;
        let whole = if frame_bytes == 0 {
            0
        } else {
            src.len() / frame_bytes * frame_bytes
        };

        let converted: Vec<f32> = src[..whole]
            .chunks_exact(step)
            .map(|sample| self.decode_sample(sample))
            .collect();
        pkt.clear();
        pkt.assign(&converted);
    }

    /// Converts `frames` frames of channel-separated `i32` planes
    /// (sign-extended to full width) into `pkt`, replacing its content.
    ///
    /// This is the path taken by decoders that already produce machine
    /// integers (FLAC).
    pub fn convert_planar_i32(&self, planes: &[&[i32]], frames: usize, pkt: &mut Packet) {
        pkt.clear();
        let mut interleaved = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                interleaved.push(plane[frame] as f32 * self.scale);
            }
        }
        pkt.assign(&interleaved);
    }

    /// Converts interleaved `i32` samples (sign-extended) into `pkt`.
    pub fn convert_i32(&self, src: &[i32], pkt: &mut Packet) {
        pkt.clear();
        let converted: Vec<f32> = src.iter().map(|&s| s as f32 * self.scale).collect();
        pkt.assign(&converted);
    }

    fn decode_sample(&self, bytes: &[u8]) -> f32 {
        let flags = self.spec.flags;
        let width = self.spec.bytes_per_sample as usize;

        if flags & IEEE_FLOAT != 0 {
            return if width == 4 {
                let raw: [u8; 4] = bytes.try_into().expect("sized sample");
                if flags & BIG_ENDIAN != 0 {
                    f32::from_be_bytes(raw)
                } else {
                    f32::from_le_bytes(raw)
                }
            } else {
                let raw: [u8; 8] = bytes.try_into().expect("sized sample");
                let value = if flags & BIG_ENDIAN != 0 {
                    f64::from_be_bytes(raw)
                } else {
                    f64::from_le_bytes(raw)
                };
                value as f32
            };
        }

        // Widen to u64, then shift into the sign position.
        let mut magnitude = 0u64;
        if flags & BIG_ENDIAN != 0 {
            for &b in bytes {
                magnitude = (magnitude << 8) | u64::from(b);
            }
        } else {
            for &b in bytes.iter().rev() {
                magnitude = (magnitude << 8) | u64::from(b);
            }
        }

        let bits = self.spec.bits_per_sample;
        let signed = if flags & SIGNED_INT != 0 {
            // Sign-extend from the sample width.
            let shift = 64 - bits;
            ((magnitude << shift) as i64) >> shift
        } else {
            magnitude as i64 - (1i64 << (bits - 1))
        };

        signed as f32 * self.scale
    }
}

/// Expands one A-law byte to a linear 16-bit sample (G.711).
#[must_use]
pub fn alaw_to_linear(value: u8) -> i16 {
    let value = value ^ 0x55;
    let mut t = i32::from(value & 0x0f) << 4;
    let seg = (value & 0x70) >> 4;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }
    let linear = if value & 0x80 != 0 { t } else { -t };
    linear as i16
}

/// Expands one µ-law byte to a linear 16-bit sample (G.711).
#[must_use]
pub fn ulaw_to_linear(value: u8) -> i16 {
    let value = !value;
    let mut t = (i32::from(value & 0x0f) << 3) + 0x84;
    t <<= (value & 0x70) >> 4;
    let linear = if value & 0x80 != 0 { 0x84 - t } else { t - 0x84 };
    linear as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    fn blit(spec: Spec, src: &[u8]) -> Vec<f32> {
        let blitter = Blitter::new(spec).unwrap();
        let mut pkt = Packet::new();
        pkt.set_channel_layout(match spec.channels {
            1 => layout::MONO,
            _ => layout::STEREO,
        });
        blitter.convert(src, &mut pkt);
        pkt.samples().to_vec()
    }

    #[test]
    fn s16_be_full_scale() {
        let spec = Spec {
            bits_per_sample: 16,
            bytes_per_sample: 2,
            channels: 1,
            flags: SIGNED_INT | BIG_ENDIAN,
        };
        let samples = blit(spec, &[0x7f, 0xff, 0x80, 0x00, 0x00, 0x00]);
        assert!((samples[0] - (32767.0 / 32768.0)).abs() < 1e-6);
        assert!((samples[1] + 1.0).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn s16_le_matches_be() {
        let be = Spec {
            bits_per_sample: 16,
            bytes_per_sample: 2,
            channels: 1,
            flags: SIGNED_INT | BIG_ENDIAN,
        };
        let le = Spec {
            bits_per_sample: 16,
            bytes_per_sample: 2,
            channels: 1,
            flags: SIGNED_INT,
        };
        assert_eq!(blit(be, &[0x12, 0x34]), blit(le, &[0x34, 0x12]));
    }

    #[test]
    fn u8_is_offset_binary() {
        let spec = Spec {
            bits_per_sample: 8,
            bytes_per_sample: 1,
            channels: 1,
            flags: 0,
        };
        let samples = blit(spec, &[0x80, 0x00, 0xff]);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] + 1.0).abs() < 1e-6);
        assert!(samples[2] > 0.99);
    }

    #[test]
    fn s24_be_sign_extension() {
        let spec = Spec {
            bits_per_sample: 24,
            bytes_per_sample: 3,
            channels: 1,
            flags: SIGNED_INT | BIG_ENDIAN,
        };
        let samples = blit(spec, &[0xff, 0xff, 0xff, 0x40, 0x00, 0x00]);
        assert!((samples[0] + 1.0 / 8_388_608.0).abs() < 1e-9);
        assert!((samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn f32_be_passthrough() {
        let spec = Spec {
            bits_per_sample: 32,
            bytes_per_sample: 4,
            channels: 1,
            flags: IEEE_FLOAT | BIG_ENDIAN,
        };
        let samples = blit(spec, &0.25f32.to_be_bytes());
        assert_eq!(samples, vec![0.25]);
    }

    #[test]
    fn incomplete_trailing_frame_is_dropped() {
        let spec = Spec {
            bits_per_sample: 16,
            bytes_per_sample: 2,
            channels: 2,
            flags: SIGNED_INT,
        };
        // Five bytes: one whole stereo frame plus a stray byte.
        let samples = blit(spec, &[0, 0, 0, 0, 0x7f]);
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn g711_zero_codes() {
        // Both companding laws map their "zero" code near silence.
        assert_eq!(ulaw_to_linear(0xff), 0);
        assert!(alaw_to_linear(0xd5).abs() <= 8);
    }

    #[test]
    fn g711_known_values() {
        // µ-law 0x00 is the most negative segment.
        assert!(ulaw_to_linear(0x00) < -30_000);
        // A-law 0x2a sits in the loud negative range.
        assert!(alaw_to_linear(0x2a) < -20_000);
    }
}
