//! Audio format descriptors, codec identifiers, and the demux/decode
//! pipeline types.
//!
//! The pipeline moves data through three layers:
//!
//! * [`Input`] — a container demuxer resolved from a URI or stream,
//!   producing decoded [`Packet`]s and [`StreamInfo`] metadata
//! * [`Decoder`] — a codec adapter driven by the demuxer protocol
//!   (`send` encoded bytes, `recv` decoded frames)
//! * [`Packet`] — interleaved `f32` samples crossing the decoder→caller
//!   boundary
//!
//! [`Format`] describes an uncompressed stream shape; [`CodecFormat`]
//! extends it with everything a decoder needs to configure itself.

use crate::error::{Error, Result};
use crate::io::Buffer;

pub mod channel;
pub mod codec;
pub mod decoder;
pub mod demuxer;
pub mod input;
pub mod packet;
pub mod pcm;

pub use decoder::{DecodeStatus, Decoder};
pub use demuxer::{Demuxer, Feed, FeedStatus};
pub use input::{Input, OpenMode, StreamInfo};
pub use packet::Packet;

pub const MIN_CHANNELS: u32 = 1;
pub const MAX_CHANNELS: u32 = 18;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Positional channel bits, ordered per the canonical (Xiph-style)
/// channel layout.
pub mod channel_bit {
    pub const FRONT_LEFT: u32 = 1 << 0;
    pub const FRONT_RIGHT: u32 = 1 << 1;
    pub const FRONT_CENTER: u32 = 1 << 2;
    pub const LFE: u32 = 1 << 3;
    pub const BACK_LEFT: u32 = 1 << 4;
    pub const BACK_RIGHT: u32 = 1 << 5;
    pub const FRONT_CENTER_LEFT: u32 = 1 << 6;
    pub const FRONT_CENTER_RIGHT: u32 = 1 << 7;
    pub const BACK_CENTER: u32 = 1 << 8;
    pub const SIDE_LEFT: u32 = 1 << 9;
    pub const SIDE_RIGHT: u32 = 1 << 10;
    pub const TOP_CENTER: u32 = 1 << 11;
    pub const TOP_FRONT_LEFT: u32 = 1 << 12;
    pub const TOP_FRONT_CENTER: u32 = 1 << 13;
    pub const TOP_FRONT_RIGHT: u32 = 1 << 14;
    pub const TOP_BACK_LEFT: u32 = 1 << 15;
    pub const TOP_BACK_CENTER: u32 = 1 << 16;
    pub const TOP_BACK_RIGHT: u32 = 1 << 17;
}

/// Common channel layouts as bitmask constants.
pub mod layout {
    use super::channel_bit as ch;

    pub const MONO: u32 = ch::FRONT_CENTER;
    pub const STEREO: u32 = ch::FRONT_LEFT | ch::FRONT_RIGHT;
    pub const SURROUND: u32 = STEREO | ch::FRONT_CENTER;
    pub const QUAD: u32 = STEREO | ch::BACK_LEFT | ch::BACK_RIGHT;
    pub const L4_0: u32 = SURROUND | ch::BACK_CENTER;
    pub const L5_0: u32 = SURROUND | ch::BACK_LEFT | ch::BACK_RIGHT;
    pub const L5_0_SIDE: u32 = SURROUND | ch::SIDE_LEFT | ch::SIDE_RIGHT;
    pub const L6_0: u32 = L5_0 | ch::BACK_CENTER;
    pub const L6_0_SIDE: u32 = L5_0_SIDE | ch::BACK_CENTER;
    pub const L7_0: u32 = L5_0 | ch::SIDE_LEFT | ch::SIDE_RIGHT;
    pub const L7_0_FRONT: u32 = L5_0 | ch::FRONT_CENTER_LEFT | ch::FRONT_CENTER_RIGHT;

    pub const L2_1: u32 = STEREO | ch::LFE;
    pub const L4_1: u32 = L4_0 | ch::LFE;
    pub const L5_1: u32 = L5_0 | ch::LFE;
    pub const L5_1_SIDE: u32 = L5_0_SIDE | ch::LFE;
    pub const L6_1: u32 = L6_0 | ch::LFE;
    pub const L6_1_SIDE: u32 = L6_0_SIDE | ch::LFE;
    pub const L7_1: u32 = L7_0 | ch::LFE;
    pub const L7_1_FRONT: u32 = L7_0_FRONT | ch::LFE;
}

/// Best-guess layout for a bare channel count.
#[must_use]
pub fn guess_channel_layout(channels: u32) -> u32 {
    match channels {
        1 => layout::MONO,
        2 => layout::STEREO,
        4 => layout::QUAD,
        5 => layout::L5_0,
        6 => layout::L5_1,
        7 => layout::L6_1,
        8 => layout::L7_1,
        _ => 0,
    }
}

/// Canonical layout for Vorbis/Opus/FLAC channel counts.
#[must_use]
pub fn xiph_channel_layout(channels: u32) -> u32 {
    match channels {
        1 => layout::MONO,
        2 => layout::STEREO,
        3 => layout::SURROUND,
        4 => layout::QUAD,
        5 => layout::L5_0,
        6 => layout::L5_1,
        7 => layout::L6_1_SIDE,
        8 => layout::L7_1,
        _ => 0,
    }
}

/// Default layout for AAC channel configurations.
#[must_use]
pub fn aac_channel_layout(channels: u32) -> u32 {
    match channels {
        1 => layout::MONO,
        2 => layout::STEREO,
        3 => layout::SURROUND,
        4 => layout::QUAD,
        5 => layout::L5_0,
        6 => layout::L5_1,
        8 => layout::L7_1_FRONT,
        _ => 0,
    }
}

/// Uncompressed stream shape.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Format {
    pub channels: u32,
    pub channel_layout: u32,
    pub sample_rate: u32,
}

impl Format {
    /// Checks the invariants: the channel count matches the layout
    /// popcount and both count and rate are in range.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` on any violation.
    pub fn validate(&self) -> Result<()> {
        if self.channels != self.channel_layout.count_ones() {
            return Err(Error::unsupported_format(format!(
                "channel count ({}) does not match the layout channel count ({})",
                self.channels,
                self.channel_layout.count_ones()
            )));
        }
        if self.channels < MIN_CHANNELS || self.channels > MAX_CHANNELS {
            return Err(Error::unsupported_format(format!(
                "invalid channel count: {} (valid: [{MIN_CHANNELS}, {MAX_CHANNELS}])",
                self.channels
            )));
        }
        if self.sample_rate < MIN_SAMPLE_RATE || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(Error::unsupported_format(format!(
                "invalid sample rate: {} (valid: [{MIN_SAMPLE_RATE}, {MAX_SAMPLE_RATE}])",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Encoded stream shape: everything a decoder needs to configure itself.
#[derive(Clone, Debug, Default)]
pub struct CodecFormat {
    /// Opaque codec-private configuration (e.g. Opus head, Xiph headers).
    pub extra: Buffer,
    /// PCM sample description flags (see [`pcm`]).
    pub flags: u32,
    /// Four-character codec identifier (see [`codec`]).
    pub codec_id: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: u32,
    pub bits_per_sample: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bit_rate: u32,
}

impl CodecFormat {
    /// The uncompressed shape of this stream.
    #[must_use]
    pub fn to_format(&self) -> Format {
        Format {
            channels: self.channels,
            channel_layout: self.channel_layout,
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_popcount() {
        let ok = Format {
            channels: 2,
            channel_layout: layout::STEREO,
            sample_rate: 44_100,
        };
        assert!(ok.validate().is_ok());

        let bad = Format {
            channels: 3,
            channel_layout: layout::STEREO,
            sample_rate: 44_100,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn validate_checks_ranges() {
        let slow = Format {
            channels: 1,
            channel_layout: layout::MONO,
            sample_rate: 4_000,
        };
        assert!(slow.validate().is_err());
    }

    #[test]
    fn layout_popcounts() {
        assert_eq!(layout::MONO.count_ones(), 1);
        assert_eq!(layout::STEREO.count_ones(), 2);
        assert_eq!(layout::L5_1.count_ones(), 6);
        assert_eq!(layout::L7_1.count_ones(), 8);
        assert_eq!(guess_channel_layout(6), layout::L5_1);
        assert_eq!(xiph_channel_layout(7), layout::L6_1_SIDE);
    }
}
