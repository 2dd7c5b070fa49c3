//! Channel-order remapping.
//!
//! Vorbis-family codecs (Vorbis, Opus, FLAC-in-Ogg) emit surround
//! channels in the Vorbis order; the pipeline's canonical order follows
//! the positional channel bits. [`vorbis_to_xiph`] gives the gather
//! permutation per channel count, and [`ChannelMapper`] applies an
//! arbitrary permutation to interleaved packets in place.

use crate::audio::{xiph_channel_layout, Packet, MAX_CHANNELS};
use crate::error::{Error, Result};

/// Gather permutations from Vorbis channel order to the canonical order:
/// `canonical[i] = source[table[i]]`.
const VORBIS_TO_XIPH: [&[u8]; 8] = [
    &[0],
    &[0, 1],
    &[0, 2, 1],
    &[0, 1, 2, 3],
    &[0, 2, 1, 3, 4],
    &[0, 2, 1, 5, 3, 4],
    &[0, 2, 1, 6, 5, 3, 4],
    &[0, 2, 1, 7, 5, 6, 3, 4],
];

/// The gather permutation from Vorbis order to canonical order for the
/// given channel count, or `None` outside 1..=8.
#[must_use]
pub fn vorbis_to_xiph(channels: u32) -> Option<&'static [u8]> {
    let index = usize::try_from(channels).ok()?.checked_sub(1)?;
    VORBIS_TO_XIPH.get(index).copied()
}

/// Applies a fixed channel permutation to interleaved packets.
pub struct ChannelMapper {
    map: [u8; MAX_CHANNELS as usize],
    channels: u32,
    layout: u32,
}

impl ChannelMapper {
    /// Builds a mapper from a gather permutation
    /// (`canonical[i] = source[map[i]]`) and the resulting layout mask.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` when the permutation is longer
    /// than the supported channel count or indexes outside itself.
    pub fn new(map: &[u8], layout: u32) -> Result<Self> {
        let channels = u32::try_from(map.len())
            .ok()
            .filter(|&n| n >= 1 && n <= MAX_CHANNELS)
            .ok_or_else(|| {
                Error::unsupported_format(format!("unsupported channel count: {}", map.len()))
            })?;
        if map.iter().any(|&src| u32::from(src) >= channels) {
            return Err(Error::unsupported_format(
                "channel permutation indexes outside the stream",
            ));
        }

        let mut table = [0u8; MAX_CHANNELS as usize];
        table[..map.len()].copy_from_slice(map);
        Ok(Self {
            map: table,
            channels,
            layout,
        })
    }

    /// Builds the canonicalizing mapper for a Vorbis-ordered stream.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` outside 1..=8 channels.
    pub fn vorbis(channels: u32) -> Result<Self> {
        let map = vorbis_to_xiph(channels).ok_or_else(|| {
            Error::unsupported_format(format!("unsupported channel count: {channels}"))
        })?;
        Self::new(map, xiph_channel_layout(channels))
    }

    /// The layout mask packets carry after [`ChannelMapper::process`].
    #[must_use]
    pub fn channel_layout(&self) -> u32 {
        self.layout
    }

    /// Permutes every frame of `pkt` in place.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` when the packet's channel count
    /// does not match the mapper.
    pub fn process(&self, pkt: &mut Packet) -> Result<()> {
        if pkt.channels() != self.channels {
            return Err(Error::unsupported_format(
                "channel mapper is not configured for packet",
            ));
        }

        let channels = self.channels as usize;
        let mut tmp = [0.0f32; MAX_CHANNELS as usize];
        for frame in pkt.samples_mut().chunks_exact_mut(channels) {
            for (i, slot) in tmp[..channels].iter_mut().enumerate() {
                *slot = frame[usize::from(self.map[i])];
            }
            frame.copy_from_slice(&tmp[..channels]);
        }
        pkt.set_channel_layout_n(self.layout, self.channels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    #[test]
    fn stereo_is_identity() {
        let mapper = ChannelMapper::vorbis(2).unwrap();
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::STEREO);
        pkt.assign(&[1.0, 2.0, 3.0, 4.0]);
        mapper.process(&mut pkt).unwrap();
        assert_eq!(pkt.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn surround_moves_center() {
        // Vorbis 3.0 order is [L, C, R]; canonical is [L, R, C].
        let mapper = ChannelMapper::vorbis(3).unwrap();
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::SURROUND);
        pkt.assign(&[10.0, 20.0, 30.0, 11.0, 21.0, 31.0]);
        mapper.process(&mut pkt).unwrap();
        assert_eq!(pkt.samples(), &[10.0, 30.0, 20.0, 11.0, 31.0, 21.0]);
    }

    #[test]
    fn five_one_permutation() {
        // Vorbis 5.1 order [L, C, R, Rl, Rr, LFE] -> [L, R, C, LFE, Rl, Rr].
        let mapper = ChannelMapper::vorbis(6).unwrap();
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::L5_1);
        pkt.assign(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        mapper.process(&mut pkt).unwrap();
        assert_eq!(pkt.samples(), &[1.0, 3.0, 2.0, 6.0, 4.0, 5.0]);
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let mapper = ChannelMapper::vorbis(2).unwrap();
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::MONO);
        pkt.assign(&[0.0]);
        assert!(mapper.process(&mut pkt).is_err());
    }
}
