//! Vorbis decoder adapter over lewton.
//!
//! The codec-private `extra` data carries the three Vorbis header
//! packets joined by Xiph lacing — either three 16-bit big-endian
//! lengths, or the older `02 <len1 runs> <len2 runs>` form where lengths
//! are sums of 255-valued bytes and the third length is implied.
//! Decoded planes arrive in Vorbis channel order and are permuted to the
//! canonical order before leaving the adapter.

use lewton::audio::{read_audio_packet_generic, PreviousWindowRight};
use lewton::header::{read_header_ident, read_header_setup, IdentHeader, SetupHeader};
use lewton::samples::InterleavedSamples;

use crate::audio::channel::ChannelMapper;
use crate::audio::codec;
use crate::audio::{xiph_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::VORBIS];

/// Splits joined Vorbis headers by either Xiph lacing scheme.
///
/// # Errors
///
/// Fails with `invalid_data_format` when the lengths are inconsistent.
pub(crate) fn split_xiph_headers(extra: &[u8]) -> Result<[&[u8]; 3]> {
    if extra.len() <= 2 {
        return Err(Error::invalid_data_format("Vorbis extradata is too small"));
    }

    // Newer form: three 16-bit big-endian lengths (the identification
    // header is always 30 bytes).
    let first_size = u16::from_be_bytes([extra[0], extra[1]]);
    if extra.len() >= 6 && first_size == 30 {
        let mut offset = 0;
        let mut headers: [&[u8]; 3] = [&[]; 3];
        for header in &mut headers {
            if offset + 2 > extra.len() {
                return Err(Error::invalid_data_format("bad Vorbis extradata lacing"));
            }
            let length = usize::from(u16::from_be_bytes([extra[offset], extra[offset + 1]]));
            offset += 2;
            if offset + length > extra.len() {
                return Err(Error::invalid_data_format("bad Vorbis extradata lacing"));
            }
            *header = &extra[offset..offset + length];
            offset += length;
        }
        return Ok(headers);
    }

    // Older form: packet count 2, then two lengths as 255-byte runs;
    // the third length is whatever remains.
    if extra[0] != 2 {
        return Err(Error::invalid_data_format("bad Vorbis extradata lacing"));
    }

    let mut lengths = [0usize; 2];
    let mut pos = 1;
    for length in &mut lengths {
        loop {
            let byte = *extra
                .get(pos)
                .ok_or_else(|| Error::invalid_data_format("bad Vorbis extradata lacing"))?;
            pos += 1;
            *length += usize::from(byte);
            if byte != 0xff {
                break;
            }
        }
    }

    let first = pos;
    let second = first + lengths[0];
    let third = second + lengths[1];
    if third > extra.len() {
        return Err(Error::invalid_data_format("bad Vorbis extradata lacing"));
    }
    Ok([
        &extra[first..second],
        &extra[second..third],
        &extra[third..],
    ])
}

struct VorbisAdapter {
    ident: IdentHeader,
    setup: SetupHeader,
    window: PreviousWindowRight,
    mapper: ChannelMapper,
    pending: Vec<u8>,
    channel_layout: u32,
    channels: u32,
}

/// Builds a Vorbis decoder from the codec-private header packets.
///
/// # Errors
///
/// Fails with `invalid_data_format` on malformed headers and with
/// `unsupported_format` on out-of-range stream parameters.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    let [ident_data, _comment_data, setup_data] = split_xiph_headers(&fmt.extra)?;

    let ident = read_header_ident(ident_data)?;
    let setup = read_header_setup(
        setup_data,
        ident.audio_channels,
        (ident.blocksize_0, ident.blocksize_1),
    )?;

    let channels = u32::from(ident.audio_channels);
    if !(1..=8).contains(&channels) {
        return Err(Error::unsupported_format(format!(
            "invalid Vorbis channel count: {channels}"
        )));
    }

    fmt.sample_rate = ident.audio_sample_rate;
    fmt.channels = channels;
    fmt.channel_layout = xiph_channel_layout(channels);

    Ok(Box::new(VorbisAdapter {
        ident,
        setup,
        window: PreviousWindowRight::new(),
        mapper: ChannelMapper::vorbis(channels)?,
        pending: Vec::new(),
        channel_layout: fmt.channel_layout,
        channels,
    }))
}

impl Decoder for VorbisAdapter {
    fn send(&mut self, buf: &Buffer) -> Result<()> {
        self.pending.clear();
        self.pending.extend_from_slice(buf);
        Ok(())
    }

    fn recv(&mut self, pkt: &mut Packet) -> Result<DecodeStatus> {
        pkt.clear();
        pkt.set_channel_layout_n(self.channel_layout, self.channels);
        if self.pending.is_empty() {
            return Ok(DecodeStatus::Complete);
        }

        let decoded: InterleavedSamples<f32> = read_audio_packet_generic(
            &self.ident,
            &self.setup,
            &self.pending,
            &mut self.window,
        )?;
        self.pending.clear();

        if !decoded.samples.is_empty() {
            pkt.assign(&decoded.samples);
            self.mapper.process(pkt)?;
        }
        Ok(DecodeStatus::Complete)
    }

    fn flush(&mut self) {
        self.window = PreviousWindowRight::new();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_old_lacing_scheme() {
        // Two lengths (3 and 258), remainder is the third header.
        let mut extra = vec![2u8, 3, 0xff, 3];
        extra.extend_from_slice(&[0xaa; 3]);
        extra.extend_from_slice(&[0xbb; 258]);
        extra.extend_from_slice(&[0xcc; 5]);

        let [a, b, c] = split_xiph_headers(&extra).unwrap();
        assert_eq!(a, &[0xaa; 3][..]);
        assert_eq!(b.len(), 258);
        assert_eq!(c, &[0xcc; 5][..]);
    }

    #[test]
    fn split_length_prefixed_scheme() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&30u16.to_be_bytes());
        extra.extend_from_slice(&[0x11; 30]);
        extra.extend_from_slice(&4u16.to_be_bytes());
        extra.extend_from_slice(&[0x22; 4]);
        extra.extend_from_slice(&7u16.to_be_bytes());
        extra.extend_from_slice(&[0x33; 7]);

        let [a, b, c] = split_xiph_headers(&extra).unwrap();
        assert_eq!(a.len(), 30);
        assert_eq!(b.len(), 4);
        assert_eq!(c.len(), 7);
    }

    #[test]
    fn split_rejects_truncated_data() {
        assert!(split_xiph_headers(&[2, 200, 3]).is_err());
        assert!(split_xiph_headers(&[9, 1]).is_err());
    }
}
