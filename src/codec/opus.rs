//! Opus decoder adapter over audiopus.
//!
//! The codec-private `extra` data is the 19-byte `OpusHead` structure
//! (optionally followed by the channel mapping table). Output is always
//! 48 kHz; the pre-skip field is reported as the decoder delay so the
//! demuxer protocol trims it. Channel mapping family 0 (mono/stereo) is
//! decoded; family 1 surround streams are parsed but rejected at decoder
//! resolution.

use audiopus::coder::Decoder as OpusDecoder;
use audiopus::{Channels, SampleRate};

use crate::audio::codec;
use crate::audio::{xiph_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::OPUS];

/// Size of the fixed part of an `OpusHead` structure.
pub(crate) const HEAD_SIZE: usize = 19;

/// Fields of the `OpusHead` identification header.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct OpusHead {
    pub channels: u32,
    pub pre_skip: u16,
    pub output_gain_q8: i16,
    pub channel_mapping: u8,
}

impl OpusHead {
    /// Parses the fixed 19-byte head when present.
    pub(crate) fn parse(extra: &[u8]) -> Option<OpusHead> {
        if extra.len() < HEAD_SIZE {
            return None;
        }
        Some(OpusHead {
            channels: u32::from(extra[9]),
            pre_skip: u16::from_le_bytes([extra[10], extra[11]]),
            output_gain_q8: i16::from_le_bytes([extra[16], extra[17]]),
            channel_mapping: extra[18],
        })
    }
}

struct OpusAdapter {
    decoder: OpusDecoder,
    pending: Vec<u8>,
    scratch: Vec<f32>,
    channel_layout: u32,
    channels: u32,
    pre_skip: u16,
}

/// Builds an Opus decoder for the given codec format.
///
/// # Errors
///
/// Fails with `unsupported_format` for channel mapping families other
/// than 0, and with the translated library error otherwise.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    let head = OpusHead::parse(&fmt.extra).unwrap_or(OpusHead {
        channels: fmt.channels,
        ..OpusHead::default()
    });

    let channels = if head.channels != 0 {
        head.channels
    } else {
        fmt.channels
    };

    // Mapping family 0 covers one coupled or uncoupled stream; surround
    // families need self-delimited multistream framing.
    if head.channel_mapping != 0 || channels > 2 {
        return Err(Error::unsupported_format(format!(
            "unsupported Opus channel configuration: mapping {} with {channels} channels",
            head.channel_mapping
        )));
    }

    let decoder = OpusDecoder::new(
        SampleRate::Hz48000,
        if channels == 1 {
            Channels::Mono
        } else {
            Channels::Stereo
        },
    )?;

    fmt.sample_rate = 48_000;
    fmt.channels = channels;
    if fmt.channel_layout == 0 {
        fmt.channel_layout = xiph_channel_layout(channels);
    }

    Ok(Box::new(OpusAdapter {
        decoder,
        pending: Vec::new(),
        // 120 ms at 48 kHz is the longest possible packet.
        scratch: vec![0.0; 5760 * channels as usize],
        channel_layout: fmt.channel_layout,
        channels,
        pre_skip: head.pre_skip,
    }))
}

impl Decoder for OpusAdapter {
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

        let frames = self
            .decoder
            .decode_float(Some(&self.pending), &mut self.scratch, false)?;
        self.pending.clear();

        pkt.assign(&self.scratch[..frames * self.channels as usize]);
        Ok(DecodeStatus::Complete)
    }

    fn flush(&mut self) {
        let _ = self.decoder.reset_state();
        self.pending.clear();
    }

    fn decoder_delay(&self) -> u32 {
        u32::from(self.pre_skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opus_head() {
        let mut head = vec![0u8; HEAD_SIZE];
        head[..8].copy_from_slice(b"OpusHead");
        head[8] = 1; // version
        head[9] = 2; // channels
        head[10..12].copy_from_slice(&312u16.to_le_bytes()); // pre-skip
        head[16..18].copy_from_slice(&(-256i16).to_le_bytes()); // gain
        head[18] = 0; // mapping family

        let parsed = OpusHead::parse(&head).unwrap();
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.output_gain_q8, -256);
        assert_eq!(parsed.channel_mapping, 0);

        assert!(OpusHead::parse(&head[..10]).is_none());
    }
}
