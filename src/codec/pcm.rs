//! Linear PCM and G.711 companded decoders.
//!
//! "Decoding" LPCM is a pure blit: every container packet converts
//! through the PCM blitter into normalized floats. A-law and µ-law
//! expand through the G.711 tables first.

use crate::audio::codec;
use crate::audio::pcm::{alaw_to_linear, ulaw_to_linear, Blitter, Spec};
use crate::audio::{guess_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::LPCM, codec::ALAW, codec::ULAW];

enum Expansion {
    Blit(Blitter),
    Alaw,
    Ulaw,
}

struct PcmDecoder {
    expansion: Expansion,
    channels: u32,
    channel_layout: u32,
    pending: Vec<u8>,
}

/// Builds a PCM decoder for the given codec format.
///
/// # Errors
///
/// Fails with `unsupported_format` on an unusable sample description.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    if fmt.channels == 0 {
        return Err(Error::unsupported_format("PCM stream has zero channels"));
    }
    if fmt.channel_layout == 0 {
        fmt.channel_layout = guess_channel_layout(fmt.channels);
    }

    let expansion = match fmt.codec_id {
        codec::ALAW => Expansion::Alaw,
        codec::ULAW => Expansion::Ulaw,
        _ => Expansion::Blit(Blitter::new(Spec {
            bits_per_sample: fmt.bits_per_sample,
            bytes_per_sample: (fmt.bits_per_sample + 7) / 8,
            channels: fmt.channels,
            flags: fmt.flags,
        })?),
    };

    Ok(Box::new(PcmDecoder {
        expansion,
        channels: fmt.channels,
        channel_layout: fmt.channel_layout,
        pending: Vec::new(),
    }))
}

impl Decoder for PcmDecoder {
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

        match &self.expansion {
            Expansion::Blit(blitter) => blitter.convert(&self.pending, pkt),
            Expansion::Alaw => expand(&self.pending, pkt, alaw_to_linear),
            Expansion::Ulaw => expand(&self.pending, pkt, ulaw_to_linear),
        }
        self.pending.clear();
        Ok(DecodeStatus::Complete)
    }

    fn flush(&mut self) {
        self.pending.clear();
    }
}

fn expand(src: &[u8], pkt: &mut Packet, table: fn(u8) -> i16) {
    let converted: Vec<f32> = src
        .iter()
        .map(|&b| f32::from(table(b)) / 32_768.0)
        .collect();
    pkt.assign(&converted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{BIG_ENDIAN, SIGNED_INT};

    fn format(codec_id: u32, bits: u32, flags: u32) -> CodecFormat {
        CodecFormat {
            codec_id,
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: bits,
            flags,
            ..CodecFormat::default()
        }
    }

    #[test]
    fn lpcm_s16_be() {
        let mut fmt = format(codec::LPCM, 16, SIGNED_INT | BIG_ENDIAN);
        let mut decoder = create(&mut fmt).unwrap();
        assert_eq!(fmt.channel_layout.count_ones(), 1);

        decoder
            .send(&Buffer::from_vec(vec![0x40, 0x00, 0xc0, 0x00]))
            .unwrap();
        let mut pkt = Packet::new();
        assert_eq!(decoder.recv(&mut pkt).unwrap(), DecodeStatus::Complete);
        assert_eq!(pkt.frames(), 2);
        assert!((pkt.samples()[0] - 0.5).abs() < 1e-6);
        assert!((pkt.samples()[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn ulaw_expands() {
        let mut fmt = format(codec::ULAW, 8, 0);
        let mut decoder = create(&mut fmt).unwrap();

        decoder.send(&Buffer::from_vec(vec![0xff, 0x00])).unwrap();
        let mut pkt = Packet::new();
        decoder.recv(&mut pkt).unwrap();
        assert_eq!(pkt.samples()[0], 0.0);
        assert!(pkt.samples()[1] < -0.9);
    }

    #[test]
    fn empty_send_drains_empty() {
        let mut fmt = format(codec::LPCM, 8, 0);
        let mut decoder = create(&mut fmt).unwrap();
        decoder.send(&Buffer::new()).unwrap();
        let mut pkt = Packet::new();
        assert_eq!(decoder.recv(&mut pkt).unwrap(), DecodeStatus::Complete);
        assert!(pkt.is_empty());
    }
}
