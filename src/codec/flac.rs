//! FLAC decoder adapter over claxon.
//!
//! Each container packet must hold exactly one FLAC frame (Ogg FLAC
//! packetization); a fresh frame reader decodes it from the buffered
//! bytes. Samples arrive as sign-extended integers per channel and are
//! normalized by the stream's bit depth.

use claxon::frame::FrameReader;

use crate::audio::codec;
use crate::audio::{xiph_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::FLAC];

struct FlacAdapter {
    pending: Vec<u8>,
    scratch: Vec<i32>,
    scale: f32,
    channel_layout: u32,
    channels: u32,
}

/// Builds a FLAC frame decoder for the given codec format.
///
/// # Errors
///
/// Fails with `unsupported_format` on missing stream parameters.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    if fmt.bits_per_sample == 0 || fmt.bits_per_sample > 32 {
        return Err(Error::unsupported_format(format!(
            "unsupported FLAC bit depth: {}",
            fmt.bits_per_sample
        )));
    }
    if fmt.channels == 0 || fmt.channels > 8 {
        return Err(Error::unsupported_format(format!(
            "unsupported FLAC channel count: {}",
            fmt.channels
        )));
    }
    if fmt.channel_layout == 0 {
        fmt.channel_layout = xiph_channel_layout(fmt.channels);
    }

    Ok(Box::new(FlacAdapter {
        pending: Vec::new(),
        scratch: Vec::new(),
        scale: 1.0 / (1u64 << (fmt.bits_per_sample - 1)) as f32,
        channel_layout: fmt.channel_layout,
        channels: fmt.channels,
    }))
}

impl Decoder for FlacAdapter {
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

        let cursor = std::io::Cursor::new(self.pending.as_slice());
        let mut reader = FrameReader::new(claxon::input::BufferedReader::new(cursor));
        let block = match reader.read_next_or_eof(std::mem::take(&mut self.scratch)) {
            Ok(Some(block)) => block,
            Ok(None) => {
                self.pending.clear();
                return Ok(DecodeStatus::Complete);
            }
            Err(e) => {
                self.pending.clear();
                return Err(e.into());
            }
        };
        self.pending.clear();

        let frames = block.duration() as usize;
        let channels = block.channels() as usize;
        let mut interleaved = Vec::with_capacity(frames * channels);
        for frame in 0..frames as u32 {
            for ch in 0..channels as u32 {
                interleaved.push(block.sample(ch, frame) as f32 * self.scale);
            }
        }
        pkt.assign(&interleaved);
        self.scratch = block.into_buffer();
        Ok(DecodeStatus::Complete)
    }

    fn flush(&mut self) {
        self.pending.clear();
    }
}
