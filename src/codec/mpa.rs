//! MPEG audio decoder adapter (layers I–III) over Symphonia.
//!
//! One container frame in, one block of PCM out. The adapter reports the
//! intrinsic decoder start-up delays (529 samples for Layer III, 241 for
//! Layers I/II) so the demuxer protocol can trim them along with any
//! container-declared encoder delay.

use symphonia_core::audio::SampleBuffer;
use symphonia_core::codecs::{
    CodecParameters, Decoder as _, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
};
use symphonia_core::formats::Packet as SymphoniaPacket;

use symphonia_bundle_mp3::MpaDecoder;

use crate::audio::codec;
use crate::audio::{guess_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::Result;
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[
    codec::MPEG_LAYER1,
    codec::MPEG_LAYER2,
    codec::MPEG_LAYER3,
];

struct MpaAdapter {
    decoder: MpaDecoder,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<u8>,
    channel_layout: u32,
    channels: u32,
    delay: u32,
}

/// Builds an MPEG audio decoder for the given codec format.
///
/// # Errors
///
/// Fails with the translated Symphonia error when the parameters are
/// rejected.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    let codec_type = match fmt.codec_id {
        codec::MPEG_LAYER1 => CODEC_TYPE_MP1,
        codec::MPEG_LAYER2 => CODEC_TYPE_MP2,
        _ => CODEC_TYPE_MP3,
    };

    if fmt.channel_layout == 0 {
        fmt.channel_layout = guess_channel_layout(fmt.channels);
    }

    let mut params = CodecParameters::new();
    params.for_codec(codec_type).with_sample_rate(fmt.sample_rate);

    let decoder = MpaDecoder::try_new(&params, &DecoderOptions::default())?;

    let delay = if fmt.codec_id == codec::MPEG_LAYER3 {
        528 + 1
    } else {
        240 + 1
    };

    Ok(Box::new(MpaAdapter {
        decoder,
        sample_buf: None,
        pending: Vec::new(),
        channel_layout: fmt.channel_layout,
        channels: fmt.channels,
        delay,
    }))
}

impl Decoder for MpaAdapter {
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

        let packet = SymphoniaPacket::new_from_slice(0, 0, 0, &self.pending);
        self.pending.clear();

        let decoded = self.decoder.decode(&packet)?;
        let frames = decoded.frames();
        let spec = *decoded.spec();

        let channels = spec.channels.count() as u32;
        if channels != self.channels {
            self.channels = channels;
            self.channel_layout = guess_channel_layout(channels);
        }
        pkt.set_channel_layout_n(self.channel_layout, self.channels);

        if frames != 0 {
            let needs_new = self
                .sample_buf
                .as_ref()
                .is_none_or(|buf| buf.capacity() < frames * channels as usize);
            if needs_new {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let sample_buf = self.sample_buf.as_mut().expect("sample buffer present");
            sample_buf.copy_interleaved_ref(decoded);
            pkt.assign(sample_buf.samples());
        }
        Ok(DecodeStatus::Complete)
    }

    fn flush(&mut self) {
        self.decoder.reset();
        self.pending.clear();
    }

    fn decoder_delay(&self) -> u32 {
        self.delay
    }
}
