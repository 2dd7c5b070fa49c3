//! AAC decoder adapter over Symphonia.
//!
//! Consumes raw AAC access units (ADTS headers already stripped by the
//! demuxer). The decoder configures itself from an AudioSpecificConfig
//! in `extra` when present, otherwise from the declared sample rate and
//! channel count.

use symphonia_core::audio::SampleBuffer;
use symphonia_core::codecs::{CodecParameters, Decoder as _, DecoderOptions, CODEC_TYPE_AAC};
use symphonia_core::formats::Packet as SymphoniaPacket;

use symphonia_codec_aac::AacDecoder;

use crate::audio::codec;
use crate::audio::{aac_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::Result;
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::AAC_LC];

struct AacAdapter {
    decoder: AacDecoder,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<u8>,
    channel_layout: u32,
    channels: u32,
}

/// Builds an AAC decoder for the given codec format.
///
/// # Errors
///
/// Fails with the translated Symphonia error when the configuration is
/// rejected.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    let mut params = CodecParameters::new();
    params.for_codec(CODEC_TYPE_AAC).with_sample_rate(fmt.sample_rate);
    if !fmt.extra.is_empty() {
        params.with_extra_data(fmt.extra.as_slice().into());
    }

    let decoder = AacDecoder::try_new(&params, &DecoderOptions::default())?;

    if fmt.channel_layout == 0 {
        fmt.channel_layout = aac_channel_layout(fmt.channels);
    }

    Ok(Box::new(AacAdapter {
        decoder,
        sample_buf: None,
        pending: Vec::new(),
        channel_layout: fmt.channel_layout,
        channels: fmt.channels,
    }))
}

impl Decoder for AacAdapter {
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
            self.channel_layout = aac_channel_layout(channels);
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
}
