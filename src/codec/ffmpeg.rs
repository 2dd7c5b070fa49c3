//! FFmpeg decoder adapter (feature `ffmpeg`).
//!
//! Routes codecs without a native Rust decoder — Monkey's Audio and
//! TrueAudio — through libavcodec's send/receive API. Decoded frames
//! come back in whatever sample format the codec produces; the PCM
//! blitter normalizes them to interleaved `f32`.

use std::ffi::c_int;
use std::ptr;

use ffmpeg_sys_next as ffi;

use crate::audio::codec;
use crate::audio::pcm::{self, Blitter, Spec};
use crate::audio::{guess_channel_layout, CodecFormat, DecodeStatus, Decoder, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

pub(crate) const CODECS: &[u32] = &[codec::MONKEYS_AUDIO, codec::TTA];

fn averror_message(code: c_int) -> String {
    let mut buf = [0 as std::ffi::c_char; 256];
    // SAFETY: buf is a valid, writable, NUL-terminated C buffer.
    unsafe {
        if ffi::av_strerror(code, buf.as_mut_ptr(), buf.len()) < 0 {
            return format!("FFmpeg error code {code}");
        }
        std::ffi::CStr::from_ptr(buf.as_ptr())
            .to_string_lossy()
            .into_owned()
    }
}

fn check(code: c_int) -> Result<c_int> {
    if code >= 0 {
        return Ok(code);
    }
    if code == ffi::AVERROR_EOF {
        return Err(Error::end_of_file(averror_message(code)));
    }
    Err(Error::failure(format!("FFmpeg: {}", averror_message(code))))
}

fn map_codec_id(codec_id: u32) -> ffi::AVCodecID {
    match codec_id {
        codec::MONKEYS_AUDIO => ffi::AVCodecID::AV_CODEC_ID_APE,
        _ => ffi::AVCodecID::AV_CODEC_ID_TTA,
    }
}

struct FfmpegAdapter {
    context: *mut ffi::AVCodecContext,
    frame: *mut ffi::AVFrame,
    packet: *mut ffi::AVPacket,
    pending: Vec<u8>,
    drained: bool,
    blitter: Option<(Blitter, bool)>,
    channel_layout: u32,
    channels: u32,
}

// The adapter owns its FFmpeg objects exclusively; the demuxer protocol
// is single-threaded per stream.
unsafe impl Send for FfmpegAdapter {}

/// Opens a libavcodec context for the given codec format.
///
/// # Errors
///
/// Fails with `protocol_not_supported` when libavcodec lacks the codec
/// and with `failure` on open errors.
pub(crate) fn create(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    // SAFETY: standard avcodec setup; every pointer is checked before
    // use and released on the error paths by Drop.
    unsafe {
        let decoder = ffi::avcodec_find_decoder(map_codec_id(fmt.codec_id));
        if decoder.is_null() {
            return Err(Error::protocol_not_supported(format!(
                "libavcodec has no decoder for '{}'",
                codec::name(fmt.codec_id)
            )));
        }

        let context = ffi::avcodec_alloc_context3(decoder);
        if context.is_null() {
            return Err(Error::bad_alloc("avcodec_alloc_context3 failed"));
        }

        let mut adapter = FfmpegAdapter {
            context,
            frame: ffi::av_frame_alloc(),
            packet: ffi::av_packet_alloc(),
            pending: Vec::new(),
            drained: false,
            blitter: None,
            channel_layout: fmt.channel_layout,
            channels: fmt.channels,
        };
        if adapter.frame.is_null() || adapter.packet.is_null() {
            return Err(Error::bad_alloc("failed to allocate FFmpeg frame"));
        }

        if !fmt.extra.is_empty() {
            let padded = fmt.extra.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let extradata = ffi::av_mallocz(padded).cast::<u8>();
            if extradata.is_null() {
                return Err(Error::bad_alloc("av_mallocz failed"));
            }
            ptr::copy_nonoverlapping(fmt.extra.as_slice().as_ptr(), extradata, fmt.extra.len());
            (*context).extradata = extradata;
            (*context).extradata_size = c_int::try_from(fmt.extra.len())?;
        }

        (*context).sample_rate = c_int::try_from(fmt.sample_rate)?;
        (*context).block_align = c_int::try_from(fmt.bytes_per_packet)?;
        (*context).bits_per_coded_sample = c_int::try_from(fmt.bits_per_sample)?;
        (*context).bit_rate = i64::from(fmt.bit_rate);
        ffi::av_channel_layout_default(&mut (*context).ch_layout, c_int::try_from(fmt.channels)?);

        check(ffi::avcodec_open2(context, decoder, ptr::null_mut()))?;

        if fmt.channel_layout == 0 {
            fmt.channel_layout = guess_channel_layout(fmt.channels);
            adapter.channel_layout = fmt.channel_layout;
        }
        Ok(Box::new(adapter))
    }
}

impl FfmpegAdapter {
    /// Builds the blitter once the first frame reveals the sample
    /// format. Returns `(blitter, planar)`.
    fn make_blitter(&self, sample_fmt: ffi::AVSampleFormat, channels: u32) -> Result<(Blitter, bool)> {
        use ffi::AVSampleFormat::*;

        let (bits, flags, planar) = match sample_fmt {
            AV_SAMPLE_FMT_U8 => (8, 0, false),
            AV_SAMPLE_FMT_U8P => (8, 0, true),
            AV_SAMPLE_FMT_S16 => (16, pcm::SIGNED_INT, false),
            AV_SAMPLE_FMT_S16P => (16, pcm::SIGNED_INT, true),
            AV_SAMPLE_FMT_S32 => (32, pcm::SIGNED_INT, false),
            AV_SAMPLE_FMT_S32P => (32, pcm::SIGNED_INT, true),
            AV_SAMPLE_FMT_FLT => (32, pcm::IEEE_FLOAT, false),
            AV_SAMPLE_FMT_FLTP => (32, pcm::IEEE_FLOAT, true),
            AV_SAMPLE_FMT_DBL => (64, pcm::IEEE_FLOAT, false),
            AV_SAMPLE_FMT_DBLP => (64, pcm::IEEE_FLOAT, true),
            other => {
                return Err(Error::unsupported_format(format!(
                    "unsupported libavcodec sample format: {other:?}"
                )));
            }
        };

        let blitter = Blitter::new(Spec {
            bits_per_sample: bits,
            bytes_per_sample: bits / 8,
            channels,
            flags: flags | if planar { pcm::NON_INTERLEAVED } else { 0 },
        })?;
        Ok((blitter, planar))
    }
}

impl Decoder for FfmpegAdapter {
    fn send(&mut self, buf: &Buffer) -> Result<()> {
        self.pending.clear();
        self.pending.extend_from_slice(buf);
        self.pending
            .resize(self.pending.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize, 0);

        // SAFETY: the packet points into `pending`, which outlives the
        // immediate avcodec_send_packet call.
        unsafe {
            if buf.is_empty() {
                (*self.packet).data = ptr::null_mut();
                (*self.packet).size = 0;
            } else {
                (*self.packet).data = self.pending.as_mut_ptr();
                (*self.packet).size = c_int::try_from(buf.len())?;
            }
            let code = ffi::avcodec_send_packet(self.context, self.packet);
            // A drained decoder rejects further flush packets.
            if code == ffi::AVERROR_EOF && buf.is_empty() {
                self.drained = true;
                return Ok(());
            }
            check(code)?;
        }
        Ok(())
    }

    fn recv(&mut self, pkt: &mut Packet) -> Result<DecodeStatus> {
        pkt.clear();
        pkt.set_channel_layout_n(self.channel_layout, self.channels);
        if self.drained {
            return Ok(DecodeStatus::Complete);
        }

        // SAFETY: frame and context are valid for the adapter's
        // lifetime; the frame's data pointers are only read within the
        // bounds derived from nb_samples.
        unsafe {
            let code = ffi::avcodec_receive_frame(self.context, self.frame);
            if code == ffi::AVERROR(ffi::EAGAIN) || code == ffi::AVERROR_EOF {
                return Ok(DecodeStatus::Complete);
            }
            check(code)?;

            let channels = u32::try_from((*self.frame).ch_layout.nb_channels)?;
            if channels != self.channels {
                self.channels = channels;
                self.channel_layout = guess_channel_layout(channels);
                self.blitter = None;
                pkt.set_channel_layout_n(self.channel_layout, self.channels);
            }

            if self.blitter.is_none() {
                let sample_fmt = std::mem::transmute::<c_int, ffi::AVSampleFormat>(
                    (*self.frame).format,
                );
                self.blitter = Some(self.make_blitter(sample_fmt, channels)?);
            }
            let (blitter, planar) = self.blitter.as_ref().expect("blitter built");

            let frames = usize::try_from((*self.frame).nb_samples)?;
            let bytes_per_sample = blitter.spec().bytes_per_sample as usize;

            if *planar {
                // Interleave the separate planes byte-wise, then blit.
                let mut interleaved =
                    vec![0u8; frames * channels as usize * bytes_per_sample];
                for ch in 0..channels as usize {
                    let plane = (*self.frame).data[ch];
                    let plane = std::slice::from_raw_parts(plane, frames * bytes_per_sample);
                    for frame_index in 0..frames {
                        let src = frame_index * bytes_per_sample;
                        let dst = (frame_index * channels as usize + ch) * bytes_per_sample;
                        interleaved[dst..dst + bytes_per_sample]
                            .copy_from_slice(&plane[src..src + bytes_per_sample]);
                    }
                }
                blitter.convert(&interleaved, pkt);
            } else {
                let data = (*self.frame).data[0];
                let len = frames * channels as usize * bytes_per_sample;
                let src = std::slice::from_raw_parts(data, len);
                blitter.convert(src, pkt);
            }

            ffi::av_frame_unref(self.frame);
        }
        Ok(DecodeStatus::Incomplete)
    }

    fn flush(&mut self) {
        // SAFETY: context is valid for the adapter's lifetime.
        unsafe {
            ffi::avcodec_flush_buffers(self.context);
        }
        self.pending.clear();
        self.drained = false;
    }
}

impl Drop for FfmpegAdapter {
    fn drop(&mut self) {
        // SAFETY: pointers were allocated by the matching FFmpeg
        // constructors and are not used afterwards.
        unsafe {
            ffi::av_packet_free(&mut self.packet);
            ffi::av_frame_free(&mut self.frame);
            ffi::avcodec_free_context(&mut self.context);
        }
    }
}
