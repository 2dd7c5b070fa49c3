//! AIFF / AIFF-C demuxer.
//!
//! Walks the `FORM` chunk tree: `COMM` (format, with the sample rate as
//! an 80-bit extended-precision float), `SSND` (sample data), `ID3 `
//! (embedded ID3v2 tag) and `wave` (codec-private data). AIFF-C adds a
//! codec tag to `COMM`; plain AIFF is always big-endian signed PCM.

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, guess_channel_layout, pcm, CodecFormat, Demuxer, Feed, Format,
    Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Stream};
use crate::media::{id3v2, tags, Image, ImageType};
use crate::util::{align_up, muldiv};

pub(crate) const EXTENSIONS: &[&str] = &["aif", "aifc", "aiff", "aiffc"];

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(AiffDemuxer::open(stream, mode)?))
}

/// Decodes an 80-bit extended-precision IEEE 754 value.
fn extended_to_f64(bytes: &[u8; 10]) -> f64 {
    let sign = bytes[0] & 0x80 != 0;
    let exponent = (u16::from_be_bytes([bytes[0], bytes[1]]) & 0x7fff) as i32;
    let mant_hi = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let mant_lo = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

    let magnitude = if exponent == 0 && mant_hi == 0 && mant_lo == 0 {
        0.0
    } else if exponent == 0x7fff {
        f64::INFINITY
    } else {
        f64::from(mant_hi) * f64::from(exponent - 16383 - 31).exp2()
            + f64::from(mant_lo) * f64::from(exponent - 16383 - 63).exp2()
    };
    if sign {
        -magnitude
    } else {
        magnitude
    }
}

struct AiffParser {
    file: Box<dyn Stream>,
    data_chunk_end: u64,
    bytes_per_packet: u32,
    packet_step: u32,
}

impl Feed for AiffParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let remain = self.data_chunk_end.saturating_sub(self.file.tell()?);
        if remain < u64::from(self.bytes_per_packet) {
            return Ok(FeedStatus::Eos);
        }

        let mut packet_size = u64::from(self.bytes_per_packet) * u64::from(self.packet_step);
        if packet_size > remain {
            packet_size = remain - (remain % u64::from(self.bytes_per_packet));
        }

        dest.assign_from_stream(self.file.as_mut(), packet_size as usize)?;
        Ok(FeedStatus::Packet { bit_rate: None })
    }
}

pub struct AiffDemuxer {
    inner: Demuxer<AiffParser>,
    data_chunk_start: u64,
    id3_chunk_start: u64,
    packet_count: u32,
    is_aifc: bool,
}

impl AiffDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let chunk_id = file.read_u32_be()?;
        let _chunk_size = file.read_u32_be()?;
        let form_type = file.read_u32_be()?;

        let aiff = u32::from_be_bytes(*b"AIFF");
        let aifc = u32::from_be_bytes(*b"AIFC");
        if chunk_id != u32::from_be_bytes(*b"FORM") || (form_type != aiff && form_type != aifc) {
            return Err(Error::invalid_data_format("invalid AIFF 'FORM' chunk"));
        }
        let is_aifc = form_type == aifc;

        let mut format = CodecFormat::default();
        let mut data_chunk_start = 0u64;
        let mut data_chunk_end = 0u64;
        let mut id3_chunk_start = 0u64;
        let mut packet_count = 0u32;
        let mut packet_step = 1u32;

        let file_len = file.size()?;
        let mut file_pos = file.tell()?;
        while file_pos + 8 < file_len {
            let chunk_id = file.read_u32_be()?;
            let chunk_size = file.read_u32_be()?;

            match &chunk_id.to_be_bytes() {
                b"COMM" => {
                    read_chunk_comm(
                        file,
                        chunk_size,
                        is_aifc,
                        &mut format,
                        &mut packet_count,
                        &mut packet_step,
                    )?;
                }
                b"SSND" => {
                    if chunk_size <= 8 {
                        return Err(Error::invalid_data_format(
                            "AIFF 'SSND' chunk is too small",
                        ));
                    }
                    let offset = file.read_u32_be()?;
                    let _block_size = file.read_u32_be()?;
                    data_chunk_start = file.tell()? + u64::from(offset);
                    data_chunk_end = data_chunk_start + u64::from(chunk_size - 8);
                }
                b"ID3 " => {
                    id3_chunk_start = file.tell()?;
                }
                b"wave" => {
                    let mut extra = vec![0u8; chunk_size as usize];
                    file.read(&mut extra)?;
                    format.extra = Buffer::from_vec(extra);
                }
                _ => {}
            }
            file_pos = align_up(file_pos + u64::from(chunk_size) + 8, 2);
            file.seek_to(file_pos.min(file_len))?;
        }

        // QDesign and QCELP refine their packetization from the
        // codec-private data.
        match format.codec_id {
            id if id == codec::QDESIGN || id == codec::QDESIGN2 => {
                if format.extra.len() >= 48 {
                    let extra = format.extra.as_slice();
                    format.bit_rate =
                        u32::from_be_bytes(extra[32..36].try_into().expect("sized field"));
                    format.frames_per_packet =
                        u32::from_be_bytes(extra[36..40].try_into().expect("sized field"));
                    format.bytes_per_packet =
                        u32::from_be_bytes(extra[44..48].try_into().expect("sized field"));
                }
            }
            id if id == codec::QCELP => {
                if format.extra.len() >= 25 {
                    match format.extra[24] {
                        b'H' => format.bytes_per_packet = 17, // half rate
                        b'F' => format.bytes_per_packet = 35, // full rate
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if format.bit_rate == 0 && format.frames_per_packet != 0 {
            format.bit_rate = muldiv(
                u64::from(format.bytes_per_packet),
                u64::from(format.sample_rate) * 8,
                u64::from(format.frames_per_packet),
            ) as u32;
        }

        let total_frames = u64::from(packet_count) * u64::from(format.frames_per_packet);
        let bit_rate = format.bit_rate;
        let bytes_per_packet = format.bytes_per_packet;

        stream.seek_to(data_chunk_start)?;
        let mut inner = Demuxer::new(
            AiffParser {
                file: stream,
                data_chunk_end,
                bytes_per_packet,
                packet_step,
            },
            format,
        );

        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_frames);
        inner.set_average_bit_rate(bit_rate);

        Ok(Self {
            inner,
            data_chunk_start,
            id3_chunk_start,
            packet_count,
            is_aifc,
        })
    }
}

fn read_chunk_comm(
    file: &mut dyn Stream,
    chunk_size: u32,
    is_aifc: bool,
    format: &mut CodecFormat,
    packet_count: &mut u32,
    packet_step: &mut u32,
) -> Result<()> {
    format.channels = u32::from(file.read_u16_be()?);
    *packet_count = file.read_u32_be()?;
    format.bits_per_sample = u32::from(file.read_u16_be()?);

    let mut rate = [0u8; 10];
    file.read(&mut rate)?;

    format.frames_per_packet = 1;
    format.channel_layout = guess_channel_layout(format.channels);
    let sample_rate = extended_to_f64(&rate);
    if !(0.0..=f64::from(u32::MAX)).contains(&sample_rate) {
        return Err(Error::invalid_data_format(format!(
            "invalid AIFF sample rate: {sample_rate}"
        )));
    }
    format.sample_rate = sample_rate.round() as u32;

    let mut codec_tag = *b"NONE";
    if chunk_size >= 22 && is_aifc {
        codec_tag = file.read_u32_be()?.to_be_bytes();
    }

    match &codec_tag {
        b"GSM " | b"agsm" => {
            format.codec_id = codec::GSM;
            format.bytes_per_packet = 33;
            format.frames_per_packet = 160;
        }
        b"ima4" => {
            format.codec_id = codec::ADPCM_IMA_QT;
            format.bytes_per_packet = 34 * format.channels;
            format.frames_per_packet = 64;
        }
        b"G722" => {
            format.codec_id = codec::ADPCM_G722;
            format.bytes_per_packet = format.channels;
            format.frames_per_packet = 2;
        }
        b"MAC6" => {
            format.codec_id = codec::MACE6;
            format.bytes_per_packet = format.channels;
            format.frames_per_packet = 6;
        }
        b"MAC3" => {
            format.codec_id = codec::MACE3;
            format.bytes_per_packet = 2 * format.channels;
            format.frames_per_packet = 6;
        }
        b"Qclp" => {
            format.codec_id = codec::QCELP;
            format.frames_per_packet = 160;
        }
        b"QDMC" => format.codec_id = codec::QDESIGN,
        b"QDM2" => format.codec_id = codec::QDESIGN2,
        b"alaw" => {
            format.codec_id = codec::ALAW;
            format.bits_per_sample = 8;
        }
        b"ulaw" => {
            format.codec_id = codec::ULAW;
            format.bits_per_sample = 8;
        }
        b"FL64" | b"fl64" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::IEEE_FLOAT | pcm::BIG_ENDIAN;
            format.bits_per_sample = 64;
        }
        b"FL32" | b"fl32" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::IEEE_FLOAT | pcm::BIG_ENDIAN;
            format.bits_per_sample = 32;
        }
        b"in32" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::SIGNED_INT | pcm::BIG_ENDIAN;
            format.bits_per_sample = 32;
        }
        b"in24" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::SIGNED_INT | pcm::BIG_ENDIAN;
            format.bits_per_sample = 24;
        }
        b"twos" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::SIGNED_INT | pcm::BIG_ENDIAN;
            format.bits_per_sample = 16;
        }
        b"sowt" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::SIGNED_INT;
            format.bits_per_sample = 16;
        }
        b"raw " => {
            format.codec_id = codec::LPCM;
            format.bits_per_sample = 8;
        }
        b"NONE" => {
            format.codec_id = codec::LPCM;
            format.flags = pcm::SIGNED_INT | pcm::BIG_ENDIAN;
        }
        other => {
            return Err(Error::unsupported_format(format!(
                "unknown AIFF codec tag: {:?}",
                String::from_utf8_lossy(other)
            )));
        }
    }

    if matches!(format.codec_id, id if id == codec::LPCM || id == codec::ALAW || id == codec::ULAW)
    {
        *packet_step = (format.sample_rate / 10).max(1);
    }

    if format.bytes_per_packet == 0 {
        format.bytes_per_packet = format.bits_per_sample * format.channels / 8;
    }
    Ok(())
}

impl Input for AiffDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let frames_per_packet = u64::from(self.inner.codec_format().frames_per_packet);
        let mut nearest = pts / frames_per_packet;
        let mut priming = pts % frames_per_packet;

        if nearest >= u64::from(self.packet_count) {
            nearest = u64::from(self.packet_count);
            priming = 0;
        }

        let bytes_per_packet = u64::from(self.inner.parser().bytes_per_packet);
        let target = self.data_chunk_start + nearest * bytes_per_packet;
        self.inner.parser_mut().file.seek_to(target)?;
        self.inner.set_seek_target(pts, priming);
        Ok(())
    }

    fn format(&self) -> Format {
        self.inner.format()
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.inner.format());
        info.frames = self.inner.total_frames();
        info.codec_id = self.inner.codec_format().codec_id;
        info.bits_per_sample = self.inner.codec_format().bits_per_sample;
        info.average_bit_rate = self.inner.average_bit_rate();
        info.props
            .insert(tags::CONTAINER, if self.is_aifc { "AIFF-C" } else { "AIFF" });

        if self.id3_chunk_start != 0 {
            let file = self.inner.parser_mut().file.as_mut();
            file.seek_to(self.id3_chunk_start)?;
            id3v2::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        if self.id3_chunk_start != 0 {
            let file = self.inner.parser_mut().file.as_mut();
            file.seek_to(self.id3_chunk_start)?;
            return id3v2::find_image(file, kind);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_float_sample_rates() {
        // 44100 Hz.
        let bytes = [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0];
        assert_eq!(extended_to_f64(&bytes), 44_100.0);

        // 48000 Hz.
        let bytes = [0x40, 0x0e, 0xbb, 0x80, 0, 0, 0, 0, 0, 0];
        assert_eq!(extended_to_f64(&bytes), 48_000.0);

        // 8000 Hz.
        let bytes = [0x40, 0x0b, 0xfa, 0x00, 0, 0, 0, 0, 0, 0];
        assert_eq!(extended_to_f64(&bytes), 8_000.0);

        // Zero and infinity encodings.
        assert_eq!(extended_to_f64(&[0; 10]), 0.0);
        let inf = [0x7f, 0xff, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(extended_to_f64(&inf).is_infinite());
    }
}
