//! TrueAudio (TTA) demuxer.
//!
//! A 22-byte `TTA1` header (CRC-protected) is followed by a seek table
//! of per-packet compressed sizes (also CRC-protected) and the packet
//! data. Every packet decodes to `sample_rate × 256 / 245` frames except
//! the last; seeking sums compressed sizes up to the target packet.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Reader, Stream};
use crate::media::{ape, id3v1, id3v2, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["tta"];

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(TtaDemuxer::open(stream, mode)?))
}

fn channel_layout(channels: u32) -> u32 {
    match channels {
        1 => layout::MONO,
        2 => layout::STEREO,
        3 => layout::L2_1,
        4 => layout::QUAD,
        6 => layout::L5_1,
        7 => layout::L6_1,
        8 => layout::L7_1_FRONT,
        _ => 0,
    }
}

struct TtaParser {
    file: Box<dyn Stream>,
    seek_table: Vec<u32>,
    sample_rate: u32,
    frames_per_packet: u32,
    packet_number: usize,
}

impl Feed for TtaParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let Some(&packet_size) = self.seek_table.get(self.packet_number) else {
            return Ok(FeedStatus::Eos);
        };
        self.packet_number += 1;

        dest.assign_from_stream(self.file.as_mut(), packet_size as usize)?;
        let bit_rate = muldiv(
            u64::from(packet_size),
            u64::from(self.sample_rate) * 8,
            u64::from(self.frames_per_packet),
        ) as u32;
        Ok(FeedStatus::Packet {
            bit_rate: Some(bit_rate),
        })
    }
}

pub struct TtaDemuxer {
    inner: Demuxer<TtaParser>,
    data_start: u64,
    id3v2_end: u64,
    id3v1_start: Option<u64>,
    apev2_start: Option<u64>,
}

impl TtaDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let apev2_start = ape::find(file)?;
        let id3v1_start = if apev2_start.is_none() {
            id3v1::find(file)?
        } else {
            None
        };

        file.rewind()?;
        let id3v2_end = if id3v2::skip(file)? { file.tell()? } else { 0 };

        let mut extra = vec![0u8; 22];
        file.read(&mut extra)?;

        let mut r = Reader::new(&extra);
        let signature = r.read_bytes(4)?;
        let flags = r.read_u16_le()?;
        let channels = u32::from(r.read_u16_le()?);
        let bits_per_sample = u32::from(r.read_u16_le()?);
        let sample_rate = r.read_u32_le()?;
        let total_samples = r.read_u32_le()?;
        let header_crc = r.read_u32_le()?;

        if signature != b"TTA1" {
            return Err(Error::invalid_data_format("invalid TTA file header signature"));
        }
        if flags != 0x1 && flags != 0x2 {
            return Err(Error::invalid_data_format(format!(
                "unsupported TTA format flags: {flags:#06x}"
            )));
        }
        if channels == 0 || channels > 18 {
            return Err(Error::unsupported_format(format!(
                "invalid TTA channel count: {channels}"
            )));
        }
        if bits_per_sample == 0 {
            return Err(Error::unsupported_format("TTA bits per sample is zero"));
        }
        if !(8_000..=384_000).contains(&sample_rate) {
            return Err(Error::unsupported_format(format!(
                "invalid TTA sample rate: {sample_rate}"
            )));
        }
        if total_samples == 0 {
            return Err(Error::failure("TTA file contains zero frames"));
        }
        if CRC32.checksum(&extra[..18]) != header_crc {
            return Err(Error::failure("TTA file header CRC mismatch"));
        }

        let frames_per_packet = (sample_rate * 256) / 245;
        let format = CodecFormat {
            extra: Buffer::from_vec(extra),
            codec_id: codec::TTA,
            channels,
            bits_per_sample,
            sample_rate,
            channel_layout: channel_layout(channels),
            frames_per_packet,
            ..CodecFormat::default()
        };

        let packet_count = (total_samples / frames_per_packet)
            + u32::from(total_samples % frames_per_packet != 0);

        let mut table_bytes = vec![0u8; packet_count as usize * 4];
        file.read(&mut table_bytes)?;
        let table_crc = file.read_u32_le()?;
        if CRC32.checksum(&table_bytes) != table_crc {
            return Err(Error::failure("TTA seek table CRC mismatch"));
        }

        let seek_table: Vec<u32> = table_bytes
            .chunks_exact(4)
            .map(|entry| u32::from_le_bytes(entry.try_into().expect("sized entry")))
            .collect();

        let data_start = file.tell()?;
        let data_end = apev2_start
            .or(id3v1_start)
            .map_or(file.size()?, |offset| offset);
        let average_bit_rate = muldiv(
            data_end - data_start,
            u64::from(sample_rate) * 8,
            u64::from(total_samples),
        ) as u32;

        let mut inner = Demuxer::new(
            TtaParser {
                file: stream,
                seek_table,
                sample_rate,
                frames_per_packet,
                packet_number: 0,
            },
            format,
        );
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(u64::from(total_samples));
        inner.set_average_bit_rate(average_bit_rate);

        Ok(Self {
            inner,
            data_start,
            id3v2_end,
            id3v1_start,
            apev2_start,
        })
    }
}

impl Input for TtaDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let frames_per_packet = u64::from(self.inner.parser().frames_per_packet);
        let mut nearest = (pts / frames_per_packet) as usize;
        let mut priming = pts % frames_per_packet;

        let table_len = self.inner.parser().seek_table.len();
        if nearest >= table_len {
            nearest = table_len;
            priming = 0;
        }

        let data_offset = {
            let parser = self.inner.parser();
            parser.seek_table[..nearest]
                .iter()
                .fold(self.data_start, |acc, &size| acc + u64::from(size))
        };

        let parser = self.inner.parser_mut();
        parser.file.seek_to(data_offset)?;
        parser.packet_number = nearest;
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

        let file = self.inner.parser_mut().file.as_mut();
        if self.apev2_start.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if self.id3v2_end != 0 {
            file.rewind()?;
            id3v2::read(file, &mut info.tags)?;
        } else if let Some(start) = self.id3v1_start {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        let file = self.inner.parser_mut().file.as_mut();
        if self.apev2_start.is_some() {
            return ape::find_image(file, kind);
        }
        if self.id3v2_end != 0 {
            file.rewind()?;
            return id3v2::find_image(file, kind);
        }
        Ok(None)
    }
}
