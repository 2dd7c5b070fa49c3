//! ADTS (AAC) demuxer.
//!
//! Audio Data Transport Stream framing: each frame starts with a 12-bit
//! sync word and a fixed header carrying the profile, sample-rate index,
//! channel configuration and total frame length. Headers are stripped
//! before the payload reaches the AAC decoder. Frame offsets are scanned
//! up front to derive the duration (ADTS has no declared total).

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    aac_channel_layout, codec, demuxer::FeedStatus, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Stream};
use crate::media::{id3v1, id3v2, tags, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["aac", "adts"];

const FRAMES_PER_PACKET: u32 = 1024;

static SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
    8_000, 7_350,
];

#[derive(Clone, Copy, Debug)]
struct AdtsHeader {
    crc_absent: bool,
    sample_rate_index: usize,
    channel_config: u32,
    frame_length: u32,
}

impl AdtsHeader {
    fn parse(bytes: &[u8; 7]) -> Option<AdtsHeader> {
        if bytes[0] != 0xff || bytes[1] & 0xf6 != 0xf0 {
            return None;
        }

        let sample_rate_index = usize::from((bytes[2] >> 2) & 0xf);
        if sample_rate_index >= SAMPLE_RATES.len() {
            return None;
        }

        let channel_config =
            u32::from(((bytes[2] & 0x1) << 2) | ((bytes[3] >> 6) & 0x3));
        let frame_length = (u32::from(bytes[3] & 0x3) << 11)
            | (u32::from(bytes[4]) << 3)
            | (u32::from(bytes[5]) >> 5);

        Some(AdtsHeader {
            crc_absent: bytes[1] & 0x1 != 0,
            sample_rate_index,
            channel_config,
            frame_length,
        })
    }

    fn header_size(self) -> u32 {
        if self.crc_absent {
            7
        } else {
            9
        }
    }

    fn sample_rate(self) -> u32 {
        SAMPLE_RATES[self.sample_rate_index]
    }
}

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(AdtsDemuxer::open(stream, mode)?))
}

struct AdtsParser {
    file: Box<dyn Stream>,
    data_end: u64,
    seek_table: Vec<u64>,
    packet_number: usize,
    sample_rate: u32,
}

impl AdtsParser {
    /// Finds the next frame header, resynchronizing byte-by-byte.
    fn read_frame_header(&mut self) -> Result<Option<(AdtsHeader, u64)>> {
        loop {
            let offset = self.file.tell()?;
            if offset + 7 > self.data_end {
                return Ok(None);
            }

            let mut header = [0u8; 7];
            self.file.as_mut().peek(&mut header)?;
            if let Some(head) = AdtsHeader::parse(&header) {
                if head.frame_length >= head.header_size()
                    && offset + u64::from(head.frame_length) <= self.data_end
                {
                    return Ok(Some((head, offset)));
                }
            }
            self.file.skip(1)?;
        }
    }
}

impl Feed for AdtsParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let Some((head, offset)) = self.read_frame_header()? else {
            return Ok(FeedStatus::Eos);
        };

        self.file.skip(u64::from(head.header_size()))?;
        let payload = head.frame_length - head.header_size();
        dest.assign_from_stream(self.file.as_mut(), payload as usize)?;

        debug_assert!(self.seek_table.len() >= self.packet_number);
        if self.seek_table.len() == self.packet_number {
            self.seek_table.push(offset);
        }
        self.packet_number += 1;

        let bit_rate = muldiv(
            u64::from(head.frame_length),
            u64::from(self.sample_rate) * 8,
            u64::from(FRAMES_PER_PACKET),
        ) as u32;
        Ok(FeedStatus::Packet {
            bit_rate: Some(bit_rate),
        })
    }
}

pub struct AdtsDemuxer {
    inner: Demuxer<AdtsParser>,
    id3v2_size: u64,
    id3v1_start: Option<u64>,
}

impl AdtsDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let mut data_start = 0u64;
        let mut id3v2_size = 0u64;
        if id3v2::skip(file)? {
            data_start = file.tell()?;
            id3v2_size = data_start;
        }
        let id3v1_start = id3v1::find(file)?;
        let data_end = id3v1_start.unwrap_or(file.size()?);

        file.seek_to(data_start)?;
        let mut parser = AdtsParser {
            file: stream,
            data_end,
            seek_table: Vec::new(),
            packet_number: 0,
            sample_rate: 0,
        };

        let Some((head, _)) = parser.read_frame_header()? else {
            return Err(Error::invalid_data_format(
                "no valid ADTS frame header(s) found",
            ));
        };

        let channels = head.channel_config.max(1);
        parser.sample_rate = head.sample_rate();

        let format = CodecFormat {
            codec_id: codec::AAC_LC,
            sample_rate: head.sample_rate(),
            channels,
            channel_layout: aac_channel_layout(channels),
            frames_per_packet: FRAMES_PER_PACKET,
            ..CodecFormat::default()
        };

        // ADTS declares no duration: scan the frame chain once.
        let mut scan_pos = data_start;
        let mut packet_count = 0u64;
        parser.file.seek_to(scan_pos)?;
        while let Some((head, offset)) = parser.read_frame_header()? {
            parser.seek_table.push(offset);
            packet_count += 1;
            scan_pos = offset + u64::from(head.frame_length);
            parser.file.seek_to(scan_pos)?;
        }

        let total_frames = packet_count * u64::from(FRAMES_PER_PACKET);
        let average_bit_rate = muldiv(
            data_end - data_start,
            u64::from(head.sample_rate()) * 8,
            total_frames.max(1),
        ) as u32;

        parser.file.seek_to(data_start)?;
        parser.packet_number = 0;
        let mut inner = Demuxer::new(parser, format);
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_frames);
        inner.set_average_bit_rate(average_bit_rate);

        Ok(Self {
            inner,
            id3v2_size,
            id3v1_start,
        })
    }
}

impl Input for AdtsDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let mut nearest = (pts / u64::from(FRAMES_PER_PACKET)) as usize;
        let mut priming = pts % u64::from(FRAMES_PER_PACKET);

        // One packet of preroll re-primes the decoder's overlap buffer.
        let preroll = nearest.min(1);
        nearest -= preroll;
        priming += preroll as u64 * u64::from(FRAMES_PER_PACKET);

        let parser = self.inner.parser_mut();
        if nearest >= parser.seek_table.len() {
            nearest = parser.seek_table.len().saturating_sub(1);
            priming = 0;
        }

        parser.packet_number = nearest;
        let target = parser.seek_table[nearest];
        parser.file.seek_to(target)?;
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
        info.average_bit_rate = self.inner.average_bit_rate();
        info.props.insert(tags::CONTAINER, "ADTS");

        let file = self.inner.parser_mut().file.as_mut();
        if self.id3v2_size != 0 {
            file.rewind()?;
            id3v2::read(file, &mut info.tags)?;
        } else if let Some(start) = self.id3v1_start {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        if self.id3v2_size != 0 {
            let file = self.inner.parser_mut().file.as_mut();
            file.rewind()?;
            return id3v2::find_image(file, kind);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adts_frame(payload_len: usize) -> Vec<u8> {
        let frame_length = (7 + payload_len) as u32;
        let mut frame = vec![
            0xff,
            0xf1, // MPEG-4, layer 0, CRC absent
            (1 << 6) | (4 << 2), // profile LC, 44.1 kHz, channel cfg hi bit 0
            (2 << 6) | ((frame_length >> 11) as u8 & 0x3),
            (frame_length >> 3) as u8,
            ((frame_length << 5) as u8) | 0x1f,
            0xfc,
        ];
        frame.resize(7 + payload_len, 0xab);
        frame
    }

    #[test]
    fn header_parsing() {
        let frame = adts_frame(13);
        let head = AdtsHeader::parse(&frame[..7].try_into().unwrap()).expect("valid header");
        assert!(head.crc_absent);
        assert_eq!(head.sample_rate(), 44_100);
        assert_eq!(head.channel_config, 2);
        assert_eq!(head.frame_length, 20);
        assert_eq!(head.header_size(), 7);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(AdtsHeader::parse(&[0u8; 7]).is_none());
        assert!(AdtsHeader::parse(&[0xff, 0xff, 0, 0, 0, 0, 0]).is_none());
    }
}
