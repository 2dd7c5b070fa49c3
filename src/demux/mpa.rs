//! MPEG audio demuxer (MPEG-1/2/2.5, Layers I–III).
//!
//! The stream is scanned for valid frame headers (11-bit sync word plus
//! legal version/layer/bit-rate/sample-rate fields); a bad byte in the
//! middle of the stream is skipped byte-by-byte until the next sync.
//! The first frame may carry a Xing/Info or VBRI header declaring the
//! frame count and encoder delays; iTunes writes the same gapless data
//! into an `iTunSMPB` comment, consulted only when the LAME header left
//! priming unset. A seek table of frame offsets is built incrementally
//! during playback (or eagerly when no header declared a total).

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, guess_channel_layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Reader, Stream};
use crate::media::{ape, id3v1, id3v2, tags, Dictionary, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["m1a", "m2a", "mp1", "mp2", "mp3", "mpa"];

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(MpaDemuxer::open(stream, mode)?))
}

/// One 32-bit MPEG audio frame header.
#[derive(Clone, Copy, Debug, Default)]
struct FrameHeader {
    data: u32,
}

impl FrameHeader {
    fn present(self) -> bool {
        self.data != 0
    }

    fn version_bits(self) -> u8 {
        ((self.data >> 19) & 0x3) as u8
    }

    /// Low sampling frequencies (MPEG-2 and 2.5).
    fn lsf(self) -> bool {
        self.data & (0x1 << 19) == 0
    }

    /// MPEG-2.5 extension.
    fn v25(self) -> bool {
        self.data & (0x1 << 20) == 0
    }

    fn layer(self) -> u8 {
        4 - ((self.data >> 17) & 0x3) as u8
    }

    fn bit_rate_index(self) -> usize {
        ((self.data >> 12) & 0xf) as usize
    }

    fn sample_rate_index(self) -> usize {
        ((self.data >> 10) & 0x3) as usize
    }

    fn padding(self) -> u32 {
        u32::from(self.data & 0x0000_0200 != 0)
    }

    fn mode(self) -> u8 {
        ((self.data >> 6) & 0x3) as u8
    }

    fn bit_rate(self) -> u32 {
        // Bit rates in units of 8 kbit/s, indexed by [lsf][layer][index].
        static TABLE: [[[u8; 16]; 3]; 2] = [
            [
                // MPEG-1
                [0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 44, 48, 52, 56, 0],
                [0, 4, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32, 40, 48, 0],
                [0, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32, 40, 0],
            ],
            [
                // MPEG-2(.5)
                [0, 4, 6, 7, 8, 10, 12, 14, 16, 18, 20, 22, 24, 28, 32, 0],
                [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 18, 20, 0],
                [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 18, 20, 0],
            ],
        ];

        u32::from(TABLE[usize::from(self.lsf())][usize::from(self.layer() - 1)]
            [self.bit_rate_index()])
            * 8_000
    }

    fn sample_rate(self) -> u32 {
        static TABLE: [u32; 3] = [44_100, 48_000, 32_000];
        let mut rate = TABLE[self.sample_rate_index()];
        rate >>= u32::from(self.lsf());
        rate >>= u32::from(self.v25());
        rate
    }

    fn channels(self) -> u32 {
        if self.mode() == 3 {
            1
        } else {
            2
        }
    }

    fn samples_per_frame(self) -> u32 {
        static TABLE: [[u32; 3]; 2] = [[384, 1152, 1152], [384, 1152, 576]];
        TABLE[usize::from(self.lsf())][usize::from(self.layer() - 1)]
    }

    fn frame_size(self) -> u32 {
        let num = self.bit_rate();
        let den = self.sample_rate();
        let pad = self.padding();

        match self.layer() {
            3 if self.lsf() => 72 * num / den + pad,
            3 | 2 => 144 * num / den + pad,
            _ => (12 * num / den + pad) << 2,
        }
    }

    fn side_info_size(self) -> u32 {
        if self.lsf() {
            if self.channels() == 1 {
                0x09
            } else {
                0x11
            }
        } else if self.channels() == 1 {
            0x11
        } else {
            0x20
        }
    }

    fn valid(self) -> bool {
        (self.data >> 21) & 0x7ff == 0x7ff       // sync word
            && (self.data >> 19) & 0x3 != 0x1    // MPEG version
            && (self.data >> 17) & 0x3 != 0x0    // MPEG audio layer
            && (self.data >> 12) & 0xf != 0xf    // bit rate index
            && (self.data >> 10) & 0x3 != 0x3    // sample rate index
            && self.data & 0x3 != 0x2            // emphasis
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SyncInfo {
    priming: u32,
    padding: u32,
    frames: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct XingInfo {
    vbr_scale: u32,
    vbr_method: u8,
    version: [u8; 9],
}

struct MpaParser {
    file: Box<dyn Stream>,
    data_end: u64,
    seek_table: Vec<u64>,
    packet_number: usize,
}

impl MpaParser {
    /// Finds the next valid frame header, resynchronizing byte-by-byte
    /// over garbage. Returns the header with its byte offset and size.
    fn read_frame_header(&mut self) -> Result<Option<(FrameHeader, u64, u32)>> {
        let file = self.file.as_mut();
        let mut offset = file.tell()? + 4;
        if offset >= self.data_end {
            return Ok(None);
        }

        let mut head = FrameHeader {
            data: file.read_u32_be()?,
        };
        if !head.valid() {
            loop {
                loop {
                    offset += 1;
                    if offset == self.data_end {
                        return Ok(None);
                    }
                    head.data = (head.data << 8) | u32::from(file.read_u8()?);
                    if (head.data >> 21) & 0x7ff == 0x7ff {
                        break;
                    }
                }
                if head.valid() {
                    break;
                }
            }
        }

        let length = head.frame_size();
        offset -= 4;
        if offset + u64::from(length) <= self.data_end {
            return Ok(Some((head, offset, length)));
        }
        Ok(None)
    }

    /// Scans the whole data section, recording every frame offset.
    fn fill_seek_table(&mut self, data_start: u64) -> Result<()> {
        self.file.seek_to(data_start)?;
        while let Some((_, offset, length)) = self.read_frame_header()? {
            self.seek_table.push(offset);
            self.file.seek_to(offset + u64::from(length))?;
        }
        Ok(())
    }
}

impl Feed for MpaParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let Some((head, offset, length)) = self.read_frame_header()? else {
            return Ok(FeedStatus::Eos);
        };

        dest.resize(length as usize);
        dest.as_mut_slice()[..4].copy_from_slice(&head.data.to_be_bytes());
        self.file.read(&mut dest.as_mut_slice()[4..])?;

        debug_assert!(self.seek_table.len() >= self.packet_number);
        if self.seek_table.len() == self.packet_number {
            self.seek_table.push(offset);
        }
        self.packet_number += 1;

        Ok(FeedStatus::Packet {
            bit_rate: Some(head.bit_rate()),
        })
    }
}

pub struct MpaDemuxer {
    inner: Demuxer<MpaParser>,
    data_start: u64,
    id3v2_size: u64,
    id3v1_start: Option<u64>,
    apev2_start: Option<u64>,
    mpeg_version: u8,
    xing: XingInfo,
}

impl MpaDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let mut data_start = 0u64;
        let mut id3v2_size = 0u64;
        if id3v2::skip(file)? {
            data_start = file.tell()?;
            id3v2_size = data_start;
        }

        let apev2_start = ape::find(file)?;
        let id3v1_start = if apev2_start.is_none() {
            id3v1::find(file)?
        } else {
            None
        };
        let data_end = apev2_start.or(id3v1_start).unwrap_or(file.size()?);

        file.seek_to(data_start)?;
        let mut parser = MpaParser {
            file: stream,
            data_end,
            seek_table: Vec::new(),
            packet_number: 0,
        };

        let Some((head, _, _)) = parser.read_frame_header()? else {
            return Err(Error::invalid_data_format(
                "no valid MPEG audio frame header(s) found",
            ));
        };

        let mut format = CodecFormat {
            sample_rate: head.sample_rate(),
            channels: head.channels(),
            frames_per_packet: head.samples_per_frame(),
            codec_id: match head.layer() {
                3 => codec::MPEG_LAYER3,
                2 => codec::MPEG_LAYER2,
                _ => codec::MPEG_LAYER1,
            },
            ..CodecFormat::default()
        };
        format.channel_layout = guess_channel_layout(format.channels);

        let mut xing = XingInfo::default();
        let mut sync = SyncInfo::default();
        if find_vbr_tags(&mut parser, data_start, head, &mut format, &mut xing, &mut sync)? {
            data_start += u64::from(head.frame_size());
        }
        if sync.priming == 0 && id3v2_size != 0 {
            find_itunsmpb(parser.file.as_mut(), &mut sync)?;
        }

        if sync.frames != 0 {
            parser
                .seek_table
                .reserve((sync.frames / u64::from(format.frames_per_packet)) as usize);
            parser.seek_table.push(data_start);
        } else {
            parser.fill_seek_table(data_start)?;
            sync.frames = parser.seek_table.len() as u64 * u64::from(format.frames_per_packet);
        }

        let bit_rate = format.bit_rate;
        parser.file.seek_to(data_start)?;

        let mut inner = Demuxer::new(parser, format);
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(sync.frames);
        inner.set_encoder_delay(sync.priming);

        let average_bit_rate = if bit_rate != 0 {
            bit_rate
        } else {
            muldiv(
                data_end - data_start,
                u64::from(inner.codec_format().sample_rate) * 8,
                inner.total_frames(),
            ) as u32
        };
        inner.set_average_bit_rate(average_bit_rate);

        Ok(Self {
            inner,
            data_start,
            id3v2_size,
            id3v1_start,
            apev2_start,
            mpeg_version: head.version_bits(),
            xing,
        })
    }
}

/// Looks for a Xing/Info or VBRI header in the first frame. Returns
/// whether one was found (the frame then carries no audio).
fn find_vbr_tags(
    parser: &mut MpaParser,
    data_start: u64,
    head: FrameHeader,
    format: &mut CodecFormat,
    xing: &mut XingInfo,
    sync: &mut SyncInfo,
) -> Result<bool> {
    let xing_offset = head.side_info_size() as usize + 4;
    let vbri_offset = 0x20 + 4;

    parser.file.seek_to(data_start)?;
    let frame = parser
        .file
        .as_mut()
        .read_vec(head.frame_size() as usize)?;
    let mut r = Reader::new(&frame);

    let mut xing_tag = [0u8; 4];
    let mut vbri_tag = [0u8; 4];
    if frame.len() >= xing_offset + 8 {
        xing_tag.copy_from_slice(&frame[xing_offset..xing_offset + 4]);
    }
    if frame.len() >= vbri_offset + 6 {
        vbri_tag.copy_from_slice(&frame[vbri_offset..vbri_offset + 4]);
    }

    if &xing_tag == b"Xing" || &xing_tag == b"Info" {
        if &xing_tag == b"Info" {
            format.bit_rate = head.bit_rate();
        }

        r.skip(xing_offset + 4)?;
        let flags = r.read_u32_be()?;

        if flags & 0x1 != 0 {
            sync.frames = u64::from(r.read_u32_be()?) * u64::from(format.frames_per_packet);
        }
        if flags & 0x2 != 0 {
            r.skip(4)?; // byte count
        }
        if flags & 0x4 != 0 {
            r.skip(100)?; // seek point table
        }
        if flags & 0x8 != 0 {
            xing.vbr_scale = r.read_u32_be()?;
        }

        // The 36-byte LAME extension carries the encoder delays.
        if r.remain() >= 36 {
            xing.version.copy_from_slice(r.read_bytes(9)?);
            xing.vbr_method = r.read_u8()? & 0xf;
            r.skip(11)?;

            let delay_and_padding = r.read_u32_be()?;
            sync.priming = (delay_and_padding >> 20) & 0xfff;
            sync.padding = (delay_and_padding >> 8) & 0xfff;

            if sync.frames >= u64::from(sync.priming) {
                sync.frames -= u64::from(sync.priming);
            }
            if sync.frames >= u64::from(sync.padding) {
                sync.frames -= u64::from(sync.padding);
            }
        }
        return Ok(true);
    }

    if &vbri_tag == b"VBRI" {
        r.skip(vbri_offset + 4)?;
        let vbri_version = r.read_u16_be()?;
        if vbri_version == 1 && r.remain() >= 10 {
            let delay = r.read_u16_be()?;
            let _quality = r.read_u16_be()?;
            let _bytes = r.read_u32_be()?;
            let frames = r.read_u32_be()?;

            sync.frames = u64::from(frames) * u64::from(format.frames_per_packet);
            sync.priming = u32::from(delay);

            if sync.frames >= u64::from(sync.priming) {
                sync.frames -= u64::from(sync.priming);
            }
        }
        return Ok(true);
    }
    Ok(false)
}

/// Parses the `iTunSMPB` gapless comment:
/// `xxxxxxxx PPPPPPPP DDDDDDDD FFFFFFFFFFFFFFFF` (hex: reserved,
/// priming, padding, total frames).
fn find_itunsmpb(file: &mut dyn Stream, sync: &mut SyncInfo) -> Result<()> {
    file.rewind()?;
    let mut dict = Dictionary::new();
    id3v2::read(file, &mut dict)?;

    if let Some(value) = dict.get("comment:iTunSMPB") {
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() >= 4 {
            let priming = u32::from_str_radix(fields[1], 16);
            let padding = u32::from_str_radix(fields[2], 16);
            let frames = u64::from_str_radix(fields[3], 16);
            if let (Ok(priming), Ok(padding), Ok(frames)) = (priming, padding, frames) {
                sync.priming = priming;
                sync.padding = padding;
                sync.frames = frames;
            }
        }
    }
    Ok(())
}

impl Input for MpaDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let frames_per_packet = u64::from(self.inner.codec_format().frames_per_packet);
        let mut nearest = (pts / frames_per_packet) as usize;
        let mut priming = pts % frames_per_packet;

        // Back up a few packets and decode into the target so the
        // decoder's bit reservoir is warm when we arrive.
        let preroll = nearest.min(10);
        nearest -= preroll;
        priming += preroll as u64 * frames_per_packet;

        let parser = self.inner.parser_mut();
        debug_assert!(!parser.seek_table.is_empty());

        if nearest >= parser.seek_table.len() {
            let last = *parser.seek_table.last().expect("seek table seeded");
            parser.file.seek_to(last)?;
            loop {
                let Some((_, offset, length)) = parser.read_frame_header()? else {
                    nearest = parser.seek_table.len() - 1;
                    priming = 0;
                    break;
                };

                if *parser.seek_table.last().expect("nonempty") != offset {
                    parser.seek_table.push(offset);
                }
                parser.file.seek_to(offset + u64::from(length))?;
                if nearest < parser.seek_table.len() {
                    break;
                }
            }
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
        info.props.insert(
            tags::CONTAINER,
            match self.mpeg_version {
                0b11 => "MPEG 1",
                0b10 => "MPEG 2",
                _ => "MPEG 2.5",
            },
        );

        if &self.xing.version[..4] == b"LAME" {
            let profile = match self.xing.vbr_method {
                1 | 8 => "CBR".to_owned(),
                2 | 9 => "ABR".to_owned(),
                3..=6 => format!("VBR {}", (100 - self.xing.vbr_scale) / 10),
                _ => String::new(),
            };
            info.props.insert(tags::CODEC_PROFILE, profile);
            info.props.insert(
                tags::ENCODER,
                String::from_utf8_lossy(&self.xing.version).into_owned(),
            );
        }

        let file = self.inner.parser_mut().file.as_mut();
        if self.id3v2_size != 0 {
            file.rewind()?;
            id3v2::read(file, &mut info.tags)?;
        } else if self.apev2_start.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if let Some(start) = self.id3v1_start {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        let file = self.inner.parser_mut().file.as_mut();
        if self.id3v2_size != 0 {
            file.rewind()?;
            return id3v2::find_image(file, kind);
        }
        if self.apev2_start.is_some() {
            return ape::find_image(file, kind);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, stereo, no padding.
    const MP3_HEADER: u32 = 0xfffb_9000;

    #[test]
    fn header_fields() {
        let head = FrameHeader { data: MP3_HEADER };
        assert!(head.valid());
        assert_eq!(head.layer(), 3);
        assert_eq!(head.bit_rate(), 128_000);
        assert_eq!(head.sample_rate(), 44_100);
        assert_eq!(head.channels(), 2);
        assert_eq!(head.samples_per_frame(), 1152);
        assert_eq!(head.frame_size(), 417);
        assert!(!head.lsf());
    }

    #[test]
    fn mpeg2_halves_sample_rate() {
        // MPEG-2 Layer III, 48 kHz table entry -> 24 kHz.
        let head = FrameHeader { data: 0xfff3_9400 };
        assert!(head.valid());
        assert!(head.lsf());
        assert_eq!(head.sample_rate(), 24_000);
        assert_eq!(head.samples_per_frame(), 576);
    }

    #[test]
    fn invalid_headers_rejected() {
        assert!(!FrameHeader { data: 0 }.valid());
        // Bad bit-rate index (0xf).
        assert!(!FrameHeader { data: 0xfffb_f000 }.valid());
        // Bad sample-rate index (0x3).
        assert!(!FrameHeader { data: 0xfffb_9c00 }.valid());
    }

    #[test]
    fn itunsmpb_parsing() {
        use crate::io::MemoryStream;

        // Build an ID3v2.3 tag holding the comment, then parse it back.
        let mut content = vec![0u8];
        content.extend_from_slice(b"eng");
        content.extend_from_slice(b"iTunSMPB\0");
        content.extend_from_slice(b" 00000000 00000840 00000540 00000000000B45C0");

        let mut body = Vec::new();
        body.extend_from_slice(b"COMM");
        body.extend_from_slice(&(content.len() as u32).to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&content);

        let mut tag = Vec::new();
        tag.extend_from_slice(b"ID3\x03\x00\x00");
        tag.extend_from_slice(&[
            ((body.len() >> 21) & 0x7f) as u8,
            ((body.len() >> 14) & 0x7f) as u8,
            ((body.len() >> 7) & 0x7f) as u8,
            (body.len() & 0x7f) as u8,
        ]);
        tag.extend_from_slice(&body);

        let mut stream = MemoryStream::new(tag);
        let mut sync = SyncInfo::default();
        find_itunsmpb(&mut stream, &mut sync).unwrap();

        assert_eq!(sync.priming, 0x840); // 2112 frames dropped
        assert_eq!(sync.padding, 0x540);
        assert_eq!(sync.frames, 0xB45C0);
    }
}
