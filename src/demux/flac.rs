//! FLAC demuxer (native and Ogg-encapsulated).
//!
//! The first 33 bytes decide the container: a `fLaC` signature starts a
//! native stream (metadata blocks, then frames), while `OggS` with
//! `FLAC` at offset 29 starts the Ogg mapping (one FLAC frame per
//! packet). Both parse STREAMINFO, VORBIS_COMMENT, PICTURE and
//! SEEKTABLE blocks in-crate; frame decoding is delegated to the claxon
//! frame reader.
//!
//! Native seeks land on a SEEKTABLE point when one covers the target
//! and otherwise rewind to the first frame; the remaining distance is
//! decoded and discarded.

use std::io::Read;
use std::sync::{Arc, Mutex};

use claxon::frame::FrameReader;
use claxon::input::BufferedReader;
use ogg::PacketReader;

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, xiph_channel_layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::demux::oggutil::{scan_pages, PageIndex, StreamIo};
use crate::error::{Error, Result};
use crate::io::{Buffer, Reader, Stream};
use crate::media::{id3v2, tags, vorbis as vc, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["fla", "flac"];

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    open(stream, mode)
}

/// Probes the signature and opens the matching variant.
pub(crate) fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    id3v2::skip(stream.as_mut())?;

    let mut probe = [0u8; 33];
    let got = stream.try_read(&mut probe)?;
    stream.rewind_by(got as u64)?;

    if probe.starts_with(b"fLaC") {
        return Ok(Box::new(FlacDemuxer::open_native(stream, mode)?));
    }
    if probe.starts_with(b"OggS") && &probe[29..33] == b"FLAC" {
        return Ok(Box::new(OggFlacDemuxer::open(stream, mode)?));
    }
    Err(Error::invalid_data_format("no FLAC file signature"))
}

/// Parsed STREAMINFO block.
#[derive(Clone, Copy, Debug, Default)]
struct StreamInfoBlock {
    max_block_size: u32,
    sample_rate: u32,
    channels: u32,
    bits_per_sample: u32,
    total_samples: u64,
}

impl StreamInfoBlock {
    fn parse(data: &[u8]) -> Result<StreamInfoBlock> {
        let mut r = Reader::new(data);
        let _min_block_size = r.read_u16_be()?;
        let max_block_size = u32::from(r.read_u16_be()?);
        let _min_frame_size = r.read_u24_be()?;
        let _max_frame_size = r.read_u24_be()?;

        let packed = r.read_u64_be()?;
        Ok(StreamInfoBlock {
            max_block_size,
            sample_rate: (packed >> 44) as u32,
            channels: ((packed >> 41) & 0x7) as u32 + 1,
            bits_per_sample: ((packed >> 36) & 0x1f) as u32 + 1,
            total_samples: packed & 0xf_ffff_ffff,
        })
    }
}

/// Metadata gathered from the block chain.
#[derive(Default)]
struct Metadata {
    streaminfo: StreamInfoBlock,
    comments: vc::CommentBlock,
    pictures: Vec<Vec<u8>>,
    /// `(sample, byte offset relative to the first frame)` seek points.
    seek_points: Vec<(u64, u64)>,
}

/// Walks the metadata block chain at the current position.
fn read_metadata(stream: &mut dyn Stream) -> Result<Metadata> {
    let mut signature = [0u8; 4];
    stream.read(&mut signature)?;
    if &signature != b"fLaC" {
        return Err(Error::invalid_data_format("no FLAC file signature"));
    }

    let mut meta = Metadata::default();
    loop {
        let header = stream.read_u8()?;
        let last = header & 0x80 != 0;
        let block_type = header & 0x7f;

        let mut length = [0u8; 3];
        stream.read(&mut length)?;
        let length =
            (usize::from(length[0]) << 16) | (usize::from(length[1]) << 8) | usize::from(length[2]);

        match block_type {
            0 => {
                let data = stream.read_vec(length)?;
                meta.streaminfo = StreamInfoBlock::parse(&data)?;
            }
            3 => {
                let data = stream.read_vec(length)?;
                for point in data.chunks_exact(18) {
                    let sample =
                        u64::from_be_bytes(point[..8].try_into().expect("sized field"));
                    let offset =
                        u64::from_be_bytes(point[8..16].try_into().expect("sized field"));
                    if sample != u64::MAX {
                        // Placeholder points are padding.
                        meta.seek_points.push((sample, offset));
                    }
                }
            }
            4 => {
                let data = stream.read_vec(length)?;
                let mut r = Reader::new(&data);
                meta.comments = vc::read_block(&mut r)?;
            }
            6 => {
                meta.pictures.push(stream.read_vec(length)?);
            }
            _ => stream.skip(length as u64)?,
        }

        if last {
            break;
        }
    }
    Ok(meta)
}

fn find_picture_block(pictures: &[Vec<u8>], kind: ImageType) -> Result<Option<Image>> {
    for raw in pictures {
        let (picture_type, image) = vc::parse_picture(raw)?;
        if picture_type == kind.code() {
            return Ok(Some(image));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------
// Native FLAC
// ---------------------------------------------------------------------

/// Clonable handle sharing one stream between the frame reader and the
/// demuxer's seek logic.
#[derive(Clone)]
struct SharedStream(Arc<Mutex<Box<dyn Stream>>>);

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut stream = self.0.lock().expect("stream lock poisoned");
        stream
            .try_read(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

type NativeFrameReader = FrameReader<BufferedReader<SharedStream>>;

pub struct FlacDemuxer {
    stream: SharedStream,
    reader: Option<NativeFrameReader>,
    scratch: Vec<i32>,
    meta: Metadata,
    first_frame_offset: u64,
    next_sample: u64,
    pending_skip: u64,
    last_position: u64,
    average_bit_rate: u32,
    scale: f32,
    channel_layout: u32,
}

impl FlacDemuxer {
    fn open_native(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let meta = read_metadata(stream.as_mut())?;
        let info = meta.streaminfo;
        if info.sample_rate == 0 || info.channels == 0 {
            return Err(Error::invalid_data_format("FLAC STREAMINFO block missing"));
        }

        let first_frame_offset = stream.tell()?;
        let average_bit_rate = muldiv(
            stream.size()? - first_frame_offset,
            u64::from(info.sample_rate) * 8,
            info.total_samples.max(1),
        ) as u32;

        let shared = SharedStream(Arc::new(Mutex::new(stream)));
        let reader = if mode.contains(OpenMode::PLAYBACK) {
            Some(FrameReader::new(BufferedReader::new(shared.clone())))
        } else {
            None
        };

        Ok(Self {
            stream: shared,
            reader,
            scratch: Vec::new(),
            meta,
            first_frame_offset,
            next_sample: 0,
            pending_skip: 0,
            last_position: first_frame_offset,
            average_bit_rate,
            scale: 1.0 / (1u64 << (info.bits_per_sample - 1)) as f32,
            channel_layout: xiph_channel_layout(info.channels),
        })
    }

    fn restart_reader(&mut self, byte_offset: u64) -> Result<()> {
        {
            let mut stream = self.stream.0.lock().expect("stream lock poisoned");
            stream.seek_to(byte_offset)?;
        }
        self.last_position = byte_offset;
        self.reader = Some(FrameReader::new(BufferedReader::new(self.stream.clone())));
        Ok(())
    }
}

impl Input for FlacDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        pkt.clear();
        pkt.set_channel_layout(self.channel_layout);
        let total = self.meta.streaminfo.total_samples;

        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        loop {
            let block = match reader.read_next_or_eof(std::mem::take(&mut self.scratch)) {
                Ok(Some(block)) => block,
                Ok(None) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let frames = u64::from(block.duration());
            let channels = block.channels() as usize;

            if self.pending_skip >= frames {
                // Still decoding toward a seek target.
                self.pending_skip -= frames;
                self.next_sample += frames;
                self.scratch = block.into_buffer();
                continue;
            }

            let skip = self.pending_skip as usize;
            self.pending_skip = 0;

            let emit_start = skip;
            let mut emit_end = frames as usize;
            self.next_sample += frames;
            if total != 0 && self.next_sample > total {
                let excess = (self.next_sample - total) as usize;
                emit_end = emit_end.saturating_sub(excess);
                self.next_sample = total;
            }

            if emit_start < emit_end {
                let mut interleaved = Vec::with_capacity((emit_end - emit_start) * channels);
                for frame in emit_start as u32..emit_end as u32 {
                    for ch in 0..channels as u32 {
                        interleaved.push(block.sample(ch, frame) as f32 * self.scale);
                    }
                }
                pkt.assign(&interleaved);
            }
            self.scratch = block.into_buffer();

            if !pkt.is_empty() {
                break;
            }
            if total != 0 && self.next_sample >= total {
                return Ok(());
            }
        }

        // Instantaneous bit rate from the bytes consumed since the last
        // emitted block.
        let position = {
            let mut stream = self.stream.0.lock().expect("stream lock poisoned");
            stream.tell()?
        };
        let bit_rate = if position > self.last_position && pkt.frames() != 0 {
            muldiv(
                position - self.last_position,
                u64::from(self.meta.streaminfo.sample_rate) * 8,
                pkt.frames() as u64,
            ) as u32
        } else {
            self.average_bit_rate
        };
        self.last_position = position;
        pkt.set_bit_rate(bit_rate);
        Ok(())
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let total = self.meta.streaminfo.total_samples;
        let pts = if total != 0 { pts.min(total) } else { pts };

        // Latest seek point at or before the target, else the first
        // frame.
        let (sample, offset) = self
            .meta
            .seek_points
            .iter()
            .take_while(|(sample, _)| *sample <= pts)
            .last()
            .copied()
            .unwrap_or((0, 0));

        if self.reader.is_some() {
            self.restart_reader(self.first_frame_offset + offset)?;
        }
        self.next_sample = sample;
        self.pending_skip = pts - sample;
        Ok(())
    }

    fn format(&self) -> Format {
        Format {
            channels: self.meta.streaminfo.channels,
            channel_layout: self.channel_layout,
            sample_rate: self.meta.streaminfo.sample_rate,
        }
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.format());
        info.codec_id = codec::FLAC;
        info.frames = self.meta.streaminfo.total_samples;
        info.bits_per_sample = self.meta.streaminfo.bits_per_sample;
        info.average_bit_rate = self.average_bit_rate;

        if !self.meta.comments.vendor.is_empty() {
            info.props
                .try_insert(tags::ENCODER, self.meta.comments.vendor.clone());
        }
        vc::apply(&self.meta.comments, &mut info.tags);
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        find_picture_block(&self.meta.pictures, kind)
    }
}

// ---------------------------------------------------------------------
// Ogg FLAC
// ---------------------------------------------------------------------

struct OggFlacParser {
    reader: Option<PacketReader<StreamIo>>,
    /// First audio packet consumed while draining an unknown-length
    /// header chain.
    queued: Option<Vec<u8>>,
}

impl OggFlacParser {
    fn restart_at(&mut self, offset: u64) -> Result<()> {
        let mut io = self.reader.take().expect("packet reader present").into_inner();
        io.0.seek_to(offset)?;
        self.reader = Some(PacketReader::new(io));
        self.queued = None;
        Ok(())
    }
}

impl Feed for OggFlacParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        if let Some(queued) = self.queued.take() {
            dest.assign_slice(&queued);
            return Ok(FeedStatus::Packet { bit_rate: None });
        }
        match self
            .reader
            .as_mut()
            .expect("packet reader present")
            .read_packet()?
        {
            Some(packet) => {
                dest.assign_slice(&packet.data);
                Ok(FeedStatus::Packet { bit_rate: None })
            }
            None => Ok(FeedStatus::Eos),
        }
    }
}

pub struct OggFlacDemuxer {
    inner: Demuxer<OggFlacParser>,
    pages: PageIndex,
    meta: Metadata,
}

impl OggFlacDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let start = stream.tell()?;
        let stream_size = stream.size()?;
        let pages = scan_pages(stream.as_mut(), start)?;
        stream.seek_to(start)?;

        let mut reader = PacketReader::new(StreamIo(stream));
        let first = reader
            .read_packet()?
            .ok_or_else(|| Error::invalid_data_format("empty Ogg stream"))?;

        // 0x7F "FLAC" major minor nheaders(u16BE) "fLaC" STREAMINFO.
        if first.data.len() < 13 || first.data[0] != 0x7f || &first.data[1..5] != b"FLAC" {
            return Err(Error::invalid_data_format("no Ogg FLAC mapping packet"));
        }
        let header_count = u16::from_be_bytes([first.data[7], first.data[8]]);

        let mut meta = Metadata::default();
        let streaminfo_block = &first.data[13..];
        if streaminfo_block.len() < 38 {
            return Err(Error::invalid_data_format("truncated Ogg FLAC STREAMINFO"));
        }
        meta.streaminfo = StreamInfoBlock::parse(&streaminfo_block[4..])?;

        // Remaining header packets: metadata blocks. With an unknown
        // count, drain until the first frame (sync byte 0xFF).
        let mut queued = None;
        let mut remaining = header_count.checked_sub(1);
        loop {
            match remaining {
                Some(0) => break,
                Some(ref mut n) => *n -= 1,
                None => {}
            }

            let Some(packet) = reader.read_packet()? else {
                break;
            };
            let Some(&first_byte) = packet.data.first() else {
                continue;
            };
            if first_byte == 0xff {
                queued = Some(packet.data);
                break;
            }

            match first_byte & 0x7f {
                4 => {
                    let mut r = Reader::new(&packet.data[4..]);
                    meta.comments = vc::read_block(&mut r)?;
                }
                6 => meta.pictures.push(packet.data[4..].to_vec()),
                _ => {}
            }
        }

        let info = meta.streaminfo;
        let total_frames = if info.total_samples != 0 {
            info.total_samples
        } else {
            pages.last_granule
        };

        let format = CodecFormat {
            codec_id: codec::FLAC,
            sample_rate: info.sample_rate,
            channels: info.channels,
            channel_layout: xiph_channel_layout(info.channels),
            bits_per_sample: info.bits_per_sample,
            frames_per_packet: info.max_block_size,
            ..CodecFormat::default()
        };

        let mut inner = Demuxer::new(
            OggFlacParser {
                reader: Some(reader),
                queued,
            },
            format,
        );
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_frames);

        let data_size = stream_size - pages.entries.first().map_or(start, |e| e.offset);
        inner.set_average_bit_rate(muldiv(
            data_size,
            u64::from(info.sample_rate) * 8,
            total_frames.max(1),
        ) as u32);

        Ok(Self { inner, pages, meta })
    }
}

impl Input for OggFlacDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let Some(landing) = self.pages.landing(pts, 0) else {
            return Err(Error::seek_error("Ogg stream holds no audio pages"));
        };

        self.inner.parser_mut().restart_at(landing.offset)?;
        let extra = pts.saturating_sub(landing.start_granule);
        self.inner.set_seek_target(pts, extra);
        Ok(())
    }

    fn format(&self) -> Format {
        self.inner.format()
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.inner.format());
        info.codec_id = codec::FLAC;
        info.frames = self.inner.total_frames();
        info.bits_per_sample = self.meta.streaminfo.bits_per_sample;
        info.average_bit_rate = self.inner.average_bit_rate();
        info.props.insert(tags::CONTAINER, "Ogg FLAC");

        if !self.meta.comments.vendor.is_empty() {
            info.props
                .try_insert(tags::ENCODER, self.meta.comments.vendor.clone());
        }
        vc::apply(&self.meta.comments, &mut info.tags);
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        find_picture_block(&self.meta.pictures, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaminfo_parsing() {
        // 44.1 kHz, stereo, 16-bit, 1234567 samples.
        let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 1_234_567;
        let mut block = Vec::new();
        block.extend_from_slice(&4096u16.to_be_bytes()); // min block
        block.extend_from_slice(&4096u16.to_be_bytes()); // max block
        block.extend_from_slice(&[0, 0, 0]); // min frame
        block.extend_from_slice(&[0, 0, 0]); // max frame
        block.extend_from_slice(&packed.to_be_bytes());
        block.extend_from_slice(&[0u8; 16]); // md5

        let info = StreamInfoBlock::parse(&block).unwrap();
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.total_samples, 1_234_567);
        assert_eq!(info.max_block_size, 4096);
    }

    #[test]
    fn metadata_chain_walk() {
        use crate::io::MemoryStream;

        let packed: u64 = (48_000u64 << 44) | (0u64 << 41) | (23u64 << 36) | 1000;
        let mut streaminfo = Vec::new();
        streaminfo.extend_from_slice(&[16u8, 0, 16, 0]);
        streaminfo.extend_from_slice(&[0; 6]);
        streaminfo.extend_from_slice(&packed.to_be_bytes());
        streaminfo.extend_from_slice(&[0u8; 16]);

        let mut comments = Vec::new();
        comments.extend_from_slice(&6u32.to_le_bytes());
        comments.extend_from_slice(b"vendor");
        comments.extend_from_slice(&1u32.to_le_bytes());
        comments.extend_from_slice(&12u32.to_le_bytes());
        comments.extend_from_slice(b"TITLE=a song");

        let mut data = Vec::new();
        data.extend_from_slice(b"fLaC");
        data.push(0); // STREAMINFO
        data.extend_from_slice(&[0, 0, streaminfo.len() as u8]);
        data.extend_from_slice(&streaminfo);
        data.push(0x80 | 4); // VORBIS_COMMENT, last
        data.extend_from_slice(&[0, 0, comments.len() as u8]);
        data.extend_from_slice(&comments);

        let mut stream = MemoryStream::new(data);
        let meta = read_metadata(&mut stream).unwrap();
        assert_eq!(meta.streaminfo.sample_rate, 48_000);
        assert_eq!(meta.streaminfo.channels, 1);
        assert_eq!(meta.streaminfo.bits_per_sample, 24);
        assert_eq!(meta.comments.vendor, "vendor");
        assert_eq!(meta.comments.entries[0].1, "a song");
    }
}
