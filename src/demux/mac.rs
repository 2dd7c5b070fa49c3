//! Monkey's Audio (APE codec) demuxer.
//!
//! Supports file versions 3.80 through 3.99. Version 3.98+ carries a
//! rich descriptor/header pair; older versions pack everything into one
//! legacy header with derived block sizes. The seek table gives the byte
//! offset of every APE frame; versions before 3.81 add a companion table
//! of per-frame bit offsets. Each packet fed to the decoder is prefixed
//! with `[blocks(u32LE), skip_bits(u32LE)]`.

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, guess_channel_layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Stream};
use crate::media::{ape, id3v1, tags, Image, ImageType};
use crate::util::{align_up, muldiv};

pub(crate) const EXTENSIONS: &[&str] = &["ape"];

const FORMAT_FLAG_8_BIT: u16 = 1 << 0;
const FORMAT_FLAG_HAS_PEAK_LEVEL: u16 = 1 << 2;
const FORMAT_FLAG_24_BIT: u16 = 1 << 3;
const FORMAT_FLAG_HAS_SEEK_ELEMENTS: u16 = 1 << 4;
const FORMAT_FLAG_CREATE_WAV_HEADER: u16 = 1 << 5;

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(MacDemuxer::open(stream, mode)?))
}

#[derive(Clone, Copy, Debug, Default)]
struct MacFrame {
    pos: u64,
    size: u32,
    skip: u32,
}

struct MacParser {
    file: Box<dyn Stream>,
    frames: Vec<MacFrame>,
    blocks_per_frame: u32,
    final_frame_blocks: u32,
    sample_rate: u32,
    current_frame: usize,
}

impl Feed for MacParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let Some(frame) = self.frames.get(self.current_frame).copied() else {
            return Ok(FeedStatus::Eos);
        };

        self.file.seek_to(frame.pos)?;
        let blocks = if self.current_frame + 1 == self.frames.len() {
            self.final_frame_blocks
        } else {
            self.blocks_per_frame
        };

        dest.resize(frame.size as usize + 8);
        dest.as_mut_slice()[..4].copy_from_slice(&blocks.to_le_bytes());
        dest.as_mut_slice()[4..8].copy_from_slice(&frame.skip.to_le_bytes());
        self.file.read(&mut dest.as_mut_slice()[8..])?;

        self.current_frame += 1;
        let bit_rate = muldiv(
            u64::from(frame.size),
            u64::from(self.sample_rate) * 8,
            u64::from(blocks),
        ) as u32;
        Ok(FeedStatus::Packet {
            bit_rate: Some(bit_rate),
        })
    }
}

pub struct MacDemuxer {
    inner: Demuxer<MacParser>,
    version: u16,
    compression_level: u16,
    id3v1_start: Option<u64>,
    apev2_start: Option<u64>,
}

impl MacDemuxer {
    #[allow(clippy::too_many_lines)]
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let apev2_start = ape::find(file)?;
        let id3v1_start = if apev2_start.is_none() {
            id3v1::find(file)?
        } else {
            None
        };

        file.rewind()?;
        let mut signature = [0u8; 4];
        file.read(&mut signature)?;
        let version = file.read_u16_le()?;

        if &signature != b"MAC " {
            return Err(Error::invalid_data_format("not a Monkey's Audio file"));
        }
        if !(3800..=3990).contains(&version) {
            return Err(Error::not_implemented(format!(
                "unsupported Monkey's Audio file version: {}.{:02}",
                version / 1000,
                (version % 1000) / 10
            )));
        }

        let descriptor_size;
        let ape_header_size;
        let mut seek_table_size;
        let wav_header_size;
        let trail_data_size;

        let compression_level;
        let format_flags;
        let blocks_per_frame;
        let final_frame_blocks;
        let total_frames;
        let bits_per_sample;
        let channels;
        let sample_rate;

        if version >= 3980 {
            let _padding = file.read_u16_le()?;
            descriptor_size = file.read_u32_le()?;
            ape_header_size = file.read_u32_le()?;
            seek_table_size = file.read_u32_le()?;
            wav_header_size = file.read_u32_le()?;
            let _audio_data_size = file.read_u64_le()?;
            trail_data_size = file.read_u32_le()?;
            let mut md5 = [0u8; 16];
            file.read(&mut md5)?;

            if descriptor_size > 52 {
                file.skip(u64::from(descriptor_size) - 52)?;
            }

            compression_level = file.read_u16_le()?;
            format_flags = file.read_u16_le()?;
            blocks_per_frame = file.read_u32_le()?;
            final_frame_blocks = file.read_u32_le()?;
            total_frames = file.read_u32_le()?;
            bits_per_sample = u32::from(file.read_u16_le()?);
            channels = u32::from(file.read_u16_le()?);
            sample_rate = file.read_u32_le()?;
        } else {
            descriptor_size = 6;
            let mut header_size = 26u32;

            compression_level = file.read_u16_le()?;
            format_flags = file.read_u16_le()?;
            channels = u32::from(file.read_u16_le()?);
            sample_rate = file.read_u32_le()?;
            wav_header_size = file.read_u32_le()?;
            trail_data_size = file.read_u32_le()?;
            total_frames = file.read_u32_le()?;
            final_frame_blocks = file.read_u32_le()?;

            if format_flags & FORMAT_FLAG_HAS_PEAK_LEVEL != 0 {
                file.skip(4)?;
                header_size += 4;
            }

            if format_flags & FORMAT_FLAG_HAS_SEEK_ELEMENTS != 0 {
                seek_table_size = file.read_u32_le()?;
                header_size += 4;
            } else {
                seek_table_size = total_frames;
            }
            seek_table_size *= 4;
            ape_header_size = header_size;

            bits_per_sample = if format_flags & FORMAT_FLAG_8_BIT != 0 {
                8
            } else if format_flags & FORMAT_FLAG_24_BIT != 0 {
                24
            } else {
                16
            };

            blocks_per_frame = if version >= 3950 {
                73_728 * 4
            } else if version >= 3900 || compression_level >= 4000 {
                73_728
            } else {
                9_216
            };

            if format_flags & FORMAT_FLAG_CREATE_WAV_HEADER == 0 {
                file.skip(u64::from(wav_header_size))?;
            }
        }

        if total_frames == 0 {
            return Err(Error::failure("Monkey's Audio file contains zero frames"));
        }
        if seek_table_size / 4 < total_frames {
            return Err(Error::invalid_data_format(format!(
                "seek table size ({}) is less than the total frame count ({total_frames})",
                seek_table_size / 4
            )));
        }

        let mut data_start = u64::from(descriptor_size)
            + u64::from(ape_header_size)
            + u64::from(seek_table_size)
            + u64::from(wav_header_size);
        if version < 3810 {
            data_start += u64::from(total_frames);
        }

        let file_size = file.size()?;
        let mut data_end = apev2_start.or(id3v1_start).unwrap_or(file_size);
        data_end -= u64::from(trail_data_size);

        // Seek table: byte offset of each frame in the data section.
        let mut seek_bytes = vec![0u8; seek_table_size as usize];
        file.read(&mut seek_bytes)?;

        let mut frames = vec![MacFrame::default(); total_frames as usize];
        frames[0].pos = data_start;
        frames[0].skip = 0;

        for i in 1..total_frames as usize {
            let pos = u64::from(u32::from_le_bytes(
                seek_bytes[i * 4..i * 4 + 4].try_into().expect("sized entry"),
            ));
            frames[i].pos = pos;
            frames[i].skip = (pos.wrapping_sub(data_start) & 3) as u32;
            frames[i - 1].size = (pos - frames[i - 1].pos) as u32;
        }

        let last = total_frames as usize - 1;
        frames[last].size = (data_end - frames[last].pos) as u32;

        for frame in &mut frames {
            if frame.skip != 0 {
                frame.pos -= u64::from(frame.skip);
                frame.size += frame.skip;
            }
            frame.size = align_up(u64::from(frame.size), 4) as u32;
        }
        if frames[last].pos + u64::from(frames[last].size) > file_size {
            frames[last].size = (file_size - frames[last].pos) as u32;
        }

        // Pre-3.81 files append one bit-offset byte per frame.
        if version < 3810 {
            let mut bit_offsets = vec![0u8; total_frames as usize];
            file.read(&mut bit_offsets)?;
            for i in 0..total_frames as usize {
                if i + 1 < total_frames as usize && bit_offsets[i + 1] != 0 {
                    frames[i].size += 4;
                }
                frames[i].skip = (frames[i].skip << 3) + u32::from(bit_offsets[i]);
            }
        }

        let mut extra = Vec::with_capacity(6);
        extra.extend_from_slice(&version.to_le_bytes());
        extra.extend_from_slice(&compression_level.to_le_bytes());
        extra.extend_from_slice(&format_flags.to_le_bytes());

        let format = CodecFormat {
            extra: Buffer::from_vec(extra),
            codec_id: codec::MONKEYS_AUDIO,
            channel_layout: guess_channel_layout(channels),
            channels,
            sample_rate,
            bits_per_sample,
            frames_per_packet: blocks_per_frame,
            ..CodecFormat::default()
        };

        let total_blocks = u64::from(blocks_per_frame) * (u64::from(total_frames) - 1)
            + u64::from(final_frame_blocks);
        let average_bit_rate =
            muldiv(data_end - data_start, u64::from(sample_rate) * 8, total_blocks) as u32;

        let mut inner = Demuxer::new(
            MacParser {
                file: stream,
                frames,
                blocks_per_frame,
                final_frame_blocks,
                sample_rate,
                current_frame: 0,
            },
            format,
        );
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_blocks);
        inner.set_average_bit_rate(average_bit_rate);

        Ok(Self {
            inner,
            version,
            compression_level,
            id3v1_start,
            apev2_start,
        })
    }
}

impl Input for MacDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let pts = pts.min(self.inner.total_frames());
        let blocks_per_frame = u64::from(self.inner.parser().blocks_per_frame);
        let nearest = (pts / blocks_per_frame) as usize;
        let priming = pts % blocks_per_frame;

        let parser = self.inner.parser_mut();
        let nearest = nearest.min(parser.frames.len().saturating_sub(1));
        let pos = parser.frames[nearest].pos;
        parser.file.seek_to(pos)?;
        parser.current_frame = nearest;
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

        info.props.insert(
            tags::CONTAINER,
            format!(
                "Monkey's Audio {}.{:02}",
                self.version / 1000,
                (self.version % 1000) / 10
            ),
        );

        let compression = match self.compression_level {
            1000 => Some("Fast"),
            2000 => Some("Normal"),
            3000 => Some("High"),
            4000 => Some("Extra high"),
            5000 => Some("Insane"),
            _ => None,
        };
        if let Some(compression) = compression {
            info.props
                .insert(tags::CODEC_PROFILE, format!("{compression} compression"));
        }

        let file = self.inner.parser_mut().file.as_mut();
        if self.apev2_start.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if let Some(start) = self.id3v1_start {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        if self.apev2_start.is_some() {
            return ape::find_image(self.inner.parser_mut().file.as_mut(), kind);
        }
        Ok(None)
    }
}
