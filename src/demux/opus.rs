//! Ogg Opus demuxer.
//!
//! Reads `OpusHead` (channel count, pre-skip, output gain, mapping
//! family) and `OpusTags`, then feeds raw Opus packets to the decoder.
//! Output is always 48 kHz; granule positions count 48 kHz samples
//! including the pre-skip, so the total frame count is the final granule
//! minus pre-skip. Seeking restarts packetization at an indexed page
//! boundary and trims the landing offset through the demuxer protocol.

use ogg::PacketReader;

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, xiph_channel_layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::codec::opus::OpusHead;
use crate::demux::oggutil::{scan_pages, PageIndex, StreamIo};
use crate::error::{Error, Result};
use crate::io::{Buffer, Stream};
use crate::media::{tags, vorbis as vc, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["opus"];

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(OpusDemuxer::open(stream, mode)?))
}

/// Duration of one Opus packet in 48 kHz samples, derived from the TOC
/// byte.
fn packet_duration(data: &[u8]) -> u32 {
    let Some(&toc) = data.first() else {
        return 0;
    };

    let config = toc >> 3;
    let frame_samples = match config {
        0..=11 => match config & 0x3 {
            0 => 480,  // 10 ms SILK
            1 => 960,  // 20 ms
            2 => 1920, // 40 ms
            _ => 2880, // 60 ms
        },
        12..=15 => {
            if config & 0x1 == 0 {
                480 // 10 ms hybrid
            } else {
                960 // 20 ms
            }
        }
        _ => match config & 0x3 {
            0 => 120, // 2.5 ms CELT
            1 => 240, // 5 ms
            2 => 480, // 10 ms
            _ => 960, // 20 ms
        },
    };

    let frames = match toc & 0x3 {
        0 => 1,
        1 | 2 => 2,
        _ => u32::from(data.get(1).copied().unwrap_or(0) & 0x3f),
    };
    frame_samples * frames
}

struct OpusParser {
    reader: Option<PacketReader<StreamIo>>,
}

impl OpusParser {
    fn reader_mut(&mut self) -> &mut PacketReader<StreamIo> {
        self.reader.as_mut().expect("packet reader present")
    }

    /// Restarts packetization at an absolute byte offset (a page
    /// boundary holding no continued packet).
    fn restart_at(&mut self, offset: u64) -> Result<()> {
        let mut io = self.reader.take().expect("packet reader present").into_inner();
        io.0.seek_to(offset)?;
        self.reader = Some(PacketReader::new(io));
        Ok(())
    }
}

impl Feed for OpusParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        match self.reader_mut().read_packet()? {
            Some(packet) => {
                let duration = packet_duration(&packet.data);
                dest.assign_slice(&packet.data);
                let bit_rate = if duration != 0 {
                    Some(muldiv(dest.len() as u64, 48_000 * 8, u64::from(duration)) as u32)
                } else {
                    None
                };
                Ok(FeedStatus::Packet { bit_rate })
            }
            None => Ok(FeedStatus::Eos),
        }
    }
}

pub struct OpusDemuxer {
    inner: Demuxer<OpusParser>,
    pages: PageIndex,
    comments: vc::CommentBlock,
    head: OpusHead,
}

impl OpusDemuxer {
    pub(crate) fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let start = stream.tell()?;
        let stream_size = stream.size()?;
        let pages = scan_pages(stream.as_mut(), start)?;
        stream.seek_to(start)?;

        let mut reader = PacketReader::new(StreamIo(stream));

        let head_packet = reader
            .read_packet()?
            .ok_or_else(|| Error::invalid_data_format("empty Ogg stream"))?;
        if !head_packet.data.starts_with(b"OpusHead") {
            return Err(Error::invalid_data_format("no OpusHead packet"));
        }
        let head = OpusHead::parse(&head_packet.data)
            .ok_or_else(|| Error::invalid_data_format("truncated OpusHead packet"))?;

        let tags_packet = reader
            .read_packet()?
            .ok_or_else(|| Error::invalid_data_format("missing OpusTags packet"))?;
        let comments = if tags_packet.data.starts_with(b"OpusTags") {
            let mut r = crate::io::Reader::new(&tags_packet.data[8..]);
            vc::read_block(&mut r)?
        } else {
            vc::CommentBlock::default()
        };

        let channels = head.channels.max(1);
        let format = CodecFormat {
            extra: Buffer::from_vec(head_packet.data),
            codec_id: codec::OPUS,
            sample_rate: 48_000,
            channels,
            channel_layout: xiph_channel_layout(channels),
            ..CodecFormat::default()
        };

        let total_frames = pages
            .last_granule
            .saturating_sub(u64::from(head.pre_skip));

        let mut inner = Demuxer::new(OpusParser {
            reader: Some(reader),
        }, format);
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_frames);

        let data_size = stream_size - pages.entries.first().map_or(start, |e| e.offset);
        inner.set_average_bit_rate(muldiv(data_size, 48_000 * 8, total_frames.max(1)) as u32);

        Ok(Self {
            inner,
            pages,
            comments,
            head,
        })
    }
}

impl Input for OpusDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let target_granule = pts + u64::from(self.head.pre_skip);
        let Some(landing) = self.pages.landing(target_granule, 0) else {
            return Err(Error::seek_error("Ogg stream holds no audio pages"));
        };

        self.inner.parser_mut().restart_at(landing.offset)?;
        // The landing page starts `target - start_granule` samples
        // before the request; the protocol's priming (decoder delay =
        // pre-skip, plus this offset) drops them.
        let extra = target_granule
            .saturating_sub(landing.start_granule)
            .saturating_sub(u64::from(self.head.pre_skip));
        self.inner.set_seek_target(pts, extra);
        Ok(())
    }

    fn format(&self) -> Format {
        self.inner.format()
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.inner.format());
        info.frames = self.inner.total_frames();
        info.codec_id = codec::OPUS;
        info.average_bit_rate = self.inner.average_bit_rate();
        info.props.insert(tags::CONTAINER, "Ogg");

        vc::apply(&self.comments, &mut info.tags);

        // Fold R128 gains into ReplayGain tags unless the stream
        // already carries them.
        if !info.tags.contains_key(tags::RG_ALBUM_GAIN)
            && !info.tags.contains_key(tags::RG_TRACK_GAIN)
        {
            let output_gain = i32::from(self.head.output_gain_q8);
            info.tags.insert(
                tags::RG_ALBUM_GAIN,
                vc::r128_to_replaygain(0, output_gain),
            );

            let track_gain = self
                .comments
                .values("R128_TRACK_GAIN")
                .find_map(vc::parse_r128_gain);
            if let Some(gain) = track_gain {
                info.tags.insert(
                    tags::RG_TRACK_GAIN,
                    vc::r128_to_replaygain(gain, output_gain),
                );
            }
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        vc::find_picture(&self.comments, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_durations() {
        // CELT FB 20 ms, code 0 (one frame).
        assert_eq!(packet_duration(&[0b1111_1100]), 960);
        // SILK NB 10 ms, code 0.
        assert_eq!(packet_duration(&[0b0000_0000]), 480);
        // SILK NB 60 ms, code 3 with 2 frames.
        assert_eq!(packet_duration(&[0b0001_1011, 2]), 5760);
        // Hybrid 20 ms, code 1 (two frames).
        assert_eq!(packet_duration(&[0b0110_1001]), 1920);
        assert_eq!(packet_duration(&[]), 0);
    }
}
