//! Ogg Vorbis demuxer.
//!
//! The three Vorbis header packets are joined by Xiph lacing into the
//! decoder's codec-private data; audio packets are fed through as-is.
//! Granule positions count PCM frames, so the final granule is the total
//! frame count. Seeking backs up one page before the target so the
//! decoder's overlap window re-primes, then trims by granule arithmetic.

use ogg::PacketReader;

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, xiph_channel_layout, CodecFormat, Demuxer, Feed, Format, Packet,
};
use crate::demux::oggutil::{scan_pages, PageIndex, StreamIo};
use crate::error::{Error, Result};
use crate::io::{Buffer, Reader, Stream};
use crate::media::{tags, vorbis as vc, Image, ImageType};
use crate::util::muldiv;

/// Joins the three header packets with the classic `02` lacing scheme.
fn join_xiph_headers(ident: &[u8], comment: &[u8], setup: &[u8]) -> Vec<u8> {
    let mut extra = Vec::with_capacity(ident.len() + comment.len() + setup.len() + 8);
    extra.push(2);
    for length in [ident.len(), comment.len()] {
        let mut remain = length;
        while remain >= 255 {
            extra.push(0xff);
            remain -= 255;
        }
        extra.push(remain as u8);
    }
    extra.extend_from_slice(ident);
    extra.extend_from_slice(comment);
    extra.extend_from_slice(setup);
    extra
}

struct VorbisParser {
    reader: Option<PacketReader<StreamIo>>,
}

impl VorbisParser {
    fn restart_at(&mut self, offset: u64) -> Result<()> {
        let mut io = self.reader.take().expect("packet reader present").into_inner();
        io.0.seek_to(offset)?;
        self.reader = Some(PacketReader::new(io));
        Ok(())
    }
}

impl Feed for VorbisParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
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

pub struct VorbisDemuxer {
    inner: Demuxer<VorbisParser>,
    pages: PageIndex,
    comments: vc::CommentBlock,
}

impl VorbisDemuxer {
    pub(crate) fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let start = stream.tell()?;
        let stream_size = stream.size()?;
        let pages = scan_pages(stream.as_mut(), start)?;
        stream.seek_to(start)?;

        let mut reader = PacketReader::new(StreamIo(stream));
        let mut headers: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (index, header) in headers.iter_mut().enumerate() {
            let packet = reader.read_packet()?.ok_or_else(|| {
                Error::invalid_data_format("truncated Vorbis header packets")
            })?;
            let expected = [1u8, 3, 5][index];
            if packet.data.first() != Some(&expected) || packet.data.get(1..7) != Some(b"vorbis") {
                return Err(Error::invalid_data_format("no Vorbis header packet"));
            }
            *header = packet.data;
        }

        // The identification header carries the stream shape.
        let mut r = Reader::new(&headers[0]);
        r.skip(7)?; // type + "vorbis"
        let _version = r.read_u32_le()?;
        let channels = u32::from(r.read_u8()?);
        let sample_rate = r.read_u32_le()?;
        if !(1..=8).contains(&channels) {
            return Err(Error::unsupported_format(format!(
                "invalid Vorbis channel count: {channels}"
            )));
        }

        let comments = {
            let mut r = Reader::new(&headers[1]);
            r.skip(7)?;
            vc::read_block(&mut r)?
        };

        let extra = join_xiph_headers(&headers[0], &headers[1], &headers[2]);
        let format = CodecFormat {
            extra: Buffer::from_vec(extra),
            codec_id: codec::VORBIS,
            sample_rate,
            channels,
            channel_layout: xiph_channel_layout(channels),
            ..CodecFormat::default()
        };

        let total_frames = pages.last_granule;
        let mut inner = Demuxer::new(VorbisParser {
            reader: Some(reader),
        }, format);
        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(total_frames);

        let data_size = stream_size - pages.entries.first().map_or(start, |e| e.offset);
        inner.set_average_bit_rate(muldiv(
            data_size,
            u64::from(sample_rate) * 8,
            total_frames.max(1),
        ) as u32);

        Ok(Self {
            inner,
            pages,
            comments,
        })
    }
}

impl Input for VorbisDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        // Back up one page: a fresh Vorbis decode produces no output for
        // its first packet (window overlap), so the page before the
        // target supplies the preroll.
        let Some(landing) = self.pages.landing(pts, 1) else {
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
        info.frames = self.inner.total_frames();
        info.codec_id = codec::VORBIS;
        info.average_bit_rate = self.inner.average_bit_rate();
        info.props.insert(tags::CONTAINER, "Ogg");
        if !self.comments.vendor.is_empty() {
            info.props.try_insert(tags::ENCODER, self.comments.vendor.clone());
        }

        vc::apply(&self.comments, &mut info.tags);
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
    fn lacing_round_trip() {
        let ident = vec![0x11; 30];
        let comment = vec![0x22; 300];
        let setup = vec![0x33; 12];
        let extra = join_xiph_headers(&ident, &comment, &setup);

        let [a, b, c] = crate::codec::vorbis::split_xiph_headers(&extra).unwrap();
        assert_eq!(a, ident.as_slice());
        assert_eq!(b, comment.as_slice());
        assert_eq!(c, setup.as_slice());
    }
}
