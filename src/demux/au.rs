//! AU (Sun/NeXT audio) demuxer.
//!
//! A 24-byte big-endian header (`.snd`, data offset, data length,
//! encoding, sample rate, channels) followed by raw sample data. A data
//! length of `0xffffffff` means "until end of file". Packets carry about
//! 100 ms of audio; seeking is arithmetic over the fixed packet size.

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{
    codec, demuxer::FeedStatus, guess_channel_layout, pcm, CodecFormat, Demuxer, Feed, Format,
    Packet,
};
use crate::error::{Error, Result};
use crate::io::{Buffer, Stream};
use crate::media::{tags, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["au", "snd"];

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(AuDemuxer::open(stream, mode)?))
}

struct Header {
    data_start: u32,
    data_length: u32,
    encoding: u32,
    sample_rate: u32,
    channels: u32,
}

fn make_codec_format(head: &Header) -> Result<CodecFormat> {
    let mut fmt = CodecFormat {
        sample_rate: head.sample_rate,
        channels: head.channels,
        channel_layout: guess_channel_layout(head.channels),
        ..CodecFormat::default()
    };

    match head.encoding {
        1 => {
            fmt.codec_id = codec::ULAW;
            fmt.bits_per_sample = 8;
        }
        2..=5 => {
            fmt.codec_id = codec::LPCM;
            fmt.flags = pcm::SIGNED_INT | pcm::BIG_ENDIAN;
            fmt.bits_per_sample = (head.encoding - 1) * 8;
        }
        6 => {
            fmt.codec_id = codec::LPCM;
            fmt.flags = pcm::IEEE_FLOAT | pcm::BIG_ENDIAN;
            fmt.bits_per_sample = 32;
        }
        7 => {
            fmt.codec_id = codec::LPCM;
            fmt.flags = pcm::IEEE_FLOAT | pcm::BIG_ENDIAN;
            fmt.bits_per_sample = 64;
        }
        24 => {
            fmt.codec_id = codec::ADPCM_G722;
            fmt.bits_per_sample = 4;
        }
        27 => {
            fmt.codec_id = codec::ALAW;
            fmt.bits_per_sample = 8;
        }
        other => {
            return Err(Error::unsupported_format(format!(
                "unrecognized AU encoding: {other}"
            )));
        }
    }

    fmt.bit_rate = fmt.bits_per_sample * fmt.sample_rate;
    fmt.bytes_per_packet = (fmt.bits_per_sample * fmt.channels / 8).max(1);
    fmt.frames_per_packet = if head.encoding == 24 { 2 } else { 1 };
    Ok(fmt)
}

struct AuParser {
    file: Box<dyn Stream>,
    data_beg: u64,
    data_end: u64,
    bytes_per_packet: u32,
    packet_step: u32,
}

impl Feed for AuParser {
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
        let data_pos = self.file.tell()?;
        if data_pos >= self.data_end {
            return Ok(FeedStatus::Eos);
        }

        let limit = self.data_end - data_pos;
        let mut packet_size = u64::from(self.packet_step) * u64::from(self.bytes_per_packet);
        if packet_size > limit {
            packet_size = limit;
            let unaligned = packet_size % u64::from(self.bytes_per_packet);
            if unaligned != 0 {
                if unaligned == packet_size {
                    return Ok(FeedStatus::Eos);
                }
                packet_size -= unaligned;
            }
        }

        dest.assign_from_stream(self.file.as_mut(), packet_size as usize)?;
        Ok(FeedStatus::Packet { bit_rate: None })
    }
}

pub struct AuDemuxer {
    inner: Demuxer<AuParser>,
}

impl AuDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let file = stream.as_mut();

        let mut head = [0u32; 6];
        for field in &mut head {
            *field = file.read_u32_be()?;
        }
        if head[0] != u32::from_be_bytes(*b".snd") {
            return Err(Error::invalid_data_format("invalid AU file header signature"));
        }

        let head = Header {
            data_start: head[1],
            data_length: head[2],
            encoding: head[3],
            sample_rate: head[4],
            channels: head[5],
        };

        let data_beg = u64::from(head.data_start);
        let data_end = if head.data_length != u32::MAX {
            data_beg + u64::from(head.data_length)
        } else {
            file.size()?
        };

        let format = make_codec_format(&head)?;
        let packet_step = (format.sample_rate / 10).max(1);
        let bytes_per_packet = format.bytes_per_packet;
        let bit_rate = format.bit_rate;
        let frames = muldiv(
            data_end - data_beg,
            u64::from(format.frames_per_packet),
            u64::from(format.bytes_per_packet),
        );

        stream.seek_to(data_beg)?;
        let mut inner = Demuxer::new(
            AuParser {
                file: stream,
                data_beg,
                data_end,
                bytes_per_packet,
                packet_step,
            },
            format,
        );

        if mode.contains(OpenMode::PLAYBACK) {
            inner.resolve_decoder()?;
        }
        inner.set_total_frames(frames);
        inner.set_average_bit_rate(bit_rate);
        Ok(Self { inner })
    }
}

impl Input for AuDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        self.inner.read(pkt)
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        let format = self.inner.codec_format();
        let nearest = pts / u64::from(format.frames_per_packet);
        let priming = pts % u64::from(format.frames_per_packet);
        let filepos = {
            let parser = self.inner.parser();
            (parser.data_beg + nearest * u64::from(parser.bytes_per_packet)).min(parser.data_end)
        };

        self.inner.parser_mut().file.seek_to(filepos)?;
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
        info.props.insert(tags::CONTAINER, "AU");
        Ok(info)
    }

    fn image(&mut self, _kind: ImageType) -> Result<Option<Image>> {
        Ok(None)
    }
}
