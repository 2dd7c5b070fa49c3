//! HLS demuxer.
//!
//! Opens the master playlist, selects the first audio-only variant
//! (single `mp4a` codec), loads its media playlist, and plays the
//! segments back to back — each segment is opened as its own nested
//! input and swapped out on end of stream. Seeking accumulates segment
//! durations to find the landing segment, then seeks within it.

use crate::audio::input::{self, Input, OpenMode, StreamInfo};
use crate::audio::{Format, Packet};
use crate::demux::m3u::{MediaPlaylist, VariantPlaylist};
use crate::error::{Error, Result};
use crate::io::Stream;
use crate::media::{Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["m3u", "m3u8"];

const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(HlsDemuxer::open(stream, mode)?))
}

pub struct HlsDemuxer {
    playlist: MediaPlaylist,
    input: Option<Box<dyn Input>>,
    segment: usize,
    format: Format,
    mode: OpenMode,
}

impl HlsDemuxer {
    fn open(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let mut master = VariantPlaylist::parse(stream.as_mut())?;
        let playlist = master
            .find_by_codec("mp4a")
            .ok_or_else(|| Error::failure("failed to select playlist"))?;
        playlist.load()?;
        let playlist = playlist.clone();

        let mut demuxer = Self {
            playlist,
            input: None,
            segment: 0,
            format: Format::default(),
            mode,
        };
        demuxer.open_current_segment()?;
        demuxer.format = demuxer
            .input
            .as_ref()
            .map(|input| input.format())
            .unwrap_or_default();
        Ok(demuxer)
    }

    /// Opens the nested input for the current segment, or clears it past
    /// the last segment.
    fn open_current_segment(&mut self) -> Result<()> {
        match self.playlist.segments.get(self.segment) {
            Some(segment) => {
                self.input = Some(input::resolve(&segment.location, self.mode)?);
            }
            None => self.input = None,
        }
        Ok(())
    }
}

impl Input for HlsDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        loop {
            let Some(input) = self.input.as_mut() else {
                pkt.clear();
                return Ok(());
            };

            input.read(pkt)?;
            if !pkt.is_empty() {
                return Ok(());
            }

            self.segment += 1;
            debug!("advancing to HLS segment {}", self.segment);
            self.open_current_segment()?;
        }
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        // Convert the frame position to wall time, then walk segments.
        let mut target =
            muldiv(pts, NANOS_PER_SECOND, u64::from(self.format.sample_rate.max(1)));

        self.segment = 0;
        for segment in &self.playlist.segments {
            if target >= segment.duration_ns {
                target -= segment.duration_ns;
                self.segment += 1;
            } else {
                break;
            }
        }

        self.open_current_segment()?;
        if let Some(input) = self.input.as_mut() {
            input.seek(muldiv(
                target,
                u64::from(self.format.sample_rate),
                NANOS_PER_SECOND,
            ))?;
        }
        Ok(())
    }

    fn format(&self) -> Format {
        self.format
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let total_ns = self.playlist.total_duration_ns();

        let mut info = match self.input.as_mut() {
            Some(input) => input.info(0)?,
            None => StreamInfo::new(self.format),
        };
        info.frames = muldiv(
            total_ns,
            u64::from(self.format.sample_rate),
            NANOS_PER_SECOND,
        );
        Ok(info)
    }

    fn image(&mut self, _kind: ImageType) -> Result<Option<Image>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::m3u::Segment;
    use crate::uri::Uri;

    /// Seeking to 25.0 s across [10, 10, 8.5] s segments at 48 kHz must
    /// land in the third segment, 5.0 s in.
    #[test]
    fn seek_lands_in_correct_segment() {
        let durations = [10.0f64, 10.0, 8.5];
        let segments: Vec<Segment> = durations
            .iter()
            .map(|&seconds| Segment {
                location: Uri::parse("http://a/seg.aac").unwrap(),
                duration_ns: (seconds * 1e9) as u64,
            })
            .collect();

        let sample_rate = 48_000u64;
        let pts = 1_200_000u64; // 25.0 s

        let mut target = muldiv(pts, NANOS_PER_SECOND, sample_rate);
        let mut index = 0;
        for segment in &segments {
            if target >= segment.duration_ns {
                target -= segment.duration_ns;
                index += 1;
            } else {
                break;
            }
        }

        assert_eq!(index, 2);
        let frames_into_segment = muldiv(target, sample_rate, NANOS_PER_SECOND);
        assert_eq!(frames_into_segment, 240_000); // 5.0 s
    }
}
