//! Ogg container dispatch.
//!
//! `.ogg`/`.oga` files can hold Opus, Vorbis, or FLAC. The first page's
//! initial packet begins with the codec's magic, so one peek selects the
//! right demuxer.

use crate::audio::input::{Input, OpenMode};
use crate::demux::{flac, opus, vorbis};
use crate::error::{Error, Result};
use crate::io::Stream;

pub(crate) const EXTENSIONS: &[&str] = &["oga", "ogg"];

pub(crate) fn create(mut stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    // An Ogg page header is 27 bytes plus one lacing value for the
    // single initial packet; the codec magic follows.
    let mut probe = [0u8; 36];
    let got = stream.try_read(&mut probe)?;
    stream.rewind_by(got as u64)?;

    if !probe.starts_with(b"OggS") {
        return Err(Error::invalid_data_format("no Ogg capture pattern"));
    }

    let payload = probe.get(28..got).unwrap_or(&[]);
    if payload.starts_with(b"OpusHead") {
        return Ok(Box::new(opus::OpusDemuxer::open(stream, mode)?));
    }
    if payload.starts_with(b"\x01vorbis") {
        return Ok(Box::new(vorbis::VorbisDemuxer::open(stream, mode)?));
    }
    if payload.starts_with(b"\x7fFLAC") {
        return flac::open(stream, mode);
    }
    Err(Error::protocol_not_supported(
        "no demuxer for this Ogg mapping",
    ))
}
