//! Input contract, stream descriptors, and the container registry.
//!
//! An [`Input`] couples a container parser to a decoder and exposes the
//! uniform read/seek/metadata surface. [`resolve`] opens a byte stream
//! for a URI and dispatches on the file extension to the registered
//! demuxer factory.

use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::io::{self, Stream};
use crate::media::{Dictionary, Image, ImageType};
use crate::uri::Uri;

use super::{Format, Packet};

/// What an input is being opened for; flag-combinable with `|`.
///
/// A metadata-only open (`METADATA` without `PLAYBACK`) parses headers,
/// tags and seek tables but skips decoder instantiation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OpenMode(u32);

impl OpenMode {
    pub const PLAYBACK: OpenMode = OpenMode(1 << 0);
    pub const METADATA: OpenMode = OpenMode(1 << 1);
    pub const PICTURES: OpenMode = OpenMode(1 << 2);

    #[must_use]
    pub fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: OpenMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, other: OpenMode) -> OpenMode {
        OpenMode(self.0 | other.0)
    }
}

/// Descriptor returned by [`Input::info`].
///
/// `chapter` 0 denotes the whole stream; 1..=N select chapters where the
/// container supports them.
#[derive(Clone, Debug, Default)]
pub struct StreamInfo {
    /// Frame offset of the chapter's first sample within the stream.
    pub start_offset: u64,
    /// Sample count of the chapter (or whole stream).
    pub frames: u64,
    pub channels: u32,
    pub channel_layout: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub average_bit_rate: u32,
    pub codec_id: u32,
    /// User-facing metadata, merged from every tag block found.
    pub tags: Dictionary,
    /// Technical metadata (container, codec profile, encoder).
    pub props: Dictionary,
}

impl StreamInfo {
    #[must_use]
    pub fn new(format: Format) -> Self {
        Self {
            channels: format.channels,
            channel_layout: format.channel_layout,
            sample_rate: format.sample_rate,
            ..Self::default()
        }
    }

    /// Checks the format invariants of this descriptor.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_format` on any violation.
    pub fn validate(&self) -> Result<()> {
        Format {
            channels: self.channels,
            channel_layout: self.channel_layout,
            sample_rate: self.sample_rate,
        }
        .validate()
    }
}

/// Uniform demuxer surface.
pub trait Input: Send {
    /// Produces the next decoded packet. An empty packet signals end of
    /// stream.
    ///
    /// # Errors
    ///
    /// Fails on unrecoverable stream or decoder errors; a bad frame in
    /// the middle of a stream is skipped, not fatal.
    fn read(&mut self, pkt: &mut Packet) -> Result<()>;

    /// Repositions so that the next packet starts at source frame `pts`
    /// (within codec granularity).
    ///
    /// # Errors
    ///
    /// Fails with `seek_error` when the target cannot be reached.
    fn seek(&mut self, pts: u64) -> Result<()>;

    /// The decoded stream shape.
    fn format(&self) -> Format;

    /// Stream or chapter descriptor with aggregated metadata.
    ///
    /// # Errors
    ///
    /// Fails when tag parsing hits unrecoverable stream errors.
    fn info(&mut self, chapter: u32) -> Result<StreamInfo>;

    /// The first embedded picture matching `kind`, if any.
    ///
    /// # Errors
    ///
    /// Fails when tag parsing hits unrecoverable stream errors.
    fn image(&mut self, kind: ImageType) -> Result<Option<Image>>;

    /// Number of chapters; 0 when the container has none.
    fn chapter_count(&self) -> u32 {
        0
    }
}

/// Factory signature for container demuxers.
pub type Factory = fn(Box<dyn Stream>, OpenMode) -> Result<Box<dyn Input>>;

/// Extension → factory table. Populated before first use from the demux
/// modules; read-only at steady state.
static REGISTRY: LazyLock<HashMap<&'static str, Factory>> = LazyLock::new(|| {
    let mut extensions = HashMap::new();
    for (names, factory) in crate::demux::registrations() {
        for name in names {
            // Later registrations win; duplicates are a programming
            // error.
            extensions.insert(*name, factory);
        }
    }
    extensions
});

/// Opens `location` and resolves a demuxer for it.
///
/// # Errors
///
/// Fails with `protocol_not_supported` for an unregistered extension and
/// with `invalid_data_format` when the factory rejects the content.
pub fn resolve(location: &Uri, mode: OpenMode) -> Result<Box<dyn Input>> {
    let stream = io::open(location, io::Mode::IN | io::Mode::BINARY)?;
    resolve_stream(stream, mode)
}

/// Resolves a demuxer for an already-open stream.
///
/// # Errors
///
/// Fails with `protocol_not_supported` for an unregistered extension and
/// with `invalid_data_format` when the factory rejects the content.
pub fn resolve_stream(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    let location = stream.location();
    let extension = location.extension().ok_or_else(|| {
        Error::protocol_not_supported(format!("no file extension in '{location}'"))
    })?;

    let factory = REGISTRY.get(extension.as_str()).ok_or_else(|| {
        Error::protocol_not_supported(format!("no input registered for extension '{extension}'"))
    })?;
    factory(stream, mode)
}
