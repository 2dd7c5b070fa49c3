//! Extended M3U playlist parsing (HLS).
//!
//! Two levels: the master (variant) playlist lists `#EXT-X-STREAM-INF`
//! entries with `CODECS` attributes, each pointing at a media playlist;
//! the media playlist lists `#EXTINF` segment durations and URIs.
//! Segment URIs resolve against the playlist's own location.

use crate::error::{Error, Result};
use crate::io::{self, Stream};
use crate::uri::Uri;

/// One media segment: where it lives and how long it plays.
#[derive(Clone, Debug)]
pub struct Segment {
    pub location: Uri,
    pub duration_ns: u64,
}

fn invalid_syntax(what: &str, text: &str) -> Error {
    Error::invalid_argument(format!("[M3U] invalid {what}: '{text}'"))
}

fn parse_integer(text: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| invalid_syntax("integer", text))
}

/// Parses a decimal duration in seconds into nanoseconds.
fn parse_duration(text: &str) -> Result<u64> {
    // "#EXTINF:<duration>,<title>" — the title is ignored.
    let text = text.split(',').next().unwrap_or(text).trim();
    let seconds: f64 = text.parse().map_err(|_| invalid_syntax("duration", text))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid_syntax("duration", text));
    }
    Ok((seconds * 1_000_000_000.0).round() as u64)
}

fn parse_quoted_string(text: &str) -> Result<&str> {
    let inner = text
        .strip_prefix('"')
        .and_then(|rest| {
            rest.find('"').map(|end| &rest[..end])
        })
        .ok_or_else(|| invalid_syntax("quoted string", text))?;
    if inner.contains(['\n', '\r', '"']) {
        return Err(invalid_syntax("quoted string", inner));
    }
    Ok(inner)
}

fn read_text(stream: &mut dyn Stream) -> Result<String> {
    let size = usize::try_from(stream.size()?)?;
    stream.rewind()?;
    let bytes = stream.read_vec(size)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A media playlist: an ordered list of segments.
#[derive(Clone, Debug)]
pub struct MediaPlaylist {
    pub location: Uri,
    pub segments: Vec<Segment>,
    pub codecs: String,
    pub version: u64,
    pub is_live: bool,
}

impl MediaPlaylist {
    #[must_use]
    pub fn new(location: Uri) -> Self {
        Self {
            location,
            segments: Vec::new(),
            codecs: String::new(),
            version: 0,
            is_live: false,
        }
    }

    /// Fetches and parses the playlist at its location.
    ///
    /// # Errors
    ///
    /// Fails with `invalid_data_format` when the file is not extended
    /// M3U and with `failure` on structural violations.
    pub fn load(&mut self) -> Result<()> {
        let mut stream = io::open(&self.location, io::Mode::IN)?;
        let text = read_text(stream.as_mut())?;
        self.parse(&text)
    }

    /// Parses media playlist text.
    ///
    /// # Errors
    ///
    /// Fails with `invalid_data_format` when the file is not extended
    /// M3U and with `failure` on structural violations.
    pub fn parse(&mut self, text: &str) -> Result<()> {
        let mut lines = text.lines().map(str::trim_end);
        if lines.next() != Some("#EXTM3U") {
            return Err(Error::invalid_data_format("not an extended M3U file"));
        }

        while let Some(line) = lines.next() {
            if line.starts_with("#EXT-X-ENDLIST") {
                break;
            } else if let Some(rest) = line.strip_prefix("#EXT-X-VERSION:") {
                if self.version != 0 {
                    return Err(Error::failure(
                        "media playlist cannot contain multiple '#EXT-X-VERSION' tags",
                    ));
                }
                self.version = parse_integer(rest)?;
            } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
                let location = lines
                    .next()
                    .filter(|next| !next.is_empty())
                    .ok_or_else(|| {
                        Error::failure("'#EXTINF' tag must be followed by a media segment URI")
                    })?;

                let duration_ns = parse_duration(rest)?;
                let segment_location = Uri::parse(location)?;
                self.segments.push(Segment {
                    location: segment_location.resolve(&self.location),
                    duration_ns,
                });
            } else if let Some(rest) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                self.is_live = rest.trim() != "VOD";
            }
        }

        if self.version == 0 {
            return Err(Error::failure(
                "missing required attribute: '#EXT-X-VERSION'",
            ));
        }
        if self.segments.is_empty() {
            return Err(Error::failure("media playlist contains no segments"));
        }
        Ok(())
    }

    /// Total playlist duration in nanoseconds.
    #[must_use]
    pub fn total_duration_ns(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ns).sum()
    }

    /// Whether this playlist's `CODECS` attribute names a single codec
    /// matching `prefix`.
    ///
    /// Multi-codec variants (a comma in `CODECS`) are rejected outright
    /// to force selection of audio-only playlists.
    #[must_use]
    pub fn has_codec(&self, prefix: &str) -> bool {
        !self.codecs.contains(',') && self.codecs.starts_with(prefix)
    }
}

/// A master playlist: the variant streams on offer.
pub struct VariantPlaylist {
    playlists: Vec<MediaPlaylist>,
}

impl VariantPlaylist {
    /// Parses a master playlist from an open stream, resolving variant
    /// URIs against the stream's location.
    ///
    /// # Errors
    ///
    /// Fails with `invalid_data_format` when the file is not extended
    /// M3U and with `failure` on structural violations.
    pub fn parse(stream: &mut dyn Stream) -> Result<Self> {
        let base = stream.location();
        let text = read_text(stream)?;

        let mut lines = text.lines().map(str::trim_end);
        if lines.next() != Some("#EXTM3U") {
            return Err(Error::invalid_data_format("not an extended M3U file"));
        }

        let mut playlists = Vec::new();
        while let Some(line) = lines.next() {
            if let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                let location = lines
                    .next()
                    .filter(|next| !next.is_empty())
                    .ok_or_else(|| {
                        Error::failure(
                            "'#EXT-X-STREAM-INF' tag must be followed by a playlist URI",
                        )
                    })?;

                let relative = Uri::parse(location)?;
                let mut playlist = MediaPlaylist::new(relative.resolve(&base));
                if let Some(at) = attributes.find("CODECS=") {
                    playlist.codecs = parse_quoted_string(&attributes[at + 7..])?.to_owned();
                }
                playlists.push(playlist);
            }
        }

        Ok(Self { playlists })
    }

    /// The first variant whose single codec matches `prefix`.
    pub fn find_by_codec(&mut self, prefix: &str) -> Option<&mut MediaPlaylist> {
        self.playlists
            .iter_mut()
            .find(|playlist| playlist.has_codec(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStream;

    fn media_playlist(text: &str) -> MediaPlaylist {
        let mut playlist =
            MediaPlaylist::new(Uri::parse("http://cdn.example/live/audio.m3u8").unwrap());
        playlist.parse(text).unwrap();
        playlist
    }

    #[test]
    fn parses_segments_with_resolved_uris() {
        let playlist = media_playlist(
            "#EXTM3U\n\
             #EXT-X-VERSION:3\n\
             #EXT-X-PLAYLIST-TYPE:VOD\n\
             #EXTINF:10.0,\n\
             seg0.aac\n\
             #EXTINF:9.5,\n\
             seg1.aac\n\
             #EXT-X-ENDLIST\n",
        );

        assert_eq!(playlist.version, 3);
        assert!(!playlist.is_live);
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(
            playlist.segments[0].location.as_str(),
            "http://cdn.example/live/seg0.aac"
        );
        assert_eq!(playlist.segments[0].duration_ns, 10_000_000_000);
        assert_eq!(playlist.segments[1].duration_ns, 9_500_000_000);
    }

    #[test]
    fn missing_version_is_rejected() {
        let mut playlist = MediaPlaylist::new(Uri::parse("http://a/x.m3u8").unwrap());
        let err = playlist
            .parse("#EXTM3U\n#EXTINF:1.0,\nseg.aac\n")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Failure);
    }

    #[test]
    fn not_m3u_is_rejected() {
        let mut playlist = MediaPlaylist::new(Uri::parse("http://a/x.m3u8").unwrap());
        assert!(playlist.parse("[playlist]\n").is_err());
    }

    #[test]
    fn variant_selection_by_codec() {
        let master = "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=640000,CODECS=\"avc1.42e00a,mp4a.40.2\"\n\
             video.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=96000,CODECS=\"mp4a.40.2\"\n\
             audio.m3u8\n";

        let mut stream = MemoryStream::new(master.as_bytes().to_vec())
            .with_location(Uri::parse("http://cdn.example/master.m3u8").unwrap());
        let mut variants = VariantPlaylist::parse(&mut stream).unwrap();

        // The muxed variant lists two codecs and is skipped.
        let selected = variants.find_by_codec("mp4a").expect("variant found");
        assert_eq!(
            selected.location.as_str(),
            "http://cdn.example/audio.m3u8"
        );
    }

    #[test]
    fn live_playlists_keep_reading_to_the_end() {
        let playlist = media_playlist(
            "#EXTM3U\n\
             #EXT-X-VERSION:4\n\
             #EXT-X-PLAYLIST-TYPE:EVENT\n\
             #EXTINF:4.0,\n\
             a.aac\n",
        );
        assert!(playlist.is_live);
        assert_eq!(playlist.total_duration_ns(), 4_000_000_000);
    }
}
