//! Vorbis comment reader and FLAC picture blocks.
//!
//! The comment block (`vendor_length vendor comment_count (length
//! "KEY=VALUE")*`, all lengths little-endian) is shared by Vorbis, Opus
//! and FLAC streams. Embedded pictures travel either as native FLAC
//! `PICTURE` metadata blocks or base64-encoded inside
//! `METADATA_BLOCK_PICTURE` comments; both use the same layout.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::Result;
use crate::io::Reader;
use crate::istr::IStr;
use crate::media::{tags, Dictionary, Image, ImageType};

/// A parsed comment block: the vendor string and the raw KEY=VALUE
/// entries in stream order.
#[derive(Clone, Debug, Default)]
pub struct CommentBlock {
    pub vendor: IStr,
    pub entries: Vec<(String, String)>,
}

impl CommentBlock {
    /// Values of all entries whose key matches `key` case-insensitively.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a comment block at the reader's position.
///
/// # Errors
///
/// Fails with `out_of_bounds` when a declared length overruns the data.
pub fn read_block(r: &mut Reader<'_>) -> Result<CommentBlock> {
    let vendor = IStr::from_utf8_lossy(r.read_pascal_le32()?);
    let count = r.read_u32_le()?;

    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let comment = r.read_pascal_le32()?;
        let Some(sep) = comment.iter().position(|&b| b == b'=') else {
            continue;
        };
        if sep == 0 || sep + 1 >= comment.len() {
            continue;
        }
        entries.push((
            String::from_utf8_lossy(&comment[..sep]).into_owned(),
            String::from_utf8_lossy(&comment[sep + 1..]).into_owned(),
        ));
    }
    Ok(CommentBlock { vendor, entries })
}

/// Maps the block's text entries into `dict` under canonical keys.
///
/// Picture payloads (`METADATA_BLOCK_PICTURE`, legacy `COVERART`) and
/// Opus `R128_*` gains are skipped; the caller handles those separately.
pub fn apply(block: &CommentBlock, dict: &mut Dictionary) {
    for (key, value) in &block.entries {
        if key.eq_ignore_ascii_case("METADATA_BLOCK_PICTURE")
            || key.eq_ignore_ascii_case("COVERART")
            || key.eq_ignore_ascii_case("COVERARTMIME")
            || key.to_ascii_uppercase().starts_with("R128_")
        {
            continue;
        }
        dict.insert(tags::map_common_key(key), IStr::new(value));
    }
}

/// Parses a FLAC picture structure; returns its type code and the image.
///
/// Layout: `type(u32BE) mime(pascal BE) description(pascal BE)
/// width/height/depth/colors(u32BE×4) data(pascal BE)`.
///
/// # Errors
///
/// Fails with `out_of_bounds` when a declared length overruns the data.
pub fn parse_picture(data: &[u8]) -> Result<(u32, Image)> {
    let mut r = Reader::new(data);
    let picture_type = r.read_u32_be()?;

    let mut image = Image::default();
    image.set_mime_type(IStr::from_utf8_lossy(r.read_pascal_be32()?));
    image.set_description(IStr::from_utf8_lossy(r.read_pascal_be32()?));
    r.skip(4 * 4)?; // width, height, depth, colors
    image.set_data(r.read_pascal_be32()?.into());
    Ok((picture_type, image))
}

/// Finds the first `METADATA_BLOCK_PICTURE` entry matching `kind`.
///
/// # Errors
///
/// Fails with `invalid_argument` on malformed base64 and with
/// `out_of_bounds` on a truncated picture block.
pub fn find_picture(block: &CommentBlock, kind: ImageType) -> Result<Option<Image>> {
    for encoded in block.values("METADATA_BLOCK_PICTURE") {
        let decoded = BASE64.decode(encoded.trim())?;
        let (picture_type, image) = parse_picture(&decoded)?;
        if picture_type == kind.code() {
            return Ok(Some(image));
        }
    }
    Ok(None)
}

/// Converts an Opus `R128_TRACK_GAIN` value (Q7.8 dB relative to
/// -23 LUFS) to the ReplayGain reference by adding the 5 dB headroom
/// difference, plus any stream output gain (also Q7.8).
#[must_use]
pub fn r128_to_replaygain(gain_q8: i32, output_gain_q8: i32) -> String {
    let gain = f64::from(gain_q8 + output_gain_q8) / 256.0;
    format!("{:.2} dB", gain + 5.0)
}

/// Parses the fixed-point decimal of an `R128_*` comment value.
#[must_use]
pub fn parse_r128_gain(value: &str) -> Option<i32> {
    let value = value.trim();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let gain: i32 = digits.parse().ok()?;
    if gain > i32::from(i16::MAX) {
        return None;
    }
    Some(gain * sign)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_block(vendor: &str, comments: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor.as_bytes());
        out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            out.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            out.extend_from_slice(comment.as_bytes());
        }
        out
    }

    fn picture_block(picture_type: u32, mime: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&picture_type.to_be_bytes());
        out.extend_from_slice(&(mime.len() as u32).to_be_bytes());
        out.extend_from_slice(mime.as_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // description
        out.extend_from_slice(&[0u8; 16]); // dimensions
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn reads_comments_into_canonical_keys() {
        let data = comment_block(
            "libVorbis 1.3",
            &["TITLE=Song", "tracknumber=3", "ARTIST=A", "ARTIST=B"],
        );
        let mut r = Reader::new(&data);
        let block = read_block(&mut r).unwrap();
        assert_eq!(block.vendor, "libVorbis 1.3");

        let mut dict = Dictionary::new();
        apply(&block, &mut dict);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "Song");
        assert_eq!(dict.get(tags::TRACK_NUMBER).unwrap(), "3");
        assert_eq!(dict.count(tags::ARTIST), 2);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let data = comment_block("v", &["NOVALUE", "=x", "KEY="]);
        let mut r = Reader::new(&data);
        let block = read_block(&mut r).unwrap();
        assert!(block.entries.is_empty());
    }

    #[test]
    fn picture_round_trip_through_base64() {
        let picture = picture_block(ImageType::FrontCover.code(), "image/png", &[1, 2, 3]);
        let encoded = BASE64.encode(&picture);
        let comment = format!("METADATA_BLOCK_PICTURE={encoded}");
        let data = comment_block("v", &[comment.as_str()]);

        let mut r = Reader::new(&data);
        let block = read_block(&mut r).unwrap();

        let image = find_picture(&block, ImageType::FrontCover)
            .unwrap()
            .expect("picture found");
        assert_eq!(image.mime_type().as_str(), "image/png");
        assert_eq!(image.data(), &[1, 2, 3]);

        assert!(find_picture(&block, ImageType::BackCover).unwrap().is_none());

        // Picture comments never land in the dictionary.
        let mut dict = Dictionary::new();
        apply(&block, &mut dict);
        assert!(dict.is_empty());
    }

    #[test]
    fn r128_gain_conversion() {
        // -23 LUFS-relative 0 becomes +5 dB at the ReplayGain reference.
        assert_eq!(r128_to_replaygain(0, 0), "5.00 dB");
        // -5.00 dB in Q7.8 is -1280.
        assert_eq!(r128_to_replaygain(-1280, 0), "0.00 dB");
    }

    #[test]
    fn r128_value_parsing() {
        assert_eq!(parse_r128_gain("-1280"), Some(-1280));
        assert_eq!(parse_r128_gain("+256"), Some(256));
        assert_eq!(parse_r128_gain("abc"), None);
        assert_eq!(parse_r128_gain("99999"), None);
    }
}
