//! APEv1/APEv2 tag reader.
//!
//! An APE tag sits at the end of the file, announced by a 32-byte footer
//! (directly at EOF, or 128 bytes earlier when an ID3v1 tag follows it).
//! Items are `size(4LE) flags(4LE) key(NUL-terminated printable ASCII)
//! value(size bytes)`; text values hold NUL-separated lists, and the
//! binary "cover art" items carry a filename, a NUL, then image bytes.

use crate::error::{Error, Result};
use crate::io::{Reader, Stream};
use crate::istr::IStr;
use crate::media::{id3v1, tags, Dictionary, Image, ImageType};

pub const FOOTER_SIZE: u64 = 32;

#[derive(Clone, Copy, Debug)]
struct Footer {
    version: u32,
    size: u32,
    items: u32,
}

impl Footer {
    fn parse(buf: &[u8; 32]) -> Option<Footer> {
        if &buf[..8] != b"APETAGEX" {
            return None;
        }

        let version = u32::from_le_bytes(buf[8..12].try_into().expect("sized field"));
        let size = u32::from_le_bytes(buf[12..16].try_into().expect("sized field"));
        let items = u32::from_le_bytes(buf[16..20].try_into().expect("sized field"));
        let flags = u32::from_le_bytes(buf[20..24].try_into().expect("sized field"));
        let reserved = u64::from_le_bytes(buf[24..32].try_into().expect("sized field"));

        let valid = u64::from(size) >= FOOTER_SIZE
            && reserved == 0
            && ((version == 1000 && flags == 0) || (version == 2000 && flags & 0x1fff_fff8 == 0));
        valid.then_some(Footer {
            version,
            size,
            items,
        })
    }
}

/// Reads the footer at EOF or behind a trailing ID3v1 tag.
fn find_footer(stream: &mut dyn Stream) -> Result<Option<(Footer, u64)>> {
    let size = stream.size()?;

    for back in [FOOTER_SIZE, FOOTER_SIZE + id3v1::TAG_SIZE] {
        if size < back {
            continue;
        }
        stream.seek_to(size - back)?;

        let mut buf = [0u8; 32];
        if stream.try_read(&mut buf)? != buf.len() {
            continue;
        }
        if let Some(footer) = Footer::parse(&buf) {
            // The declared size spans the items plus the footer itself.
            let tag_start = (size - back + FOOTER_SIZE).saturating_sub(u64::from(footer.size));
            return Ok(Some((footer, tag_start)));
        }
    }
    Ok(None)
}

struct Item<'a> {
    key: &'a str,
    value: &'a [u8],
    flags: u32,
}

impl<'a> Item<'a> {
    fn parse(r: &mut Reader<'a>) -> Result<Item<'a>> {
        let size = r.read_u32_le()? as usize;
        let flags = r.read_u32_le()?;

        let rest = r.peek();
        let key_len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::failure("unterminated APE tag key"))?;
        let key_bytes = &rest[..key_len];
        if key_bytes.iter().any(|&b| !(0x20..=0x7e).contains(&b)) {
            return Err(Error::failure("invalid APE tag key"));
        }
        // SAFETY: the key and its terminator were just located within
        // the remaining bytes.
        unsafe { r.skip_unchecked(key_len + 1) };

        let key = std::str::from_utf8(key_bytes)?;
        let value = r.read_bytes(size)?;
        Ok(Item { key, value, flags })
    }

    fn is_text(&self) -> bool {
        (self.flags >> 1) & 0x3 == 0x0
    }

    fn is_binary(&self) -> bool {
        (self.flags >> 1) & 0x3 == 0x1
    }
}

fn read_items(footer: Footer, data: &[u8], dict: &mut Dictionary) -> Result<()> {
    let mut r = Reader::new(data);
    for _ in 0..footer.items {
        let item = Item::parse(&mut r)?;
        if !item.is_text() {
            continue;
        }

        let key = tags::map_common_key(item.key);
        for value in item.value.split(|&b| b == 0) {
            if !value.is_empty() {
                dict.insert(key.clone(), IStr::from_utf8_lossy(value));
            }
        }
    }

    let version = if footer.version == 1000 { 1 } else { 2 };
    dict.insert(tags::TAG_TYPE, IStr::from(format!("APEv{version}")));
    Ok(())
}

/// Looks for an APE tag; returns the byte offset of the tag data when
/// present.
///
/// # Errors
///
/// Propagates stream failures.
pub fn find(stream: &mut dyn Stream) -> Result<Option<u64>> {
    Ok(find_footer(stream)?.map(|(_, start)| start))
}

/// Reads the trailing APE tag (if any) into `dict`.
///
/// # Errors
///
/// Fails on malformed items.
pub fn read(stream: &mut dyn Stream, dict: &mut Dictionary) -> Result<()> {
    let Some((footer, start)) = find_footer(stream)? else {
        return Ok(());
    };

    stream.seek_to(start)?;
    let data = stream.read_vec(footer.size as usize)?;
    read_items(footer, &data, dict)
}

/// Reads an APE tag that has no preamble (Musepack chapter tags embed
/// the header-less form).
///
/// # Errors
///
/// Fails on malformed items.
pub fn read_no_preamble(data: &[u8], dict: &mut Dictionary) -> Result<()> {
    if data.len() < (FOOTER_SIZE - 8) as usize {
        return Ok(());
    }

    let mut full = [0u8; 32];
    full[..8].copy_from_slice(b"APETAGEX");
    full[8..].copy_from_slice(&data[..24]);
    let Some(footer) = Footer::parse(&full) else {
        return Ok(());
    };
    read_items(footer, &data[24..], dict)
}

/// Extracts embedded cover art from the trailing APE tag.
///
/// Only the front and back cover item names are defined; any other
/// requested type yields `None`.
///
/// # Errors
///
/// Fails on malformed items.
pub fn find_image(stream: &mut dyn Stream, kind: ImageType) -> Result<Option<Image>> {
    let Some((footer, start)) = find_footer(stream)? else {
        return Ok(None);
    };

    let wanted = match kind {
        ImageType::FrontCover => "cover art (front)",
        ImageType::BackCover => "cover art (back)",
        _ => return Ok(None),
    };

    stream.seek_to(start)?;
    let data = stream.read_vec(footer.size as usize)?;

    let mut r = Reader::new(&data);
    for _ in 0..footer.items {
        let item = Item::parse(&mut r)?;
        if !item.is_binary() || !item.key.eq_ignore_ascii_case(wanted) {
            continue;
        }

        // Binary cover art: filename, NUL, image bytes.
        if let Some(sep) = item.value.iter().position(|&b| b == 0) {
            let mut image = Image::default();
            image.set_description(IStr::from_utf8_lossy(&item.value[..sep]));
            image.set_data(item.value[sep + 1..].into());
            return Ok(Some(image));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStream;

    fn item(key: &str, value: &[u8], flags: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        out.extend_from_slice(value);
        out
    }

    /// Builds `audio data | items | footer [| id3v1]`.
    fn build_tag(items: &[Vec<u8>], with_id3v1: bool) -> Vec<u8> {
        let body: Vec<u8> = items.concat();
        let size = body.len() as u32 + 32;

        let mut out = vec![0xaa; 100]; // fake audio data
        out.extend_from_slice(&body);
        out.extend_from_slice(b"APETAGEX");
        out.extend_from_slice(&2000u32.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(items.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        if with_id3v1 {
            let mut id3 = vec![0u8; 128];
            id3[..3].copy_from_slice(b"TAG");
            out.extend_from_slice(&id3);
        }
        out
    }

    #[test]
    fn read_text_items() {
        let data = build_tag(
            &[
                item("Title", b"Some Song", 0),
                item("Artist", b"One\0Two", 0),
                item("Year", b"2001", 0),
            ],
            false,
        );

        let mut stream = MemoryStream::new(data);
        let mut dict = Dictionary::new();
        read(&mut stream, &mut dict).unwrap();

        assert_eq!(dict.get(tags::TITLE).unwrap(), "Some Song");
        let artists: Vec<&str> = dict.values(tags::ARTIST).map(|v| v.as_str()).collect();
        assert_eq!(artists, ["One", "Two"]);
        assert_eq!(dict.get(tags::DATE).unwrap(), "2001");
        assert_eq!(dict.get(tags::TAG_TYPE).unwrap(), "APEv2");
    }

    #[test]
    fn footer_behind_id3v1() {
        let data = build_tag(&[item("Album", b"X", 0)], true);
        let mut stream = MemoryStream::new(data);

        let start = find(&mut stream).unwrap().expect("tag present");
        assert_eq!(start, 100);

        let mut dict = Dictionary::new();
        read(&mut stream, &mut dict).unwrap();
        assert_eq!(dict.get(tags::ALBUM).unwrap(), "X");
    }

    #[test]
    fn binary_cover_art() {
        let mut art = b"front.png\0".to_vec();
        art.extend_from_slice(&[0x89, b'P', b'N', b'G']);
        let data = build_tag(
            &[
                item("Title", b"t", 0),
                item("Cover Art (Front)", &art, 1 << 1),
            ],
            false,
        );

        let mut stream = MemoryStream::new(data);
        let image = find_image(&mut stream, ImageType::FrontCover)
            .unwrap()
            .expect("image found");
        assert_eq!(image.description().as_str(), "front.png");
        assert_eq!(image.data(), &[0x89, b'P', b'N', b'G']);

        // Binary items never land in the text dictionary.
        let mut dict = Dictionary::new();
        read(&mut stream, &mut dict).unwrap();
        assert!(!dict.contains_key("cover art (front)"));
    }

    #[test]
    fn missing_tag() {
        let mut stream = MemoryStream::new(vec![0u8; 300]);
        assert!(find(&mut stream).unwrap().is_none());
        let mut dict = Dictionary::new();
        read(&mut stream, &mut dict).unwrap();
        assert!(dict.is_empty());
    }
}
