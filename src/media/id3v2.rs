//! ID3v2 tag reader (versions 2.2, 2.3, 2.4).
//!
//! Handles the differences between tag generations in one pass:
//!
//! * v2.2 — 3-character frame IDs with 24-bit sizes, migrated to their
//!   v2.4 equivalents through a fixed table
//! * v2.3 — 4-character IDs, 32-bit sizes, frame flags in different bit
//!   positions (relocated on read)
//! * v2.4 — synchsafe sizes, per-frame unsynchronization, data-length
//!   indicators
//!
//! Whole-tag unsynchronization (v2.3 and below) is reversed before frame
//! parsing. Encrypted and compressed frames are not implemented.

use crate::error::{Error, Result};
use crate::io::{Buffer, Reader, Stream};
use crate::istr::IStr;
use crate::media::{id3v1, tags, Dictionary, Image, ImageType};

const HEADER_FLAG_UNSYNCHRONIZATION: u8 = 0x80;
const HEADER_FLAG_EXTENDED_HEADER: u8 = 0x40;

// Frame flags, normalized to the v2.4 bit positions.
const FRAME_FLAG_GROUPING_ID: u16 = 0x0040;
const FRAME_FLAG_COMPRESSION: u16 = 0x0008;
const FRAME_FLAG_ENCRYPTION: u16 = 0x0004;
const FRAME_FLAG_UNSYNCHRONIZATION: u16 = 0x0002;
const FRAME_FLAG_DATA_LENGTH_INDICATOR: u16 = 0x0001;

const fn cc4(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

const fn cc3(tag: &[u8; 3]) -> u32 {
    u32::from_be_bytes([0, tag[0], tag[1], tag[2]])
}

/// Decodes an ID3v2.4 synchsafe integer (7 significant bits per byte).
const fn unsynchsafe(x: u32) -> u32 {
    (x & 0x0000_007f)
        | ((x & 0x0000_7f00) >> 1)
        | ((x & 0x007f_0000) >> 2)
        | ((x & 0x7f00_0000) >> 3)
}

/// v2.2 (and legacy v2.3) frame ID → v2.4 equivalent.
static FRAME_ID_TO_V24: &[(u32, u32)] = &[
    (cc3(b"BUF"), cc4(b"RBUF")),
    (cc3(b"CNT"), cc4(b"PCNT")),
    (cc3(b"COM"), cc4(b"COMM")),
    (cc3(b"CRA"), cc4(b"AENC")),
    (cc3(b"ETC"), cc4(b"ETCO")),
    (cc3(b"GEO"), cc4(b"GEOB")),
    (cc3(b"IPL"), cc4(b"TIPL")),
    (cc3(b"MCI"), cc4(b"MCDI")),
    (cc3(b"MLL"), cc4(b"MLLT")),
    (cc3(b"PIC"), cc4(b"APIC")),
    (cc3(b"POP"), cc4(b"POPM")),
    (cc3(b"REV"), cc4(b"RVRB")),
    (cc3(b"SLT"), cc4(b"SYLT")),
    (cc3(b"STC"), cc4(b"SYTC")),
    (cc3(b"TAL"), cc4(b"TALB")),
    (cc3(b"TBP"), cc4(b"TBPM")),
    (cc3(b"TCM"), cc4(b"TCOM")),
    (cc3(b"TCO"), cc4(b"TCON")),
    (cc3(b"TCP"), cc4(b"TCMP")),
    (cc3(b"TCR"), cc4(b"TCOP")),
    (cc3(b"TDY"), cc4(b"TDLY")),
    (cc3(b"TEN"), cc4(b"TENC")),
    (cc3(b"TFT"), cc4(b"TFLT")),
    (cc3(b"TKE"), cc4(b"TKEY")),
    (cc3(b"TLA"), cc4(b"TLAN")),
    (cc3(b"TMT"), cc4(b"TMED")),
    (cc3(b"TOA"), cc4(b"TOAL")),
    (cc3(b"TOF"), cc4(b"TOFN")),
    (cc3(b"TOL"), cc4(b"TOLY")),
    (cc3(b"TOR"), cc4(b"TDOR")),
    (cc3(b"TOT"), cc4(b"TOAL")),
    (cc3(b"TP1"), cc4(b"TPE1")),
    (cc3(b"TP2"), cc4(b"TPE2")),
    (cc3(b"TP3"), cc4(b"TPE3")),
    (cc3(b"TP4"), cc4(b"TPE4")),
    (cc3(b"TPA"), cc4(b"TPOS")),
    (cc3(b"TPB"), cc4(b"TPUB")),
    (cc3(b"TRC"), cc4(b"TSRC")),
    (cc3(b"TRD"), cc4(b"TDRC")),
    (cc3(b"TRK"), cc4(b"TRCK")),
    (cc3(b"TS2"), cc4(b"TSO2")),
    (cc3(b"TSA"), cc4(b"TSOA")),
    (cc3(b"TSC"), cc4(b"TSOC")),
    (cc3(b"TSP"), cc4(b"TSOP")),
    (cc3(b"TSS"), cc4(b"TSSE")),
    (cc3(b"TST"), cc4(b"TSOT")),
    (cc3(b"TT1"), cc4(b"TIT1")),
    (cc3(b"TT2"), cc4(b"TIT2")),
    (cc3(b"TT3"), cc4(b"TIT3")),
    (cc3(b"TXT"), cc4(b"TOLY")),
    (cc3(b"TXX"), cc4(b"TXXX")),
    (cc3(b"TYE"), cc4(b"TDRC")),
    (cc3(b"UFI"), cc4(b"UFID")),
    (cc3(b"ULT"), cc4(b"USLT")),
    (cc3(b"WAF"), cc4(b"WOAF")),
    (cc3(b"WAR"), cc4(b"WOAR")),
    (cc3(b"WAS"), cc4(b"WOAS")),
    (cc3(b"WCM"), cc4(b"WCOM")),
    (cc3(b"WCP"), cc4(b"WCOP")),
    (cc3(b"WPB"), cc4(b"WPUB")),
    (cc3(b"WXX"), cc4(b"WXXX")),
    (cc4(b"IPLS"), cc4(b"TIPL")),
    (cc4(b"TORY"), cc4(b"TDOR")),
    (cc4(b"TYER"), cc4(b"TDRC")),
];

/// Text frame ID → canonical dictionary key.
static TEXT_FRAME_MAP: &[(u32, &str)] = &[
    (cc4(b"TALB"), tags::ALBUM),
    (cc4(b"TBPM"), tags::BPM),
    (cc4(b"TCMP"), tags::COMPILATION),
    (cc4(b"TCOM"), tags::COMPOSER),
    (cc4(b"TCON"), tags::GENRE),
    (cc4(b"TCOP"), tags::COPYRIGHT),
    (cc4(b"TDEN"), tags::ENCODING_TIME),
    (cc4(b"TDLY"), tags::PLAYLIST_DELAY),
    (cc4(b"TDOR"), tags::ORIGINAL_DATE),
    (cc4(b"TDRC"), tags::DATE),
    (cc4(b"TDRL"), tags::DATE),
    (cc4(b"TDTG"), tags::TAGGING_DATE),
    (cc4(b"TENC"), tags::ENCODED_BY),
    (cc4(b"TEXT"), tags::LYRICIST),
    (cc4(b"TFLT"), tags::FILE_TYPE),
    (cc4(b"TIT1"), tags::GROUP),
    (cc4(b"TIT2"), tags::TITLE),
    (cc4(b"TIT3"), tags::SUBTITLE),
    (cc4(b"TKEY"), tags::INITIAL_KEY),
    (cc4(b"TLAN"), tags::LANGUAGE),
    (cc4(b"TMED"), tags::MEDIA_TYPE),
    (cc4(b"TMOO"), tags::MOOD),
    (cc4(b"TOAL"), tags::ORIGINAL_ALBUM),
    (cc4(b"TOFN"), tags::ORIGINAL_FILENAME),
    (cc4(b"TOLY"), tags::ORIGINAL_LYRICIST),
    (cc4(b"TOPE"), tags::ORIGINAL_ARTIST),
    (cc4(b"TOWN"), tags::OWNER),
    (cc4(b"TPE1"), tags::ARTIST),
    (cc4(b"TPE2"), tags::ALBUM_ARTIST),
    (cc4(b"TPE3"), tags::CONDUCTOR),
    (cc4(b"TPE4"), tags::REMIXER),
    (cc4(b"TPOS"), tags::DISC_NUMBER),
    (cc4(b"TPRO"), tags::PRODUCED_NOTICE),
    (cc4(b"TPUB"), tags::LABEL),
    (cc4(b"TRCK"), tags::TRACK_NUMBER),
    (cc4(b"TRSN"), tags::RADIO_STATION),
    (cc4(b"TRSO"), tags::RADIO_STATION_OWNER),
    (cc4(b"TSO2"), tags::ALBUM_ARTIST_SORT),
    (cc4(b"TSOA"), tags::ALBUM_SORT),
    (cc4(b"TSOC"), tags::COMPOSER_SORT),
    (cc4(b"TSOP"), tags::ARTIST_SORT),
    (cc4(b"TSOT"), tags::TITLE_SORT),
    (cc4(b"TSRC"), tags::ISRC),
    (cc4(b"TSSE"), tags::ENCODING_SETTINGS),
];

/// URL frame ID → canonical dictionary key.
static URL_FRAME_MAP: &[(u32, &str)] = &[
    (cc4(b"WCOM"), tags::COMMERCIAL_INFORMATION),
    (cc4(b"WCOP"), tags::COPYRIGHT_INFORMATION),
    (cc4(b"WOAF"), tags::FILE_WEB_PAGE),
    (cc4(b"WOAR"), tags::ARTIST_WEB_PAGE),
    (cc4(b"WOAS"), tags::AUDIO_SOURCE_WEB_PAGE),
    (cc4(b"WORS"), tags::RADIO_STATION_WEB_PAGE),
    (cc4(b"WPAY"), tags::PAYMENT_WEB_PAGE),
    (cc4(b"WPUB"), tags::PUBLISHER_WEB_PAGE),
    (cc4(b"WXXX"), tags::USER_WEB_PAGE),
];

fn lookup<V: Copy>(table: &[(u32, V)], id: u32) -> Option<V> {
    table
        .binary_search_by_key(&id, |(k, _)| *k)
        .ok()
        .map(|at| table[at].1)
}

/// Tag header.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub version: u8,
    pub revision: u8,
    pub flags: u8,
    pub size: u32,
}

impl Header {
    /// Reads a tag header at the current position. On a mismatch the
    /// stream is rewound to where it started.
    ///
    /// # Errors
    ///
    /// Propagates stream failures.
    pub fn read(stream: &mut dyn Stream) -> Result<Option<Header>> {
        let mut buf = [0u8; 10];
        let got = stream.try_read(&mut buf)?;
        if got < buf.len() {
            stream.rewind_by(got as u64)?;
            return Ok(None);
        }

        let size = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        if &buf[..3] == b"ID3" && buf[3] <= 4 && size & 0x8080_8080 == 0 {
            return Ok(Some(Header {
                version: buf[3],
                revision: buf[4],
                flags: buf[5],
                size: unsynchsafe(size),
            }));
        }

        stream.rewind_by(10)?;
        Ok(None)
    }
}

/// Text encoding byte values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Encoding {
    Latin1,
    Utf16,
    Utf16Be,
    Utf8,
}

fn read_encoding(r: &mut Reader<'_>) -> Result<Encoding> {
    match r.read_u8()? {
        0 => Ok(Encoding::Latin1),
        1 => Ok(Encoding::Utf16),
        2 => Ok(Encoding::Utf16Be),
        3 => Ok(Encoding::Utf8),
        other => Err(Error::out_of_bounds(format!(
            "illegal ID3v2 text encoding: {other}"
        ))),
    }
}

/// Reads one NUL-terminated string in the given encoding. Consumes the
/// terminator when present; an unterminated string runs to the end of
/// the frame.
fn read_string(r: &mut Reader<'_>, enc: Encoding) -> IStr {
    match enc {
        Encoding::Latin1 | Encoding::Utf8 => {
            let rest = r.peek();
            let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            let bytes = &rest[..len];
            // SAFETY: len and the optional terminator lie within the
            // remaining bytes just inspected.
            unsafe { r.skip_unchecked(len + usize::from(len != rest.len())) };
            if enc == Encoding::Latin1 {
                IStr::from_latin1(bytes)
            } else {
                IStr::from_utf8_lossy(bytes)
            }
        }
        Encoding::Utf16 | Encoding::Utf16Be => {
            let rest = r.peek();
            let limit = rest.len() / 2;
            let mut units = 0;
            while units != limit {
                if rest[units * 2] == 0 && rest[units * 2 + 1] == 0 {
                    break;
                }
                units += 1;
            }
            let bytes = &rest[..units * 2];
            // SAFETY: the scanned units and the optional 2-byte
            // terminator lie within the remaining bytes.
            unsafe { r.skip_unchecked(2 * (units + usize::from(units != limit))) };
            if enc == Encoding::Utf16 {
                IStr::from_utf16_lossy(bytes)
            } else {
                IStr::from_utf16be_lossy(bytes)
            }
        }
    }
}

/// Replaces every `FF 00` pair with `FF` in place.
fn reverse_unsynchronization(buf: &mut Vec<u8>) {
    let mut src = 0;
    let mut dst = 0;

    while src + 1 < buf.len() {
        let byte = buf[src];
        src += 1;
        buf[dst] = byte;
        dst += 1;
        if byte == 0xff && buf[src] == 0x00 {
            src += 1;
        }
    }
    if src < buf.len() {
        buf[dst] = buf[src];
        dst += 1;
    }
    buf.truncate(dst);
}

struct FrameParser {
    version: u8,
    tag_unsync: bool,
    data: Vec<u8>,
    pos: usize,
}

impl FrameParser {
    fn new(stream: &mut dyn Stream, header: Header) -> Result<Self> {
        let mut data = vec![0u8; header.size as usize];
        stream.read(&mut data)?;

        let mut tag_unsync = header.flags & HEADER_FLAG_UNSYNCHRONIZATION != 0;
        if tag_unsync && header.version <= 3 {
            reverse_unsynchronization(&mut data);
            tag_unsync = false;
        }

        let mut parser = Self {
            version: header.version,
            tag_unsync,
            data,
            pos: 0,
        };
        if header.flags & HEADER_FLAG_EXTENDED_HEADER != 0 {
            parser.skip_extended_header(header.version)?;
        }
        Ok(parser)
    }

    fn skip_extended_header(&mut self, version: u8) -> Result<()> {
        let mut r = Reader::new(&self.data[self.pos..]);
        let mut length = r.read_u32_be()? as usize;
        if version == 4 {
            if length < 6 {
                return Err(Error::out_of_bounds("ID3v2.4 extended header is too small"));
            }
            length -= 4;
        }
        r.skip(length)
            .map_err(|_| Error::out_of_bounds("ID3v2 extended header is too large"))?;
        self.pos += r.tell();
        Ok(())
    }

    fn frame_header_size(&self) -> usize {
        if self.version >= 3 {
            10
        } else {
            6
        }
    }

    /// Reads the next frame into `out`; returns its (migrated) frame ID,
    /// or `None` at the end of the frames or at padding.
    fn next(&mut self, out: &mut Buffer) -> Result<Option<u32>> {
        if self.data.len() - self.pos < self.frame_header_size() {
            return Ok(None);
        }

        let mut r = Reader::new(&self.data[self.pos..]);
        let (mut id, size, flags) = match self.version {
            4 => {
                let id = r.read_u32_be()?;
                let size = r.read_u32_be()?;
                let flags = r.read_u16_be()?;
                if size & 0x8080_8080 != 0 {
                    return Err(Error::failure("ID3v2: invalid synchsafe integer"));
                }
                (id, unsynchsafe(size), flags)
            }
            3 => {
                let id = r.read_u32_be()?;
                let size = r.read_u32_be()?;
                let flags = r.read_u16_be()?;
                let flags = ((flags & 0xe000) >> 1) | ((flags & 0x00c0) >> 4)
                    | ((flags & 0x0020) << 1);
                (id, size, flags)
            }
            _ => {
                let id = r.read_u24_be()?;
                let size = r.read_u24_be()?;
                (id, size, 0)
            }
        };

        if !is_valid_frame_id(id, self.version) {
            // Padding or garbage ends the frame area.
            if id != 0 {
                debug!("ID3v2: stopping frame parse at invalid frame id {id:#010x}");
            }
            return Ok(None);
        }

        if self.version < 4 {
            if let Some(migrated) = lookup(FRAME_ID_TO_V24, id) {
                id = migrated;
            }
        }

        if flags & (FRAME_FLAG_ENCRYPTION | FRAME_FLAG_COMPRESSION) != 0 {
            return Err(Error::not_implemented(
                "ID3v2 encrypted and/or compressed frames are currently not supported",
            ));
        }

        let mut body_len = size as usize;
        if flags & FRAME_FLAG_DATA_LENGTH_INDICATOR != 0 {
            if body_len < 4 {
                return Err(Error::out_of_bounds("ID3v2 frame data is too small"));
            }
            r.skip(4)?;
            body_len -= 4;
        }
        if flags & FRAME_FLAG_GROUPING_ID != 0 {
            if body_len < 1 {
                return Err(Error::out_of_bounds("ID3v2 frame data is too small"));
            }
            r.skip(1)?;
            body_len -= 1;
        }

        out.assign_slice(r.read_bytes(body_len)?);
        self.pos += r.tell();

        if flags & FRAME_FLAG_UNSYNCHRONIZATION != 0 || self.tag_unsync {
            let mut body = std::mem::take(out).into_vec();
            reverse_unsynchronization(&mut body);
            *out = Buffer::from_vec(body);
        }
        Ok(Some(id))
    }
}

fn is_valid_frame_id(id: u32, version: u8) -> bool {
    if id == 0 {
        return false;
    }
    let chars = if version > 2 { 4 } else { 3 };
    (0..chars).all(|i| {
        let c = (id >> (i * 8)) as u8;
        c.is_ascii_uppercase() || c.is_ascii_digit()
    })
}

fn read_text_frame(id: u32, data: &[u8], dict: &mut Dictionary) -> Result<()> {
    let mut r = Reader::new(data);
    let enc = read_encoding(&mut r)?;

    let key = if id == cc4(b"TXXX") {
        tags::map_common_key(&read_string(&mut r, enc))
    } else {
        match lookup(TEXT_FRAME_MAP, id) {
            Some(key) => IStr::intern_str(key),
            None => return Ok(()),
        }
    };

    loop {
        let mut value = read_string(&mut r, enc);
        if value.is_empty() {
            break;
        }
        if id == cc4(b"TCON") {
            // Numeric genre references, "(N)" or plain "N", substitute
            // the ID3v1 genre name.
            let digits = value.strip_prefix('(').unwrap_or(&value);
            let digits = &digits[..digits
                .bytes()
                .position(|b| !b.is_ascii_digit())
                .unwrap_or(digits.len())];
            if let Ok(index) = digits.parse::<u8>() {
                value = id3v1::genre_name(index);
            }
        }
        dict.insert(key.clone(), value);
    }
    Ok(())
}

fn read_url_frame(id: u32, data: &[u8], dict: &mut Dictionary) {
    if let Some(key) = lookup(URL_FRAME_MAP, id) {
        let mut r = Reader::new(data);
        dict.insert(key, read_string(&mut r, Encoding::Latin1));
    }
}

fn read_comm_or_uslt(base: &str, data: &[u8], dict: &mut Dictionary) -> Result<()> {
    let mut r = Reader::new(data);
    let enc = read_encoding(&mut r)?;
    r.skip(3)?; // language

    let description = read_string(&mut r, enc);
    let key = if description.is_empty() || description.eq_ignore_ascii_case(base) {
        IStr::intern_str(base)
    } else {
        IStr::from(format!("{base}:{description}")).intern()
    };
    dict.insert(key, read_string(&mut r, enc));
    Ok(())
}

fn read_tipl_frame(id: u32, data: &[u8], dict: &mut Dictionary) -> Result<()> {
    let mut r = Reader::new(data);
    let enc = read_encoding(&mut r)?;

    loop {
        let role = read_string(&mut r, enc);
        if role.is_empty() {
            break;
        }

        let key = if id == cc4(b"TMCL") {
            IStr::from(format!("{}:{role}", tags::PERFORMER)).intern()
        } else if role.eq_ignore_ascii_case("engineer") {
            IStr::intern_str(tags::ENGINEER)
        } else if role.eq_ignore_ascii_case("producer") {
            IStr::intern_str(tags::PRODUCER)
        } else if role.eq_ignore_ascii_case("mix") {
            IStr::intern_str(tags::MIXER)
        } else {
            IStr::from(format!("involved:{role}")).intern()
        };
        dict.insert(key, read_string(&mut r, enc));
    }
    Ok(())
}

fn read_apic_frame(
    version: u8,
    data: &mut Buffer,
    kind: ImageType,
    dest: &mut Image,
) -> Result<bool> {
    let mut r = Reader::new(data);
    let enc = read_encoding(&mut r)?;

    let mime_type = if version >= 3 {
        read_string(&mut r, Encoding::Latin1)
    } else {
        match r.read_bytes(3)? {
            b"JPG" => IStr::intern_str("image/jpeg"),
            b"PNG" => IStr::intern_str("image/png"),
            _ => IStr::default(),
        }
    };

    let apic_type = u32::from(r.read_u8()?);
    if apic_type != kind.code() {
        // An untyped picture still satisfies a front-cover request.
        if kind != ImageType::FrontCover || apic_type != 0 {
            return Ok(false);
        }
    }

    let description = read_string(&mut r, enc);
    if r.remain() == 0 {
        return Ok(false);
    }

    dest.set_mime_type(mime_type);
    dest.set_description(description);
    let consumed = r.tell();
    data.pop_front(consumed);
    dest.set_data(std::mem::take(data));
    Ok(true)
}

/// Skips over a tag at the current position; returns whether one was
/// present.
///
/// # Errors
///
/// Propagates stream failures.
pub fn skip(stream: &mut dyn Stream) -> Result<bool> {
    if let Some(header) = Header::read(stream)? {
        stream.skip(u64::from(header.size))?;
        return Ok(true);
    }
    Ok(false)
}

/// Reads the tag at the current position into `dict`. A missing tag is
/// not an error.
///
/// # Errors
///
/// Fails on malformed frames and unimplemented frame features.
pub fn read(stream: &mut dyn Stream, dict: &mut Dictionary) -> Result<()> {
    let Some(header) = Header::read(stream)? else {
        return Ok(());
    };

    let mut parser = FrameParser::new(stream, header)?;
    let mut data = Buffer::new();

    while let Some(id) = parser.next(&mut data)? {
        if id == cc4(b"COMM") {
            read_comm_or_uslt(tags::COMMENT, &data, dict)?;
        } else if id == cc4(b"USLT") {
            read_comm_or_uslt(tags::LYRICS, &data, dict)?;
        } else if id == cc4(b"TIPL") || id == cc4(b"TMCL") {
            read_tipl_frame(id, &data, dict)?;
        } else if id >> 24 == u32::from(b'T') {
            read_text_frame(id, &data, dict)?;
        } else if id >> 24 == u32::from(b'W') {
            read_url_frame(id, &data, dict);
        }
    }

    dict.insert(
        tags::TAG_TYPE,
        IStr::from(format!("ID3v2.{}", header.version)),
    );
    Ok(())
}

/// Extracts the first embedded picture matching `kind` from the tag at
/// the current position.
///
/// # Errors
///
/// Fails on malformed frames.
pub fn find_image(stream: &mut dyn Stream, kind: ImageType) -> Result<Option<Image>> {
    let Some(header) = Header::read(stream)? else {
        return Ok(None);
    };

    let mut parser = FrameParser::new(stream, header)?;
    let mut data = Buffer::new();
    let mut image = Image::default();

    while let Some(id) = parser.next(&mut data)? {
        if id == cc4(b"APIC") && read_apic_frame(header.version, &mut data, kind, &mut image)? {
            return Ok(Some(image));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStream;

    fn synchsafe(x: u32) -> [u8; 4] {
        [
            ((x >> 21) & 0x7f) as u8,
            ((x >> 14) & 0x7f) as u8,
            ((x >> 7) & 0x7f) as u8,
            (x & 0x7f) as u8,
        ]
    }

    /// Serializes a tag with the given version and raw frames.
    fn build_tag(version: u8, frames: &[(&[u8], Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (id, content) in frames {
            body.extend_from_slice(id);
            match version {
                4 => {
                    body.extend_from_slice(&synchsafe(content.len() as u32));
                    body.extend_from_slice(&[0, 0]);
                }
                3 => {
                    body.extend_from_slice(&(content.len() as u32).to_be_bytes());
                    body.extend_from_slice(&[0, 0]);
                }
                _ => {
                    let size = content.len() as u32;
                    body.extend_from_slice(&size.to_be_bytes()[1..]);
                }
            }
            body.extend_from_slice(content);
        }

        let mut tag = Vec::new();
        tag.extend_from_slice(b"ID3");
        tag.push(version);
        tag.push(0);
        tag.push(0);
        tag.extend_from_slice(&synchsafe(body.len() as u32));
        tag.extend_from_slice(&body);
        tag
    }

    fn text_frame(value: &str) -> Vec<u8> {
        let mut content = vec![3]; // UTF-8
        content.extend_from_slice(value.as_bytes());
        content
    }

    fn parse(tag: Vec<u8>) -> Dictionary {
        let mut stream = MemoryStream::new(tag);
        let mut dict = Dictionary::new();
        read(&mut stream, &mut dict).unwrap();
        dict
    }

    #[test]
    fn v24_text_frames() {
        let tag = build_tag(
            4,
            &[
                (b"TIT2", text_frame("A Title")),
                (b"TPE1", text_frame("An Artist")),
                (b"TDRC", text_frame("2003")),
            ],
        );
        let dict = parse(tag);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "A Title");
        assert_eq!(dict.get(tags::ARTIST).unwrap(), "An Artist");
        assert_eq!(dict.get(tags::DATE).unwrap(), "2003");
        assert_eq!(dict.get(tags::TAG_TYPE).unwrap(), "ID3v2.4");
    }

    #[test]
    fn v22_frame_migration() {
        // A v2.2 TT2 frame must be read as TIT2 (canonical key: title).
        let tag = build_tag(2, &[(b"TT2", text_frame("Old Style"))]);
        let dict = parse(tag);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "Old Style");
        assert_eq!(dict.get(tags::TAG_TYPE).unwrap(), "ID3v2.2");
    }

    #[test]
    fn v23_tyer_migrates_to_date() {
        let tag = build_tag(3, &[(b"TYER", text_frame("1999"))]);
        let dict = parse(tag);
        assert_eq!(dict.get(tags::DATE).unwrap(), "1999");
    }

    #[test]
    fn genre_reference_substitution() {
        let tag = build_tag(
            4,
            &[
                (b"TCON", text_frame("(17)")),
                (b"TCON", text_frame("151")),
            ],
        );
        let dict = parse(tag);
        let genres: Vec<&str> = dict.values(tags::GENRE).map(|v| v.as_str()).collect();
        assert_eq!(genres, ["Rock", "Gothic Rock"]);
    }

    #[test]
    fn comment_with_description() {
        // iTunes-style gapless info arrives as a described comment.
        let mut content = vec![0]; // Latin-1
        content.extend_from_slice(b"eng");
        content.extend_from_slice(b"iTunSMPB\0");
        content.extend_from_slice(b" 00000000 00000840 00000540 00000000000B45C0");
        let tag = build_tag(3, &[(b"COMM", content)]);

        let dict = parse(tag);
        assert_eq!(
            dict.get("comment:iTunSMPB").unwrap(),
            " 00000000 00000840 00000540 00000000000B45C0"
        );
    }

    #[test]
    fn plain_comment_key() {
        let mut content = vec![0];
        content.extend_from_slice(b"eng");
        content.extend_from_slice(b"\0"); // empty description
        content.extend_from_slice(b"hello");
        let tag = build_tag(3, &[(b"COMM", content)]);

        let dict = parse(tag);
        assert_eq!(dict.get(tags::COMMENT).unwrap(), "hello");
    }

    #[test]
    fn txxx_uses_user_key() {
        let mut content = vec![3];
        content.extend_from_slice(b"REPLAYGAIN_TRACK_GAIN\0");
        content.extend_from_slice(b"-6.5 dB");
        let tag = build_tag(4, &[(b"TXXX", content)]);

        let dict = parse(tag);
        assert_eq!(dict.get(tags::RG_TRACK_GAIN).unwrap(), "-6.5 dB");
    }

    #[test]
    fn tmcl_roles_become_performer_keys() {
        let mut content = vec![3];
        content.extend_from_slice(b"cello\0Pablo\0");
        let tag = build_tag(4, &[(b"TMCL", content)]);

        let dict = parse(tag);
        assert_eq!(dict.get("performer:cello").unwrap(), "Pablo");
    }

    #[test]
    fn utf16_text_with_bom() {
        let mut content = vec![1, 0xff, 0xfe];
        for unit in "Héllo".encode_utf16() {
            content.extend_from_slice(&unit.to_le_bytes());
        }
        let tag = build_tag(3, &[(b"TIT2", content)]);

        let dict = parse(tag);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "Héllo");
    }

    #[test]
    fn whole_tag_unsynchronization() {
        // A v2.3 tag with the unsync flag: FF 00 pairs collapse to FF
        // before frame parsing. Frame sizes count the original data, so
        // the escaped body is one byte longer than its declared size.
        let mut body = Vec::new();
        body.extend_from_slice(b"TIT2");
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&[0x00, 0xff, 0x00, b'x']); // escaped "ÿx"

        let mut tag = Vec::new();
        tag.extend_from_slice(b"ID3");
        tag.extend_from_slice(&[3, 0, 0x80]);
        tag.extend_from_slice(&synchsafe(body.len() as u32));
        tag.extend_from_slice(&body);

        let dict = parse(tag);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "ÿx");
    }

    #[test]
    fn skip_jumps_over_tag() {
        let mut data = build_tag(4, &[(b"TIT2", text_frame("x"))]);
        let tag_len = data.len() as u64;
        data.extend_from_slice(b"PAYLOAD");

        let mut stream = MemoryStream::new(data);
        let s: &mut dyn Stream = &mut stream;
        assert!(skip(s).unwrap());
        assert_eq!(s.tell().unwrap(), tag_len);

        // Without a tag, the position is restored.
        let mut stream = MemoryStream::new(b"RIFFdata".to_vec());
        let s: &mut dyn Stream = &mut stream;
        assert!(!skip(s).unwrap());
        assert_eq!(s.tell().unwrap(), 0);
    }

    #[test]
    fn apic_extraction_with_fallback() {
        // Type 0 (untyped) satisfies a front-cover request.
        let mut content = vec![0]; // Latin-1
        content.extend_from_slice(b"image/png\0");
        content.push(0); // picture type: other
        content.extend_from_slice(b"desc\0");
        content.extend_from_slice(&[1, 2, 3, 4]);
        let tag = build_tag(3, &[(b"APIC", content)]);

        let mut stream = MemoryStream::new(tag);
        let image = find_image(&mut stream, ImageType::FrontCover)
            .unwrap()
            .expect("image found");
        assert_eq!(image.mime_type().as_str(), "image/png");
        assert_eq!(image.description().as_str(), "desc");
        assert_eq!(image.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn apic_type_mismatch_is_skipped() {
        let mut content = vec![0];
        content.extend_from_slice(b"image/png\0");
        content.push(ImageType::BackCover.code() as u8);
        content.extend_from_slice(b"\0");
        content.extend_from_slice(&[9]);
        let tag = build_tag(3, &[(b"APIC", content)]);

        let mut stream = MemoryStream::new(tag);
        assert!(find_image(&mut stream, ImageType::LeadArtist)
            .unwrap()
            .is_none());
    }

    #[test]
    fn migration_tables_are_sorted() {
        assert!(FRAME_ID_TO_V24.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(TEXT_FRAME_MAP.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(URL_FRAME_MAP.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn padding_terminates_frames() {
        let mut tag = build_tag(4, &[(b"TIT2", text_frame("t"))]);
        // Grow the declared size to cover trailing padding.
        let body_len = tag.len() - 10 + 16;
        tag.splice(6..10, synchsafe(body_len as u32));
        tag.extend_from_slice(&[0u8; 16]);

        let dict = parse(tag);
        assert_eq!(dict.get(tags::TITLE).unwrap(), "t");
    }
}
