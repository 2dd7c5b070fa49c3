//! ID3v1 tag reader.
//!
//! A 128-byte structure at the very end of the file, introduced by the
//! magic `TAG`. Fields are fixed-width Latin-1, padded with NULs or
//! spaces. The ID3v1.1 variant steals the last comment byte for a track
//! number (valid when byte 125 is NUL and byte 126 is not).

use crate::error::Result;
use crate::io::Stream;
use crate::istr::IStr;
use crate::media::{tags, Dictionary};

pub const TAG_SIZE: u64 = 128;

/// The fixed ID3v1 genre table, including the Winamp extensions.
static GENRE_NAMES: [&str; 148] = [
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "Alternative Rock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native American",
    "Cabaret",
    "New Wave",
    "Psychedelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
    "Folk",
    "Folk-Rock",
    "National Folk",
    "Swing",
    "Fast Fusion",
    "Bebob",
    "Latin",
    "Revival",
    "Celtic",
    "Bluegrass",
    "Avantgarde",
    "Gothic Rock",
    "Progressive Rock",
    "Psychedelic Rock",
    "Symphonic Rock",
    "Slow Rock",
    "Big Band",
    "Chorus",
    "Easy Listening",
    "Acoustic",
    "Humour",
    "Speech",
    "Chanson",
    "Opera",
    "Chamber Music",
    "Sonata",
    "Symphony",
    "Booty Bass",
    "Primus",
    "Porn Groove",
    "Satire",
    "Slow Jam",
    "Club",
    "Tango",
    "Samba",
    "Folklore",
    "Ballad",
    "Power Ballad",
    "Rhythmic Soul",
    "Freestyle",
    "Duet",
    "Punk Rock",
    "Drum Solo",
    "A Cappella",
    "Euro-House",
    "Dance Hall",
    "Goa Trance",
    "Drum & Bass",
    "Club-House",
    "Hardcore Techno",
    "Terror",
    "Indie",
    "Britpop",
    "Afro-Punk",
    "Polsk Punk",
    "Beat",
    "Christian Gangsta Rap",
    "Heavy Metal",
    "Black Metal",
    "Crossover",
    "Contemporary Christian",
    "Christian Rock",
    "Merengue",
    "Salsa",
    "Thrash Metal",
    "Anime",
    "J-pop",
    "Synthpop",
];

/// Genre name for an ID3v1 genre index, or empty for out-of-range
/// indices.
#[must_use]
pub fn genre_name(index: u8) -> IStr {
    GENRE_NAMES
        .get(usize::from(index))
        .map_or_else(IStr::default, |name| IStr::intern_str(name))
}

fn is_valid_tag(buf: &[u8; 128]) -> bool {
    &buf[..3] == b"TAG"
}

/// Trims trailing NUL and space padding, then converts from Latin-1.
fn read_string(bytes: &[u8]) -> IStr {
    let mut end = bytes.len();
    while end != 0 && bytes[end - 1] == 0 {
        end -= 1;
    }
    while end != 0 && bytes[end - 1] == b' ' {
        end -= 1;
    }
    IStr::from_latin1(&bytes[..end])
}

/// Looks for a trailing ID3v1 tag; returns its byte offset when present.
///
/// # Errors
///
/// Propagates stream failures other than a short file.
pub fn find(stream: &mut dyn Stream) -> Result<Option<u64>> {
    let size = stream.size()?;
    if size < TAG_SIZE {
        return Ok(None);
    }

    let start = size - TAG_SIZE;
    stream.seek_to(start)?;

    let mut buf = [0u8; 128];
    if stream.try_read(&mut buf)? == buf.len() && is_valid_tag(&buf) {
        return Ok(Some(start));
    }
    Ok(None)
}

/// Reads the 128-byte tag at the current stream position into `dict`.
///
/// # Errors
///
/// Fails with `end_of_file` when fewer than 128 bytes remain.
pub fn read(stream: &mut dyn Stream, dict: &mut Dictionary) -> Result<()> {
    let mut buf = [0u8; 128];
    stream.read(&mut buf)?;

    if !is_valid_tag(&buf) {
        return Ok(());
    }

    dict.insert(tags::TITLE, read_string(&buf[3..33]));
    dict.insert(tags::ARTIST, read_string(&buf[33..63]));
    dict.insert(tags::ALBUM, read_string(&buf[63..93]));
    dict.insert(tags::DATE, read_string(&buf[93..97]));
    dict.insert(tags::COMMENT, read_string(&buf[97..127]));
    dict.insert(tags::GENRE, genre_name(buf[127]));
    dict.insert(tags::TAG_TYPE, "ID3v1");

    if buf[125] == 0 && buf[126] != 0 {
        dict.insert(tags::TRACK_NUMBER, buf[126].to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryStream, Stream};

    fn make_tag(track: Option<u8>) -> Vec<u8> {
        let mut tag = vec![0u8; 128];
        tag[..3].copy_from_slice(b"TAG");
        tag[3..3 + 9].copy_from_slice(b"Song Name");
        tag[33..33 + 6].copy_from_slice(b"Artist");
        tag[63..63 + 5].copy_from_slice(b"Album");
        tag[93..97].copy_from_slice(b"1994");
        tag[97..97 + 7].copy_from_slice(b"comment");
        if let Some(n) = track {
            tag[126] = n;
        }
        tag[127] = 17; // Rock
        tag
    }

    #[test]
    fn find_and_read() {
        let mut data = vec![0u8; 512];
        data.extend_from_slice(&make_tag(Some(7)));

        let mut stream = MemoryStream::new(data);
        let s: &mut dyn Stream = &mut stream;

        let start = find(s).unwrap().expect("tag present");
        assert_eq!(start, 512);

        s.seek_to(start).unwrap();
        let mut dict = Dictionary::new();
        read(s, &mut dict).unwrap();

        assert_eq!(dict.get(tags::TITLE).unwrap(), "Song Name");
        assert_eq!(dict.get(tags::ARTIST).unwrap(), "Artist");
        assert_eq!(dict.get(tags::DATE).unwrap(), "1994");
        assert_eq!(dict.get(tags::GENRE).unwrap(), "Rock");
        assert_eq!(dict.get(tags::TRACK_NUMBER).unwrap(), "7");
        assert_eq!(dict.get(tags::TAG_TYPE).unwrap(), "ID3v1");
    }

    #[test]
    fn missing_tag() {
        let mut stream = MemoryStream::new(vec![0u8; 4096]);
        let s: &mut dyn Stream = &mut stream;
        assert!(find(s).unwrap().is_none());
    }

    #[test]
    fn short_file() {
        let mut stream = MemoryStream::new(vec![0u8; 16]);
        let s: &mut dyn Stream = &mut stream;
        assert!(find(s).unwrap().is_none());
    }

    #[test]
    fn genre_table() {
        assert_eq!(genre_name(0), "Blues");
        assert_eq!(genre_name(147), "Synthpop");
        assert!(genre_name(200).is_empty());
    }
}
