//! Canonical metadata keys and source-key mapping.
//!
//! Every tag format carries its own key vocabulary (ID3 frame IDs, APE
//! item names, Vorbis comment fields). The pipeline maps all of them to
//! one canonical set of lowercase English phrases so callers see a
//! uniform dictionary regardless of container.

use crate::istr::IStr;

pub const BIT_RATE: &str = "bit rate";
pub const BITS_PER_SAMPLE: &str = "bits per sample";
pub const CHANNEL_LAYOUT: &str = "channel layout";
pub const CHANNELS: &str = "channels";
pub const CODEC: &str = "codec";
pub const CODEC_PROFILE: &str = "codec profile";
pub const CONTAINER: &str = "container";
pub const TAG_TYPE: &str = "tag type";

pub const RG_ALBUM_GAIN: &str = "replaygain album gain";
pub const RG_ALBUM_PEAK: &str = "replaygain album peak";
pub const RG_TRACK_GAIN: &str = "replaygain track gain";
pub const RG_TRACK_PEAK: &str = "replaygain track peak";

pub const MB_ALBUM_ID: &str = "musicbrainz album id";
pub const MB_ALBUM_ARTIST_ID: &str = "musicbrainz album artist id";
pub const MB_ARTIST_ID: &str = "musicbrainz artist id";
pub const MB_DISC_ID: &str = "musicbrainz disc id";
pub const MB_RELEASE_COUNTRY: &str = "musicbrainz release country";
pub const MB_RELEASE_GROUP_ID: &str = "musicbrainz release group id";
pub const MB_TRACK_ID: &str = "musicbrainz track id";
pub const MB_WORK_ID: &str = "musicbrainz work id";

pub const ACOUSTID_ID: &str = "acoustid id";
pub const ACOUSTID_FINGERPRINT: &str = "acoustid fingerprint";
pub const MUSICIP_PUID: &str = "musicip puid";

pub const ALBUM: &str = "album";
pub const ALBUM_ARTIST: &str = "album artist";
pub const ALBUM_ARTIST_SORT: &str = "album artist sort";
pub const ALBUM_SORT: &str = "album sort";
pub const ARTIST: &str = "artist";
pub const ARTIST_SORT: &str = "artist sort";
pub const ARTIST_WEB_PAGE: &str = "artist web page";
pub const ASIN: &str = "asin";
pub const AUDIO_SOURCE_WEB_PAGE: &str = "audio source web page";
pub const AUTHOR: &str = "author";
pub const BARCODE: &str = "barcode";
pub const BPM: &str = "bpm";
pub const CATALOG_NUMBER: &str = "catalog number";
pub const COMMENT: &str = "comment";
pub const COMMERCIAL_INFORMATION: &str = "commercial information";
pub const COMPILATION: &str = "compilation";
pub const COMPOSER: &str = "composer";
pub const COMPOSER_SORT: &str = "composer sort";
pub const CONDUCTOR: &str = "conductor";
pub const CONTACT: &str = "contact";
pub const COPYRIGHT: &str = "copyright";
pub const COPYRIGHT_INFORMATION: &str = "copyright information";
pub const CREATION_DATE: &str = "creation date";
pub const CUE_SHEET: &str = "cue sheet";
pub const DATE: &str = "date";
pub const DESCRIPTION: &str = "description";
pub const DISC_ID: &str = "disc id";
pub const DISC_NUMBER: &str = "disc number";
pub const DISC_TOTAL: &str = "disc total";
pub const ENCODED_BY: &str = "encoded by";
pub const ENCODER: &str = "encoder";
pub const ENCODING_SETTINGS: &str = "encoding settings";
pub const ENCODING_TIME: &str = "encoding time";
pub const ENGINEER: &str = "engineer";
pub const FILE_TYPE: &str = "file type";
pub const FILE_WEB_PAGE: &str = "file web page";
pub const GENRE: &str = "genre";
pub const GROUP: &str = "group";
pub const INITIAL_KEY: &str = "initial key";
pub const ISRC: &str = "isrc";
pub const LABEL: &str = "label";
pub const LANGUAGE: &str = "language";
pub const LICENSE: &str = "license";
pub const LOCATION: &str = "location";
pub const LYRICIST: &str = "lyricist";
pub const LYRICS: &str = "lyrics";
pub const MEDIA_TYPE: &str = "media type";
pub const MIXER: &str = "mixer";
pub const MOOD: &str = "mood";
pub const ORIGINAL_ALBUM: &str = "original album";
pub const ORIGINAL_ARTIST: &str = "original artist";
pub const ORIGINAL_DATE: &str = "original date";
pub const ORIGINAL_FILENAME: &str = "original file name";
pub const ORIGINAL_LYRICIST: &str = "original lyricist";
pub const OWNER: &str = "owner";
pub const PAYMENT_WEB_PAGE: &str = "payment web page";
pub const PERFORMER: &str = "performer";
pub const PLAYLIST_DELAY: &str = "playlist delay";
pub const PRODUCED_NOTICE: &str = "produced notice";
pub const PRODUCER: &str = "producer";
pub const PUBLISHER_WEB_PAGE: &str = "publisher web page";
pub const RADIO_STATION: &str = "radio station";
pub const RADIO_STATION_OWNER: &str = "radio station owner";
pub const RADIO_STATION_WEB_PAGE: &str = "radio station web page";
pub const RATING: &str = "rating";
pub const REMIXER: &str = "remixer";
pub const SUBTITLE: &str = "subtitle";
pub const TAGGING_DATE: &str = "tagging date";
pub const TITLE: &str = "title";
pub const TITLE_SORT: &str = "title sort";
pub const TRACK_NUMBER: &str = "track number";
pub const TRACK_TOTAL: &str = "track total";
pub const USER_WEB_PAGE: &str = "user web page";
pub const WRITER: &str = "writer";

/// Source key (uppercased) → canonical key. Covers the common APE item
/// names and Vorbis comment fields; ID3 frame IDs are mapped by the
/// ID3v2 reader's own tables before reaching this point.
static COMMON_KEYS: &[(&str, &str)] = &[
    ("ACOUSTID_FINGERPRINT", ACOUSTID_FINGERPRINT),
    ("ACOUSTID_ID", ACOUSTID_ID),
    ("ALBUM", ALBUM),
    ("ALBUM ARTIST", ALBUM_ARTIST),
    ("ALBUMARTIST", ALBUM_ARTIST),
    ("ALBUMARTISTSORT", ALBUM_ARTIST_SORT),
    ("ALBUMSORT", ALBUM_SORT),
    ("ARTIST", ARTIST),
    ("ARTISTSORT", ARTIST_SORT),
    ("ASIN", ASIN),
    ("AUTHOR", AUTHOR),
    ("BARCODE", BARCODE),
    ("BPM", BPM),
    ("CATALOG", CATALOG_NUMBER),
    ("CATALOGNUMBER", CATALOG_NUMBER),
    ("COMMENT", COMMENT),
    ("COMPILATION", COMPILATION),
    ("COMPOSER", COMPOSER),
    ("COMPOSERSORT", COMPOSER_SORT),
    ("CONDUCTOR", CONDUCTOR),
    ("CONTACT", CONTACT),
    ("COPYRIGHT", COPYRIGHT),
    ("CUESHEET", CUE_SHEET),
    ("DATE", DATE),
    ("DESCRIPTION", DESCRIPTION),
    ("DISC", DISC_NUMBER),
    ("DISCID", DISC_ID),
    ("DISCNUMBER", DISC_NUMBER),
    ("DISCTOTAL", DISC_TOTAL),
    ("ENCODED-BY", ENCODED_BY),
    ("ENCODEDBY", ENCODED_BY),
    ("ENCODER", ENCODER),
    ("ENCODERSETTINGS", ENCODING_SETTINGS),
    ("ENGINEER", ENGINEER),
    ("GENRE", GENRE),
    ("GROUPING", GROUP),
    ("INITIALKEY", INITIAL_KEY),
    ("ISRC", ISRC),
    ("LABEL", LABEL),
    ("LANGUAGE", LANGUAGE),
    ("LICENSE", LICENSE),
    ("LOCATION", LOCATION),
    ("LYRICIST", LYRICIST),
    ("LYRICS", LYRICS),
    ("MEDIA", MEDIA_TYPE),
    ("MIXARTIST", REMIXER),
    ("MIXER", MIXER),
    ("MOOD", MOOD),
    ("MUSICBRAINZ_ALBUMARTISTID", MB_ALBUM_ARTIST_ID),
    ("MUSICBRAINZ_ALBUMID", MB_ALBUM_ID),
    ("MUSICBRAINZ_ARTISTID", MB_ARTIST_ID),
    ("MUSICBRAINZ_DISCID", MB_DISC_ID),
    ("MUSICBRAINZ_RELEASEGROUPID", MB_RELEASE_GROUP_ID),
    ("MUSICBRAINZ_TRACKID", MB_TRACK_ID),
    ("MUSICBRAINZ_WORKID", MB_WORK_ID),
    ("MUSICIP_PUID", MUSICIP_PUID),
    ("ORGANIZATION", LABEL),
    ("ORIGINALALBUM", ORIGINAL_ALBUM),
    ("ORIGINALARTIST", ORIGINAL_ARTIST),
    ("ORIGINALDATE", ORIGINAL_DATE),
    ("ORIGINALYEAR", ORIGINAL_DATE),
    ("PERFORMER", PERFORMER),
    ("PRODUCER", PRODUCER),
    ("PUBLISHER", LABEL),
    ("RATING", RATING),
    ("RELEASECOUNTRY", MB_RELEASE_COUNTRY),
    ("REMIXER", REMIXER),
    ("REPLAYGAIN_ALBUM_GAIN", RG_ALBUM_GAIN),
    ("REPLAYGAIN_ALBUM_PEAK", RG_ALBUM_PEAK),
    ("REPLAYGAIN_TRACK_GAIN", RG_TRACK_GAIN),
    ("REPLAYGAIN_TRACK_PEAK", RG_TRACK_PEAK),
    ("SUBTITLE", SUBTITLE),
    ("TITLE", TITLE),
    ("TITLESORT", TITLE_SORT),
    ("TOTALDISCS", DISC_TOTAL),
    ("TOTALTRACKS", TRACK_TOTAL),
    ("TRACK", TRACK_NUMBER),
    ("TRACKNUMBER", TRACK_NUMBER),
    ("TRACKTOTAL", TRACK_TOTAL),
    ("UNSYNCEDLYRICS", LYRICS),
    ("WRITER", WRITER),
    ("YEAR", DATE),
];

/// Maps a source-specific tag name to its canonical key.
///
/// The lookup is case-insensitive. Unrecognized names are passed through
/// in lowercase so no metadata is silently dropped.
#[must_use]
pub fn map_common_key(raw: &str) -> IStr {
    let upper = raw.to_ascii_uppercase();
    match COMMON_KEYS.binary_search_by(|(k, _)| (*k).cmp(upper.as_str())) {
        Ok(at) => IStr::intern_str(COMMON_KEYS[at].1),
        Err(_) => IStr::from(raw.to_ascii_lowercase()).intern(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_key_table_is_sorted() {
        assert!(COMMON_KEYS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn maps_known_keys_case_insensitively() {
        assert_eq!(map_common_key("AlbumArtist"), ALBUM_ARTIST);
        assert_eq!(map_common_key("tracknumber"), TRACK_NUMBER);
        assert_eq!(map_common_key("REPLAYGAIN_TRACK_GAIN"), RG_TRACK_GAIN);
        assert_eq!(map_common_key("Year"), DATE);
    }

    #[test]
    fn unknown_keys_pass_through_lowercased() {
        assert_eq!(map_common_key("MyCustomField"), "mycustomfield");
    }
}
