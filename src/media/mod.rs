//! Media metadata: dictionaries, canonical tag keys, embedded images,
//! and the tag-format readers (ID3v1, ID3v2, APE, Vorbis comments).

use crate::io::Buffer;
use crate::istr::IStr;

pub mod ape;
pub mod id3v1;
pub mod id3v2;
pub mod tags;
pub mod vorbis;

/// Ordered multi-valued dictionary of metadata key/value pairs.
///
/// Implemented as a flat vector sorted by key only; duplicate keys are
/// permitted and their relative insertion order is preserved (insertion
/// uses the upper bound of the key's run). Keys and values are interned
/// on insert.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    entries: Vec<(IStr, IStr)>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from key/value pairs, preserving per-key
    /// insertion order.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut dict = Self::new();
        for (key, value) in pairs {
            dict.insert(*key, *value);
        }
        dict
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted order.
    pub fn iter(&self) -> std::slice::Iter<'_, (IStr, IStr)> {
        self.entries.iter()
    }

    /// Index of the first entry with a key not less than `key`.
    fn lower_bound(&self, key: &str) -> usize {
        self.entries.partition_point(|(k, _)| k.as_str() < key)
    }

    /// Index one past the last entry with key `key`.
    fn upper_bound(&self, key: &str) -> usize {
        self.entries.partition_point(|(k, _)| k.as_str() <= key)
    }

    /// Inserts at the end of the key's run, preserving insertion order
    /// among equal keys.
    pub fn insert(&mut self, key: impl Into<IStr>, value: impl Into<IStr>) {
        let key = key.into().intern();
        let value = value.into().intern();
        let at = self.upper_bound(&key);
        self.entries.insert(at, (key, value));
    }

    /// Inserts only when no entry with `key` exists.
    pub fn try_insert(&mut self, key: impl Into<IStr>, value: impl Into<IStr>) {
        let key = key.into();
        if !self.contains_key(&key) {
            self.insert(key, value);
        }
    }

    /// Replaces every entry with key `key` by the single pair
    /// `(key, value)` (creating it if none existed).
    pub fn insert_or_assign(&mut self, key: impl Into<IStr>, value: impl Into<IStr>) {
        let key = key.into().intern();
        let value = value.into().intern();

        let start = self.lower_bound(&key);
        if self.entries.get(start).is_some_and(|(k, _)| *k == key) {
            self.entries[start].1 = value;
            let end = self.upper_bound(&key);
            self.entries.drain(start + 1..end);
        } else {
            self.entries.insert(start, (key, value));
        }
    }

    /// First value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&IStr> {
        let at = self.lower_bound(key);
        self.entries
            .get(at)
            .filter(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    /// All values stored under `key`, in insertion order.
    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a IStr> {
        let start = self.lower_bound(key);
        let end = self.upper_bound(key);
        self.entries[start..end].iter().map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn count(&self, key: &str) -> usize {
        self.upper_bound(key) - self.lower_bound(key)
    }

    /// Removes every entry with key `key`; returns how many were
    /// removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let start = self.lower_bound(key);
        let end = self.upper_bound(key);
        self.entries.drain(start..end);
        end - start
    }

    /// Merges `other` into `self` with self-wins semantics: for every
    /// run of equal-keyed entries in `other`, the entire run is inserted
    /// only when `self` has no entry with that key.
    pub fn merge(&mut self, other: &Dictionary) {
        if self.is_empty() {
            self.entries = other.entries.clone();
            return;
        }

        let mut i = 0;
        while i < other.entries.len() {
            let key = &other.entries[i].0;
            let run_end = other.upper_bound(key);
            if !self.contains_key(key) {
                for (k, v) in &other.entries[i..run_end] {
                    self.insert(k.clone(), v.clone());
                }
            }
            i = run_end;
        }
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = &'a (IStr, IStr);
    type IntoIter = std::slice::Iter<'a, (IStr, IStr)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Embedded picture type, following the APIC/FLAC picture code space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageType {
    Other = 0,
    FileIcon = 1,
    OtherFileIcon = 2,
    FrontCover = 3,
    BackCover = 4,
    Leaflet = 5,
    Media = 6,
    LeadArtist = 7,
    Artist = 8,
    Conductor = 9,
    Band = 10,
    Composer = 11,
    Lyricist = 12,
    RecordingLocation = 13,
    DuringRecording = 14,
    DuringPerformance = 15,
    VideoCapture = 16,
    BrightFish = 17,
    Illustration = 18,
    BandLogo = 19,
    PublisherLogo = 20,
}

impl ImageType {
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Embedded cover art.
#[derive(Clone, Debug, Default)]
pub struct Image {
    mime_type: IStr,
    description: IStr,
    data: Buffer,
}

impl Image {
    #[must_use]
    pub fn mime_type(&self) -> &IStr {
        &self.mime_type
    }

    #[must_use]
    pub fn description(&self) -> &IStr {
        &self.description
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_mime_type(&mut self, mime_type: IStr) {
        self.mime_type = mime_type;
    }

    pub fn set_description(&mut self, description: IStr) {
        self.description = description;
    }

    pub fn set_data(&mut self, data: Buffer) {
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_sorts_by_key_preserving_order() {
        let dict = Dictionary::from_pairs(&[
            ("title", "T"),
            ("artist", "A1"),
            ("album", "X"),
            ("artist", "A2"),
        ]);

        let keys: Vec<&str> = dict.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["album", "artist", "artist", "title"]);

        let artists: Vec<&str> = dict.values("artist").map(IStr::as_str).collect();
        assert_eq!(artists, ["A1", "A2"]);
    }

    #[test]
    fn insert_or_assign_collapses_duplicates() {
        let mut dict = Dictionary::from_pairs(&[
            ("artist", "A1"),
            ("artist", "A2"),
            ("title", "T"),
        ]);

        dict.insert_or_assign("artist", "A3");
        assert_eq!(dict.count("artist"), 1);
        assert_eq!(dict.get("artist").unwrap(), "A3");
        assert_eq!(dict.len(), 2);

        dict.insert_or_assign("genre", "G");
        assert_eq!(dict.get("genre").unwrap(), "G");
    }

    #[test]
    fn merge_self_wins_per_key_run() {
        let mut x = Dictionary::from_pairs(&[
            ("album", "A"),
            ("artist", "A1"),
            ("artist", "A2"),
            ("title", "T"),
        ]);
        let y = Dictionary::from_pairs(&[
            ("album", "B1"),
            ("album", "B2"),
            ("artist", "C1"),
            ("genre", "G"),
            ("title", "Z"),
        ]);

        x.merge(&y);
        let entries: Vec<(&str, &str)> = x
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            entries,
            [
                ("album", "A"),
                ("artist", "A1"),
                ("artist", "A2"),
                ("genre", "G"),
                ("title", "T"),
            ]
        );
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let d = Dictionary::from_pairs(&[("album", "A"), ("artist", "B")]);

        let mut lhs = d.clone();
        lhs.merge(&Dictionary::new());
        assert_eq!(lhs.len(), 2);

        let mut empty = Dictionary::new();
        empty.merge(&d);
        let entries: Vec<&str> = empty.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(entries, ["album", "artist"]);
    }

    #[test]
    fn remove_drops_whole_run() {
        let mut dict = Dictionary::from_pairs(&[
            ("artist", "A1"),
            ("artist", "A2"),
            ("title", "T"),
        ]);
        assert_eq!(dict.remove("artist"), 2);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.remove("artist"), 0);
    }
}
