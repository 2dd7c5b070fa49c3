//! Immutable, reference-counted UTF-8 strings with interning.
//!
//! Tag dictionaries hold many repeated strings (canonical keys, repeated
//! artist names across chapters). [`IStr`] is a cheap-to-clone immutable
//! string; [`IStr::intern`] deduplicates content through a process-wide
//! pool so that repeated values share one allocation and compare by
//! pointer first.
//!
//! Metadata arrives in a variety of legacy encodings. The `from_*`
//! constructors convert UTF-16 (BOM-aware and explicit-endian), Latin-1 and
//! Windows-1252 into valid UTF-8; the lossy variants substitute U+FFFD and
//! never fail.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, LazyLock, Mutex};

use crate::error::{Error, Result};

/// Immutable, reference-counted UTF-8 string.
///
/// Cloning is a reference-count increment. Equality first checks pointer
/// identity, which makes comparisons between interned strings O(1).
#[derive(Clone)]
pub struct IStr(Arc<str>);

/// Process-wide intern pool, keyed by string content.
///
/// Entries are never evicted; the pool holds one `Arc` per distinct
/// interned string for the lifetime of the process.
static POOL: LazyLock<Mutex<HashSet<PoolEntry>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

struct PoolEntry(Arc<str>);

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for PoolEntry {}

impl Hash for PoolEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Borrow<str> for PoolEntry {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl IStr {
    /// Creates a new (un-interned) string from `s`.
    #[must_use]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Returns the pooled representation of this string.
    ///
    /// The first interning of a given content inserts it into the pool;
    /// later calls return the shared `Arc`.
    #[must_use]
    pub fn intern(self) -> Self {
        let mut pool = POOL.lock().expect("intern pool poisoned");
        if let Some(entry) = pool.get(&*self.0) {
            return Self(Arc::clone(&entry.0));
        }
        pool.insert(PoolEntry(Arc::clone(&self.0)));
        self
    }

    /// Interns a borrowed string slice.
    #[must_use]
    pub fn intern_str(s: &str) -> Self {
        let mut pool = POOL.lock().expect("intern pool poisoned");
        if let Some(entry) = pool.get(s) {
            return Self(Arc::clone(&entry.0));
        }
        let rep: Arc<str> = Arc::from(s);
        pool.insert(PoolEntry(Arc::clone(&rep)));
        Self(rep)
    }

    /// Creates a string from UTF-8 bytes, failing on invalid sequences.
    ///
    /// # Errors
    ///
    /// Returns `invalid_argument` when `bytes` is not valid UTF-8.
    pub fn from_utf8(bytes: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(bytes)?;
        Ok(Self::new(s))
    }

    /// Creates a string from UTF-8 bytes, replacing invalid sequences with
    /// U+FFFD.
    #[must_use]
    pub fn from_utf8_lossy(bytes: &[u8]) -> Self {
        Self(Arc::from(String::from_utf8_lossy(bytes)))
    }

    /// Creates a string from UTF-16 bytes.
    ///
    /// A leading byte-order mark selects the endianness; without one,
    /// little-endian is assumed (the common case for tag writers that omit
    /// the BOM).
    ///
    /// # Errors
    ///
    /// Returns `invalid_argument` on unpaired surrogates.
    pub fn from_utf16(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0xfe, 0xff, rest @ ..] => Self::from_utf16_units(rest, u16::from_be_bytes, true),
            [0xff, 0xfe, rest @ ..] => Self::from_utf16_units(rest, u16::from_le_bytes, true),
            _ => Self::from_utf16_units(bytes, u16::from_le_bytes, true),
        }
    }

    /// Lossy counterpart of [`IStr::from_utf16`].
    #[must_use]
    pub fn from_utf16_lossy(bytes: &[u8]) -> Self {
        match bytes {
            [0xfe, 0xff, rest @ ..] => Self::from_utf16_units(rest, u16::from_be_bytes, false),
            [0xff, 0xfe, rest @ ..] => Self::from_utf16_units(rest, u16::from_le_bytes, false),
            _ => Self::from_utf16_units(bytes, u16::from_le_bytes, false),
        }
        .expect("lossy conversion is infallible")
    }

    /// Creates a string from big-endian UTF-16 without a BOM, replacing
    /// invalid sequences.
    #[must_use]
    pub fn from_utf16be_lossy(bytes: &[u8]) -> Self {
        Self::from_utf16_units(bytes, u16::from_be_bytes, false)
            .expect("lossy conversion is infallible")
    }

    /// Creates a string from little-endian UTF-16 without a BOM, replacing
    /// invalid sequences.
    #[must_use]
    pub fn from_utf16le_lossy(bytes: &[u8]) -> Self {
        Self::from_utf16_units(bytes, u16::from_le_bytes, false)
            .expect("lossy conversion is infallible")
    }

    fn from_utf16_units(bytes: &[u8], load: fn([u8; 2]) -> u16, strict: bool) -> Result<Self> {
        // A trailing odd byte is dropped rather than rejected; truncated
        // tag fields are common in the wild.
        let units = bytes.chunks_exact(2).map(|pair| load([pair[0], pair[1]]));

        let mut out = String::with_capacity(bytes.len() / 2);
        for decoded in char::decode_utf16(units) {
            match decoded {
                Ok(c) => out.push(c),
                Err(e) if strict => {
                    return Err(Error::invalid_argument(format!(
                        "invalid UTF-16: {e}"
                    )));
                }
                Err(_) => out.push(char::REPLACEMENT_CHARACTER),
            }
        }
        Ok(Self(Arc::from(out)))
    }

    /// Creates a string from ISO-8859-1 (Latin-1) bytes.
    ///
    /// Every byte maps directly to the Unicode code point of the same
    /// value, so this conversion cannot fail.
    #[must_use]
    pub fn from_latin1(bytes: &[u8]) -> Self {
        let s: String = bytes.iter().map(|&b| char::from(b)).collect();
        Self(Arc::from(s))
    }

    /// Creates a string from Windows-1252 bytes.
    ///
    /// Like Latin-1 but with the 0x80..=0x9F range mapped through the
    /// Windows-1252 table; the five unassigned bytes become U+FFFD.
    #[must_use]
    pub fn from_cp1252(bytes: &[u8]) -> Self {
        let s: String = bytes.iter().map(|&b| cp1252_char(b)).collect();
        Self(Arc::from(s))
    }

    /// Returns the string content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Windows-1252 mapping for a single byte.
fn cp1252_char(b: u8) -> char {
    // The 0x80..=0x9F block differs from ISO-8859-1; everything else is
    // the identity mapping.
    const C1: [char; 32] = [
        '\u{20ac}', '\u{fffd}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02c6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{fffd}',
        '\u{017d}', '\u{fffd}', '\u{fffd}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
        '\u{0153}', '\u{fffd}', '\u{017e}', '\u{0178}',
    ];

    match b {
        0x80..=0x9f => C1[usize::from(b - 0x80)],
        _ => char::from(b),
    }
}

impl Default for IStr {
    fn default() -> Self {
        static EMPTY: LazyLock<Arc<str>> = LazyLock::new(|| Arc::from(""));
        Self(Arc::clone(&EMPTY))
    }
}

impl Deref for IStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IStr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for IStr {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl PartialEq for IStr {
    fn eq(&self, other: &Self) -> bool {
        // Interned strings with equal content share one allocation.
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for IStr {}

impl PartialEq<str> for IStr {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for IStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl PartialOrd for IStr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IStr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Hash for IStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Mutable builder companion to [`IStr`].
///
/// Supports incremental construction by append and `write!`; call
/// [`IStrBuf::promote`] to freeze the content into an immutable [`IStr`].
#[derive(Default)]
pub struct IStrBuf(String);

impl IStrBuf {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self(String::with_capacity(n))
    }

    pub fn push_str(&mut self, s: &str) {
        self.0.push_str(s);
    }

    pub fn push(&mut self, c: char) {
        self.0.push(c);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Freezes the accumulated content into an immutable [`IStr`].
    ///
    /// The content is valid UTF-8 by construction, so no validation pass
    /// is needed.
    #[must_use]
    pub fn promote(self) -> IStr {
        IStr::from(self.0)
    }
}

impl fmt::Write for IStrBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_storage() {
        let a = IStr::new("replaygain track gain").intern();
        let b = IStr::intern_str("replaygain track gain");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn utf8_strict_rejects_invalid() {
        assert!(IStr::from_utf8(b"\xff\xfe\xfd").is_err());
        assert_eq!(IStr::from_utf8(b"title").unwrap(), "title");
    }

    #[test]
    fn utf8_lossy_is_always_valid() {
        let s = IStr::from_utf8_lossy(b"abc\xff\xc0def");
        assert!(std::str::from_utf8(s.as_str().as_bytes()).is_ok());
        assert!(s.as_str().contains('\u{fffd}'));
    }

    #[test]
    fn utf16_bom_detection() {
        // "Hi" in UTF-16BE with BOM.
        let be = [0xfe, 0xff, 0x00, b'H', 0x00, b'i'];
        assert_eq!(IStr::from_utf16(&be).unwrap(), "Hi");

        // "Hi" in UTF-16LE with BOM.
        let le = [0xff, 0xfe, b'H', 0x00, b'i', 0x00];
        assert_eq!(IStr::from_utf16(&le).unwrap(), "Hi");

        // Without a BOM, little-endian is assumed.
        let bare = [b'H', 0x00, b'i', 0x00];
        assert_eq!(IStr::from_utf16(&bare).unwrap(), "Hi");
    }

    #[test]
    fn utf16_lossy_replaces_unpaired_surrogates() {
        let bytes = [0xfe, 0xff, 0xd8, 0x00]; // lone high surrogate (BE)
        let s = IStr::from_utf16_lossy(&bytes);
        assert_eq!(s.as_str(), "\u{fffd}");
    }

    #[test]
    fn latin1_maps_high_bytes() {
        assert_eq!(IStr::from_latin1(b"caf\xe9"), "café");
    }

    #[test]
    fn cp1252_c1_block() {
        assert_eq!(IStr::from_cp1252(b"\x93quoted\x94"), "\u{201c}quoted\u{201d}");
        assert_eq!(IStr::from_cp1252(b"\x80"), "\u{20ac}");
        assert_eq!(IStr::from_cp1252(b"\x81"), "\u{fffd}");
    }

    #[test]
    fn buffer_promote() {
        use std::fmt::Write;

        let mut buf = IStrBuf::new();
        write!(buf, "performer:{}", "cello").unwrap();
        assert_eq!(buf.promote(), "performer:cello");
    }
}
