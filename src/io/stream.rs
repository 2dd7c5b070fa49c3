//! Seekable byte-stream abstraction.
//!
//! [`Stream`] is the polymorphic surface every container parser reads
//! through. Backends exist for local files, HTTP(S) payloads, and
//! in-memory buffers; each registers under one or more URI schemes and is
//! reached through [`crate::io::open`].
//!
//! A strict [`Stream::read`] fails with `end_of_file` on a short read;
//! [`Stream::try_read`] returns the short count instead and never fails at
//! the end of the stream.

use std::io::SeekFrom;

use crate::error::{Error, Result};
use crate::uri::Uri;

/// Capability set of a byte-stream backend.
pub trait Stream: Send {
    /// The URI this stream was opened from.
    ///
    /// Used for re-opening and filename-derived lookups (e.g. the WavPack
    /// correction file).
    fn location(&self) -> Uri;

    /// Whether the last read consumed the final byte.
    fn eof(&mut self) -> bool;

    /// Total size in bytes. May block until known (HTTP prefetch).
    fn size(&mut self) -> Result<u64>;

    /// Current byte position.
    fn tell(&mut self) -> Result<u64>;

    /// Repositions the stream; returns the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Fills `dst` completely.
    ///
    /// # Errors
    ///
    /// Fails with `end_of_file` when fewer than `dst.len()` bytes remain.
    fn read(&mut self, dst: &mut [u8]) -> Result<()>;

    /// Reads up to `dst.len()` bytes; a short count signals end of stream.
    fn try_read(&mut self, dst: &mut [u8]) -> Result<usize>;

    /// Writes `src` at the current position.
    ///
    /// # Errors
    ///
    /// Fails with `not_implemented` on read-only backends.
    fn write(&mut self, src: &[u8]) -> Result<()>;

    /// Truncates the stream to `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails with `not_implemented` on read-only backends.
    fn truncate(&mut self, size: u64) -> Result<()>;
}

macro_rules! stream_int_reads {
    ($($name:ident, $ty:ty, $from:ident;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "` at the current position.")]
            ///
            /// # Errors
            ///
            /// Fails with `end_of_file` when too few bytes remain.
            pub fn $name(&mut self) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.read(&mut buf)?;
                Ok(<$ty>::$from(buf))
            }
        )*
    };
}

/// Typed helpers layered over the raw capability set.
impl dyn Stream + '_ {
    /// Bytes between the current position and the end of the stream.
    ///
    /// # Errors
    ///
    /// Propagates backend failures from `size`/`tell`.
    pub fn remain(&mut self) -> Result<u64> {
        Ok(self.size()?.saturating_sub(self.tell()?))
    }

    /// Seeks to an absolute byte position.
    ///
    /// # Errors
    ///
    /// Fails with `seek_error` on invalid positions.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    /// Advances the position by `n` bytes.
    ///
    /// # Errors
    ///
    /// Fails with `seek_error` on invalid positions.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.seek(SeekFrom::Current(i64::try_from(n)?)).map(|_| ())
    }

    /// Moves the position back by `n` bytes.
    ///
    /// # Errors
    ///
    /// Fails with `seek_error` on invalid positions.
    pub fn rewind_by(&mut self, n: u64) -> Result<()> {
        self.seek(SeekFrom::Current(-i64::try_from(n)?)).map(|_| ())
    }

    /// Returns to the start of the stream.
    ///
    /// # Errors
    ///
    /// Fails with `seek_error` when the backend rejects the seek.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Reads into `dst` and rewinds to the starting position.
    ///
    /// # Errors
    ///
    /// Fails with `end_of_file` when too few bytes remain.
    pub fn peek(&mut self, dst: &mut [u8]) -> Result<()> {
        self.read(dst)?;
        self.rewind_by(dst.len() as u64)
    }

    /// Reads exactly `n` bytes into a fresh vector.
    ///
    /// # Errors
    ///
    /// Fails with `end_of_file` when too few bytes remain.
    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails with `end_of_file` at the end of the stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    stream_int_reads! {
        read_u16_be, u16, from_be_bytes;
        read_u16_le, u16, from_le_bytes;
        read_u32_be, u32, from_be_bytes;
        read_u32_le, u32, from_le_bytes;
        read_u64_be, u64, from_be_bytes;
        read_u64_le, u64, from_le_bytes;
    }
}

/// Adapts a [`Stream`] to `std::io::Read` and `std::io::Seek` for
/// libraries that consume the standard traits (claxon, ogg).
pub struct IoAdapter<'a> {
    inner: &'a mut dyn Stream,
}

impl<'a> IoAdapter<'a> {
    #[must_use]
    pub fn new(inner: &'a mut dyn Stream) -> Self {
        Self { inner }
    }
}

impl std::io::Read for IoAdapter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner
            .try_read(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl std::io::Seek for IoAdapter<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner
            .seek(pos)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    }
}

/// Resolves a relative seek against a known size and position.
///
/// Shared by the in-memory backends; fails with `seek_error` outside
/// `[0, size]`.
pub(crate) fn resolve_seek(pos: SeekFrom, size: u64, current: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => i128::from(offset),
        SeekFrom::Current(offset) => i128::from(current) + i128::from(offset),
        SeekFrom::End(offset) => i128::from(size) + i128::from(offset),
    };

    if target < 0 || target > i128::from(size) {
        return Err(Error::seek_error(format!(
            "seek to byte {target} outside stream of {size} bytes"
        )));
    }
    Ok(target as u64)
}
