//! In-memory stream backend.
//!
//! Wraps an owned byte vector in the [`Stream`] capability set. Used by
//! tests and anywhere a parsed blob must be re-read through the stream
//! interface.

use std::io::SeekFrom;

use crate::error::{Error, Result};
use crate::io::stream::resolve_seek;
use crate::io::Stream;
use crate::uri::Uri;

pub struct MemoryStream {
    location: Uri,
    data: Vec<u8>,
    cursor: u64,
    eof: bool,
}

impl MemoryStream {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            location: Uri::empty(),
            data,
            cursor: 0,
            eof: false,
        }
    }

    /// Attaches a location URI, reported from [`Stream::location`].
    #[must_use]
    pub fn with_location(mut self, location: Uri) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Stream for MemoryStream {
    fn location(&self) -> Uri {
        self.location.clone()
    }

    fn eof(&mut self) -> bool {
        self.eof
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.cursor)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.cursor = resolve_seek(pos, self.data.len() as u64, self.cursor)?;
        self.eof = false;
        Ok(self.cursor)
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<()> {
        let n = self.try_read(dst)?;
        if n != dst.len() {
            return Err(Error::end_of_file("unexpected end of stream"));
        }
        Ok(())
    }

    fn try_read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let start = usize::try_from(self.cursor)?;
        let remain = self.data.len().saturating_sub(start);
        let n = dst.len().min(remain);
        if n < dst.len() {
            self.eof = true;
        }
        dst[..n].copy_from_slice(&self.data[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }

    fn write(&mut self, src: &[u8]) -> Result<()> {
        let start = usize::try_from(self.cursor)?;
        let end = start + src.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(src);
        self.cursor = end as u64;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.data.truncate(usize::try_from(size)?);
        self.cursor = self.cursor.min(size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_seek_cycle() {
        let mut stream = MemoryStream::new(vec![1, 2, 3, 4, 5]);
        let s: &mut dyn Stream = &mut stream;

        assert_eq!(s.read_u16_be().unwrap(), 0x0102);
        s.seek_to(3).unwrap();
        assert_eq!(s.read_u8().unwrap(), 4);
        assert_eq!(s.remain().unwrap(), 1);

        let mut tail = [0u8; 4];
        assert_eq!(s.try_read(&mut tail).unwrap(), 1);
        assert!(s.eof());
    }

    #[test]
    fn strict_read_fails_at_eof() {
        let mut stream = MemoryStream::new(vec![9]);
        let s: &mut dyn Stream = &mut stream;
        let mut buf = [0u8; 2];
        let err = s.read(&mut buf).unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn seek_outside_fails() {
        let mut stream = MemoryStream::new(vec![0; 8]);
        let s: &mut dyn Stream = &mut stream;
        assert!(s.seek(SeekFrom::Current(-1)).is_err());
        assert!(s.seek_to(9).is_err());
        assert!(s.seek(SeekFrom::End(0)).is_ok());
    }
}
