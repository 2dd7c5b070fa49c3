//! Borrowing, bounds-checked binary reader.
//!
//! [`Reader`] is a non-owning cursor over a byte slice with big/little
//! endian integer reads, slicing, and Pascal-string helpers. Every bounded
//! method fails with `out_of_bounds` when insufficient bytes remain; the
//! `*_unchecked` counterparts are documented bypasses for hot paths that
//! have already validated the remaining length.

use crate::error::{Error, Result};

/// Cursor over borrowed bytes.
#[derive(Clone, Copy, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! int_reads {
    ($($name:ident, $ty:ty, $from:ident;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "` and advances the cursor.")]
            ///
            /// # Errors
            ///
            /// Fails with `out_of_bounds` when too few bytes remain.
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
                Ok(<$ty>::$from(bytes.try_into().expect("sized read")))
            }
        )*
    };
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remain(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The remaining bytes, without advancing.
    #[must_use]
    pub fn peek(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// The next `n` bytes, without advancing.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when fewer than `n` bytes remain.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Reads `n` bytes and advances the cursor.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` at the end of the data.
    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    int_reads! {
        read_u16_be, u16, from_be_bytes;
        read_u16_le, u16, from_le_bytes;
        read_u32_be, u32, from_be_bytes;
        read_u32_le, u32, from_le_bytes;
        read_u64_be, u64, from_be_bytes;
        read_u64_le, u64, from_le_bytes;
    }

    /// Reads a 24-bit big-endian unsigned integer.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when fewer than 3 bytes remain.
    pub fn read_u24_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(3)?;
        Ok((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    /// Repositions the cursor to `pos`.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::out_of_bounds(format!(
                "cannot seek to byte {pos} of {}",
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Advances the cursor by `n` bytes.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Moves the cursor back by `n` bytes.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` before the start of the data.
    pub fn rewind(&mut self, n: usize) -> Result<()> {
        if n > self.pos {
            return Err(Error::out_of_bounds("cannot rewind past start"));
        }
        self.pos -= n;
        Ok(())
    }

    /// Returns a sub-reader over the next `n` bytes without advancing.
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when fewer than `n` bytes remain.
    pub fn slice(&self, n: usize) -> Result<Reader<'a>> {
        Ok(Reader::new(self.peek_bytes(n)?))
    }

    /// Reads a length-prefixed byte string (32-bit big-endian length).
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when the prefix or content overruns the
    /// data.
    pub fn read_pascal_be32(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32_be()? as usize;
        self.read_bytes(len)
    }

    /// Reads a length-prefixed byte string (32-bit little-endian length).
    ///
    /// # Errors
    ///
    /// Fails with `out_of_bounds` when the prefix or content overruns the
    /// data.
    pub fn read_pascal_le32(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32_le()? as usize;
        self.read_bytes(len)
    }

    // ------------------------------------------------------------------
    // Unchecked counterparts. Each assumes the caller has already
    // verified `remain()` via an explicit check or `peek_bytes`.
    // ------------------------------------------------------------------

    /// Advances the cursor without a bounds check.
    ///
    /// # Safety
    ///
    /// The caller must ensure `n <= self.remain()`.
    pub unsafe fn skip_unchecked(&mut self, n: usize) {
        debug_assert!(n <= self.remain());
        self.pos += n;
    }

    /// Reads `n` bytes without a bounds check.
    ///
    /// # Safety
    ///
    /// The caller must ensure `n <= self.remain()`.
    pub unsafe fn read_bytes_unchecked(&mut self, n: usize) -> &'a [u8] {
        debug_assert!(n <= self.remain());
        let start = self.pos;
        self.pos += n;
        self.data.get_unchecked(start..start + n)
    }

    /// Reads a byte without a bounds check.
    ///
    /// # Safety
    ///
    /// The caller must ensure `self.remain() >= 1`.
    pub unsafe fn read_u8_unchecked(&mut self) -> u8 {
        debug_assert!(self.remain() >= 1);
        let b = *self.data.get_unchecked(self.pos);
        self.pos += 1;
        b
    }

    /// Reads a big-endian `u32` without a bounds check.
    ///
    /// # Safety
    ///
    /// The caller must ensure `self.remain() >= 4`.
    pub unsafe fn read_u32_be_unchecked(&mut self) -> u32 {
        debug_assert!(self.remain() >= 4);
        let bytes = self.read_bytes_unchecked(4);
        u32::from_be_bytes(bytes.try_into().expect("sized read"))
    }

    fn check(&self, n: usize) -> Result<()> {
        if n > self.remain() {
            return Err(Error::out_of_bounds(format!(
                "cannot read {n} of {} bytes",
                self.remain()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endian_reads() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_u16_be().unwrap(), 0x1234);
        assert_eq!(r.read_u16_le().unwrap(), 0x7856);
        assert_eq!(r.remain(), 0);

        let mut r = Reader::new(&data);
        assert_eq!(r.read_u24_be().unwrap(), 0x0012_3456);
        assert_eq!(r.tell(), 3);
    }

    #[test]
    fn bounded_reads_fail_cleanly() {
        let mut r = Reader::new(&[1, 2]);
        assert!(r.read_u32_be().is_err());
        assert_eq!(r.tell(), 0);
        assert!(r.skip(3).is_err());
        assert!(r.slice(3).is_err());
    }

    #[test]
    fn pascal_strings() {
        let data = [0, 0, 0, 3, b'a', b'b', b'c', 9];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_pascal_be32().unwrap(), b"abc");
        assert_eq!(r.remain(), 1);

        let truncated = [0, 0, 0, 9, b'a'];
        let mut r = Reader::new(&truncated);
        assert!(r.read_pascal_be32().is_err());
    }

    #[test]
    fn unchecked_after_peek() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        let mut r = Reader::new(&data);
        assert!(r.peek_bytes(4).is_ok());
        // SAFETY: four bytes were just verified present.
        let value = unsafe { r.read_u32_be_unchecked() };
        assert_eq!(value, 0xdead_beef);
    }
}
