//! Owning, reallocatable byte buffer.
//!
//! [`Buffer`] is the unit of exchange between container parsers and
//! decoders: `feed()` fills one with the next encoded packet, and
//! `Decoder::send` consumes it. It is distinct from the float sample
//! buffer in [`crate::audio::Packet`].

use std::ops::{Deref, DerefMut};

use crate::error::Result;
use crate::io::Stream;

/// Owning byte buffer with explicit front/back trimming.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Buffer(Vec<u8>);

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Resizes to `n` bytes, zero-filling any new tail.
    pub fn resize(&mut self, n: usize) {
        self.0.resize(n, 0);
    }

    pub fn reserve(&mut self, n: usize) {
        self.0.reserve(n);
    }

    /// Replaces the content with a copy of `src`.
    pub fn assign_slice(&mut self, src: &[u8]) {
        self.0.clear();
        self.0.extend_from_slice(src);
    }

    /// Appends a copy of `src`.
    pub fn append_slice(&mut self, src: &[u8]) {
        self.0.extend_from_slice(src);
    }

    /// Replaces the content with the next `n` bytes of `stream`.
    ///
    /// # Errors
    ///
    /// Fails with `end_of_file` when the stream holds fewer than `n`
    /// bytes.
    pub fn assign_from_stream(&mut self, stream: &mut dyn Stream, n: usize) -> Result<()> {
        self.0.resize(n, 0);
        stream.read(&mut self.0)
    }

    /// Drops the first `n` bytes.
    pub fn pop_front(&mut self, n: usize) {
        if n >= self.0.len() {
            self.0.clear();
        } else if n != 0 {
            self.0.copy_within(n.., 0);
            let len = self.0.len() - n;
            self.0.truncate(len);
        }
    }

    /// Drops the last `n` bytes.
    pub fn pop_back(&mut self, n: usize) {
        let len = self.0.len().saturating_sub(n);
        self.0.truncate(len);
    }

    /// Inserts a copy of `prefix` before the current content.
    pub fn insert_front(&mut self, prefix: &[u8]) {
        self.0.splice(0..0, prefix.iter().copied());
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_front_and_back() {
        let mut buf = Buffer::from_vec(vec![1, 2, 3, 4, 5]);
        buf.pop_front(2);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
        buf.pop_back(1);
        assert_eq!(buf.as_slice(), &[3, 4]);
        buf.pop_front(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn insert_front() {
        let mut buf = Buffer::from_vec(vec![3, 4]);
        buf.insert_front(&[1, 2]);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }
}
