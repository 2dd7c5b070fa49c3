//! Local file stream backend.
//!
//! Registered for the `file` scheme (and scheme-less relative references).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::io::{Mode, Stream};
use crate::uri::Uri;

pub struct FileStream {
    location: Uri,
    file: File,
    writable: bool,
    eof: bool,
}

/// Opens a local file for the given URI.
///
/// # Errors
///
/// Fails with `read_fault` when the file cannot be opened.
pub fn create(location: &Uri, mode: Mode) -> Result<Box<dyn Stream>> {
    let path = location.to_file_path()?;

    let mut options = OpenOptions::new();
    options.read(mode.contains(Mode::IN) || !mode.contains(Mode::OUT));
    if mode.contains(Mode::OUT) {
        options.write(true).create(true);
        if mode.contains(Mode::TRUNC) {
            options.truncate(true);
        }
    }
    if mode.contains(Mode::APP) {
        options.append(true);
    }

    let file = options
        .open(&path)
        .map_err(|e| Error::read_fault(format!("cannot open '{path}': {e}")))?;

    Ok(Box::new(FileStream {
        location: location.clone(),
        file,
        writable: mode.contains(Mode::OUT) || mode.contains(Mode::APP),
        eof: false,
    }))
}

impl Stream for FileStream {
    fn location(&self) -> Uri {
        self.location.clone()
    }

    fn eof(&mut self) -> bool {
        self.eof
    }

    fn size(&mut self) -> Result<u64> {
        let metadata = self.file.metadata().map_err(Error::from)?;
        Ok(metadata.len())
    }

    fn tell(&mut self) -> Result<u64> {
        self.file.stream_position().map_err(Error::from)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.eof = false;
        self.file
            .seek(pos)
            .map_err(|e| Error::seek_error(e.to_string()))
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<()> {
        self.file.read_exact(dst).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                self.eof = true;
                Error::end_of_file("unexpected end of file")
            } else {
                Error::read_fault(e.to_string())
            }
        })
    }

    fn try_read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < dst.len() {
            match self.file.read(&mut dst[total..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::read_fault(e.to_string())),
            }
        }
        Ok(total)
    }

    fn write(&mut self, src: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::not_implemented("stream is not open for writing"));
        }
        self.file
            .write_all(src)
            .map_err(|e| Error::read_fault(e.to_string()))
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if !self.writable {
            return Err(Error::not_implemented("stream is not open for writing"));
        }
        self.file
            .set_len(size)
            .map_err(|e| Error::read_fault(e.to_string()))
    }
}
