//! Shared Ogg plumbing: page scanning and stream adaptation.
//!
//! The Ogg demuxers need two views of the same stream: `ogg::PacketReader`
//! for packetization and a raw page index for sample-accurate seeking.
//! [`scan_pages`] walks the page headers once at open, recording the
//! byte offset and start granule of every page a reader may safely
//! restart from (pages that do not begin with a continued packet).

use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;
use crate::io::Stream;

/// Owning adapter from [`Stream`] to `std::io::{Read, Seek}` for the
/// `ogg` crate.
pub(crate) struct StreamIo(pub(crate) Box<dyn Stream>);

impl Read for StreamIo {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0
            .try_read(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl Seek for StreamIo {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0
            .seek(pos)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    }
}

/// One safe restart point in an Ogg stream.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PageEntry {
    /// Byte offset of the page header.
    pub offset: u64,
    /// Granule position at the page's start (the previous page's
    /// granule), i.e. the stream time of its first fresh packet.
    pub start_granule: u64,
}

/// Result of one page scan.
#[derive(Clone, Debug, Default)]
pub(crate) struct PageIndex {
    /// Restart points for audio pages, in stream order.
    pub entries: Vec<PageEntry>,
    /// Granule position of the final page.
    pub last_granule: u64,
}

impl PageIndex {
    /// The latest restart point at or before `granule`, preferring the
    /// one `backup` entries earlier (codec preroll).
    pub fn landing(&self, granule: u64, backup: usize) -> Option<PageEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let at = self
            .entries
            .partition_point(|entry| entry.start_granule <= granule)
            .saturating_sub(1);
        Some(self.entries[at.saturating_sub(backup)])
    }
}

const CONTINUED_PACKET: u8 = 0x01;
const NO_GRANULE: u64 = u64::MAX;

/// Scans all Ogg pages from `start` to the end of the stream.
///
/// Header pages (granule 0) and pages beginning mid-packet are excluded
/// from the restart index but still advance the granule bookkeeping.
///
/// # Errors
///
/// Propagates stream failures; a truncated final page ends the scan.
pub(crate) fn scan_pages(stream: &mut dyn Stream, start: u64) -> Result<PageIndex> {
    let size = stream.size()?;
    let mut index = PageIndex::default();
    let mut pos = start;
    let mut prev_granule = 0u64;

    while pos + 27 <= size {
        stream.seek_to(pos)?;
        let mut header = [0u8; 27];
        if stream.try_read(&mut header)? != header.len() || &header[..4] != b"OggS" {
            break;
        }

        let header_type = header[5];
        let granule = u64::from_le_bytes(header[6..14].try_into().expect("sized field"));
        let segments = usize::from(header[26]);

        let mut lacing = vec![0u8; segments];
        if stream.try_read(&mut lacing)? != segments {
            break;
        }
        let body: u64 = lacing.iter().map(|&n| u64::from(n)).sum();

        if granule != NO_GRANULE && granule != 0 && header_type & CONTINUED_PACKET == 0 {
            index.entries.push(PageEntry {
                offset: pos,
                start_granule: prev_granule,
            });
        }
        if granule != NO_GRANULE {
            prev_granule = granule;
            index.last_granule = granule;
        }

        pos += 27 + segments as u64 + body;
    }
    Ok(index)
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Minimal Ogg page writer for demuxer tests.

    /// Serializes one Ogg page holding whole `packets`.
    pub(crate) fn build_page(
        serial: u32,
        sequence: u32,
        granule: u64,
        header_type: u8,
        packets: &[&[u8]],
    ) -> Vec<u8> {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            let mut remain = packet.len();
            loop {
                let chunk = remain.min(255);
                lacing.push(chunk as u8);
                remain -= chunk;
                if chunk < 255 {
                    break;
                }
                if remain == 0 {
                    // A packet ending exactly on a 255-byte lacing value
                    // needs a closing zero.
                    lacing.push(0);
                    break;
                }
            }
            body.extend_from_slice(packet);
        }

        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0); // version
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0u8; 4]); // CRC patched below
        page.push(lacing.len() as u8);
        page.extend_from_slice(&lacing);
        page.extend_from_slice(&body);

        // The ogg crate verifies page checksums.
        let crc = vorbis_crc32(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }

    /// The CRC-32 used by Ogg (poly 0x04c11db7, no reflection, zero
    /// init and xorout).
    fn vorbis_crc32(data: &[u8]) -> u32 {
        let mut crc = 0u32;
        for &byte in data {
            crc ^= u32::from(byte) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 {
                    (crc << 1) ^ 0x04c1_1db7
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn scan_indexes_audio_pages() {
        use super::*;
        use crate::io::MemoryStream;

        let mut data = Vec::new();
        data.extend_from_slice(&build_page(7, 0, 0, 0x02, &[b"HEAD"]));
        data.extend_from_slice(&build_page(7, 1, 0, 0, &[b"TAGS"]));
        let audio1 = build_page(7, 2, 960, 0, &[&[0u8; 100]]);
        let audio1_off = data.len() as u64;
        data.extend_from_slice(&audio1);
        let audio2_off = audio1_off + audio1.len() as u64;
        data.extend_from_slice(&build_page(7, 3, 1920, 0x04, &[&[0u8; 100]]));

        let mut stream = MemoryStream::new(data);
        let index = scan_pages(&mut stream, 0).unwrap();

        assert_eq!(index.last_granule, 1920);
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].offset, audio1_off);
        assert_eq!(index.entries[0].start_granule, 0);
        assert_eq!(index.entries[1].offset, audio2_off);
        assert_eq!(index.entries[1].start_granule, 960);

        // Landing selection.
        assert_eq!(index.landing(500, 0).unwrap().offset, audio1_off);
        assert_eq!(index.landing(1500, 0).unwrap().offset, audio2_off);
        assert_eq!(index.landing(1500, 1).unwrap().offset, audio1_off);
    }
}
