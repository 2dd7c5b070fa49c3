//! Metadata-only opens: tag aggregation, duration derivation, gapless
//! headers, and embedded images — no decoder instantiation.

use std::io::Write;

use tonearm::audio::{codec, input, OpenMode};
use tonearm::media::ImageType;
use tonearm::uri::Uri;

fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> Uri {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create fixture");
    file.write_all(data).expect("write fixture");
    Uri::from_file_path(path.to_str().expect("utf-8 path")).expect("fixture URI")
}

fn synchsafe(x: u32) -> [u8; 4] {
    [
        ((x >> 21) & 0x7f) as u8,
        ((x >> 14) & 0x7f) as u8,
        ((x >> 7) & 0x7f) as u8,
        (x & 0x7f) as u8,
    ]
}

fn id3v2_tag(frames: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, content) in frames {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(content.len() as u32).to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(content);
    }

    let mut tag = Vec::new();
    tag.extend_from_slice(b"ID3\x03\x00\x00");
    tag.extend_from_slice(&synchsafe(body.len() as u32));
    tag.extend_from_slice(&body);
    tag
}

fn text_frame(value: &str) -> Vec<u8> {
    let mut content = vec![3u8]; // UTF-8
    content.extend_from_slice(value.as_bytes());
    content
}

/// One CBR MPEG-1 Layer III frame: 128 kbit/s, 44.1 kHz, stereo.
fn mp3_frame() -> Vec<u8> {
    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&0xfffb_9000u32.to_be_bytes());
    frame
}

#[test]
fn mp3_metadata_open_reads_tags_and_duration() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut data = id3v2_tag(&[
        (b"TIT2", text_frame("Metadata Song")),
        (b"TPE1", text_frame("Somebody")),
    ]);
    for _ in 0..5 {
        data.extend_from_slice(&mp3_frame());
    }
    let location = write_temp(&dir, "tagged.mp3", &data);

    // Metadata-only: no decoder is instantiated.
    let mut input = input::resolve(&location, OpenMode::METADATA).expect("resolve");
    let info = input.info(0).expect("info");

    assert_eq!(info.codec_id, codec::MPEG_LAYER3);
    assert_eq!(info.sample_rate, 44_100);
    assert_eq!(info.channels, 2);
    // No VBR header: the duration comes from the frame scan.
    assert_eq!(info.frames, 5 * 1152);
    assert_eq!(info.props.get("container").unwrap(), "MPEG 1");
    assert_eq!(info.tags.get("title").unwrap(), "Metadata Song");
    assert_eq!(info.tags.get("artist").unwrap(), "Somebody");
    assert_eq!(info.tags.get("tag type").unwrap(), "ID3v2.3");

    // Reads in metadata mode yield only empty packets.
    let mut pkt = tonearm::audio::Packet::new();
    input.read(&mut pkt).expect("read");
    assert!(pkt.is_empty());
}

#[test]
fn mp3_itunsmpb_declares_the_total() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut comment = vec![0u8]; // Latin-1
    comment.extend_from_slice(b"eng");
    comment.extend_from_slice(b"iTunSMPB\0");
    comment.extend_from_slice(b" 00000000 00000840 00000540 00000000000B45C0");

    let mut data = id3v2_tag(&[(b"COMM", comment)]);
    for _ in 0..3 {
        data.extend_from_slice(&mp3_frame());
    }
    let location = write_temp(&dir, "gapless.mp3", &data);

    let mut input = input::resolve(&location, OpenMode::METADATA).expect("resolve");
    let info = input.info(0).expect("info");

    // The declared total (0xB45C0) wins over the frame scan.
    assert_eq!(info.frames, 0xB45C0);
}

#[test]
fn mp3_cover_art_extraction() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut apic = vec![0u8]; // Latin-1
    apic.extend_from_slice(b"image/png\0");
    apic.push(3); // front cover
    apic.extend_from_slice(b"front\0");
    apic.extend_from_slice(&[0x89, b'P', b'N', b'G', 1, 2, 3]);

    let mut data = id3v2_tag(&[(b"APIC", apic), (b"TIT2", text_frame("With Art"))]);
    data.extend_from_slice(&mp3_frame());
    let location = write_temp(&dir, "art.mp3", &data);

    let mut input =
        input::resolve(&location, OpenMode::METADATA | OpenMode::PICTURES).expect("resolve");

    let image = input
        .image(ImageType::FrontCover)
        .expect("image read")
        .expect("image present");
    assert_eq!(image.mime_type().as_str(), "image/png");
    assert_eq!(image.data(), &[0x89, b'P', b'N', b'G', 1, 2, 3]);

    assert!(input.image(ImageType::BackCover).expect("image read").is_none());
}

#[test]
fn mp3_trailing_id3v1_is_used_without_id3v2() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut data = Vec::new();
    for _ in 0..2 {
        data.extend_from_slice(&mp3_frame());
    }
    let mut v1 = vec![0u8; 128];
    v1[..3].copy_from_slice(b"TAG");
    v1[3..3 + 8].copy_from_slice(b"Old Song");
    v1[127] = 17; // Rock
    data.extend_from_slice(&v1);

    let location = write_temp(&dir, "legacy.mp3", &data);
    let mut input = input::resolve(&location, OpenMode::METADATA).expect("resolve");
    let info = input.info(0).expect("info");

    assert_eq!(info.tags.get("title").unwrap(), "Old Song");
    assert_eq!(info.tags.get("genre").unwrap(), "Rock");
    assert_eq!(info.tags.get("tag type").unwrap(), "ID3v1");
    // The trailing tag is excluded from the frame scan.
    assert_eq!(info.frames, 2 * 1152);
}

/// Reflected CRC-32 (the TTA flavor).
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

#[test]
fn tta_metadata_with_ape_tag() {
    let dir = tempfile::tempdir().expect("tempdir");

    // Header: TTA1, flags 1, mono, 16-bit, 44.1 kHz, 100000 samples.
    let mut header = Vec::new();
    header.extend_from_slice(b"TTA1");
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(&44_100u32.to_le_bytes());
    header.extend_from_slice(&100_000u32.to_le_bytes());
    let head_crc = crc32(&header);
    header.extend_from_slice(&head_crc.to_le_bytes());

    // Three packets cover 100000 samples at 46080 frames per packet.
    let packet_sizes = [321u32, 123u32, 77u32];
    let mut table = Vec::new();
    for size in packet_sizes {
        table.extend_from_slice(&size.to_le_bytes());
    }
    let table_crc = crc32(&table);

    let mut data = header;
    data.extend_from_slice(&table);
    data.extend_from_slice(&table_crc.to_le_bytes());
    data.resize(data.len() + (321 + 123 + 77), 0x55); // packet payloads

    // Trailing APEv2 tag.
    let mut item = Vec::new();
    item.extend_from_slice(&5u32.to_le_bytes());
    item.extend_from_slice(&0u32.to_le_bytes());
    item.extend_from_slice(b"Title\0");
    item.extend_from_slice(b"Pure!");
    let tag_size = (item.len() + 32) as u32;
    data.extend_from_slice(&item);
    data.extend_from_slice(b"APETAGEX");
    data.extend_from_slice(&2000u32.to_le_bytes());
    data.extend_from_slice(&tag_size.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());

    let location = write_temp(&dir, "pure.tta", &data);
    let mut input = input::resolve(&location, OpenMode::METADATA).expect("resolve");
    let info = input.info(0).expect("info");

    assert_eq!(info.codec_id, codec::TTA);
    assert_eq!(info.frames, 100_000);
    assert_eq!(info.sample_rate, 44_100);
    assert_eq!(info.bits_per_sample, 16);
    assert_eq!(info.tags.get("title").unwrap(), "Pure!");
    assert_eq!(info.tags.get("tag type").unwrap(), "APEv2");
}

#[test]
fn tta_header_crc_mismatch_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut header = Vec::new();
    header.extend_from_slice(b"TTA1");
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(&44_100u32.to_le_bytes());
    header.extend_from_slice(&100_000u32.to_le_bytes());
    header.extend_from_slice(&0xdead_beefu32.to_le_bytes()); // wrong CRC

    let location = write_temp(&dir, "broken.tta", &header);
    let err = input::resolve(&location, OpenMode::METADATA).unwrap_err();
    assert_eq!(err.kind, tonearm::error::ErrorKind::Failure);
}
