//! End-to-end demux/decode tests over synthetic files.
//!
//! Each test writes a small container to disk, resolves it through the
//! public registry, and checks the decoded output against the samples
//! that went in.

use std::io::Write;

use tonearm::audio::{codec, input, OpenMode, Packet};
use tonearm::uri::Uri;

fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> Uri {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create fixture");
    file.write_all(data).expect("write fixture");
    Uri::from_file_path(path.to_str().expect("utf-8 path")).expect("fixture URI")
}

/// Mono 16-bit big-endian AU file.
fn build_au(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b".snd");
    out.extend_from_slice(&24u32.to_be_bytes()); // data offset
    out.extend_from_slice(&((samples.len() * 2) as u32).to_be_bytes());
    out.extend_from_slice(&3u32.to_be_bytes()); // 16-bit linear PCM
    out.extend_from_slice(&sample_rate.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes()); // channels
    for sample in samples {
        out.extend_from_slice(&sample.to_be_bytes());
    }
    out
}

/// Mono 16-bit AIFF file at 44.1 kHz.
fn build_aiff(samples: &[i16]) -> Vec<u8> {
    let data_len = samples.len() * 2;
    let ssnd_len = 8 + data_len;

    let mut chunks = Vec::new();
    chunks.extend_from_slice(b"COMM");
    chunks.extend_from_slice(&18u32.to_be_bytes());
    chunks.extend_from_slice(&1u16.to_be_bytes()); // channels
    chunks.extend_from_slice(&(samples.len() as u32).to_be_bytes()); // frames
    chunks.extend_from_slice(&16u16.to_be_bytes()); // bits
    chunks.extend_from_slice(&[0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]); // 44100 Hz

    chunks.extend_from_slice(b"SSND");
    chunks.extend_from_slice(&(ssnd_len as u32).to_be_bytes());
    chunks.extend_from_slice(&0u32.to_be_bytes()); // offset
    chunks.extend_from_slice(&0u32.to_be_bytes()); // block size
    for sample in samples {
        chunks.extend_from_slice(&sample.to_be_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"FORM");
    out.extend_from_slice(&((4 + chunks.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"AIFF");
    out.extend_from_slice(&chunks);
    out
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i as i16).wrapping_mul(3)).collect()
}

fn collect_samples(input: &mut dyn input::Input) -> Vec<f32> {
    let mut pkt = Packet::new();
    let mut all = Vec::new();
    loop {
        input.read(&mut pkt).expect("read packet");
        if pkt.is_empty() {
            break;
        }
        // Every packet satisfies the size/layout invariant.
        assert_eq!(pkt.len(), pkt.frames() * pkt.channels() as usize);
        assert_eq!(pkt.channels(), pkt.channel_layout().count_ones());
        all.extend_from_slice(pkt.samples());
    }
    all
}

#[test]
fn au_decodes_to_the_written_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let samples = ramp(4_000);
    let location = write_temp(&dir, "tone.au", &build_au(&samples, 8_000));

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");

    let info = input.info(0).expect("info");
    assert_eq!(info.frames, samples.len() as u64);
    assert_eq!(info.sample_rate, 8_000);
    assert_eq!(info.channels, 1);
    assert_eq!(info.codec_id, codec::LPCM);
    assert_eq!(info.props.get("container").unwrap(), "AU");

    let decoded = collect_samples(input.as_mut());
    assert_eq!(decoded.len(), samples.len());
    for (got, want) in decoded.iter().zip(&samples) {
        assert!((got - f32::from(*want) / 32_768.0).abs() < 1e-6);
    }
}

#[test]
fn au_seek_is_sample_accurate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let samples = ramp(4_000);
    let location = write_temp(&dir, "tone.au", &build_au(&samples, 8_000));

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");

    input.seek(1_234).expect("seek");
    let mut pkt = Packet::new();
    input.read(&mut pkt).expect("read");
    assert!(!pkt.is_empty());
    let expected = f32::from(samples[1_234]) / 32_768.0;
    assert!((pkt.samples()[0] - expected).abs() < 1e-6);

    // The remainder of the stream is exactly the tail.
    let mut total = pkt.frames();
    loop {
        input.read(&mut pkt).expect("read");
        if pkt.is_empty() {
            break;
        }
        total += pkt.frames();
    }
    assert_eq!(total, samples.len() - 1_234);
}

#[test]
fn au_total_frames_match_across_full_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    // An awkward length that does not divide the packet step.
    let samples = ramp(8_000 / 10 * 3 + 17);
    let location = write_temp(&dir, "odd.au", &build_au(&samples, 8_000));

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");
    let info = input.info(0).expect("info");
    let decoded = collect_samples(input.as_mut());
    assert_eq!(decoded.len() as u64, info.frames);
}

#[test]
fn aiff_decodes_with_extended_sample_rate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let samples = ramp(2_000);
    let location = write_temp(&dir, "tone.aiff", &build_aiff(&samples));

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");

    let info = input.info(0).expect("info");
    // The 80-bit extended-precision rate decodes to exactly 44100.
    assert_eq!(info.sample_rate, 44_100);
    assert_eq!(info.frames, samples.len() as u64);
    assert_eq!(info.props.get("container").unwrap(), "AIFF");

    let decoded = collect_samples(input.as_mut());
    assert_eq!(decoded.len(), samples.len());
    for (got, want) in decoded.iter().zip(&samples) {
        assert!((got - f32::from(*want) / 32_768.0).abs() < 1e-6);
    }
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let location = write_temp(&dir, "file.xyz", b"not audio");

    let err = input::resolve(&location, OpenMode::METADATA).unwrap_err();
    assert_eq!(err.kind, tonearm::error::ErrorKind::ProtocolNotSupported);
}

#[test]
fn wrong_content_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let location = write_temp(&dir, "file.au", b"MThd not an au file at all");

    let err = input::resolve(&location, OpenMode::METADATA).unwrap_err();
    assert_eq!(err.kind, tonearm::error::ErrorKind::InvalidDataFormat);
}
