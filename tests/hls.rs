//! HLS playback over local playlists: variant selection, segment
//! concatenation, duration accumulation, and cross-segment seeking.

use std::io::Write;

use tonearm::audio::{input, OpenMode, Packet};
use tonearm::uri::Uri;

fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> Uri {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create fixture");
    file.write_all(data).expect("write fixture");
    Uri::from_file_path(path.to_str().expect("utf-8 path")).expect("fixture URI")
}

/// Mono 16-bit big-endian AU segment at 8 kHz.
fn build_au(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b".snd");
    out.extend_from_slice(&24u32.to_be_bytes());
    out.extend_from_slice(&((samples.len() * 2) as u32).to_be_bytes());
    out.extend_from_slice(&3u32.to_be_bytes());
    out.extend_from_slice(&8_000u32.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_be_bytes());
    }
    out
}

/// Three segments of 1.0 s, 1.0 s and 0.5 s at 8 kHz, each with a
/// distinctive sample pattern.
fn build_fixture(dir: &tempfile::TempDir) -> Uri {
    let segment_frames = [8_000usize, 8_000, 4_000];
    for (index, frames) in segment_frames.iter().enumerate() {
        let samples: Vec<i16> = (0..*frames)
            .map(|i| (index as i16 + 1) * 1000 + (i % 7) as i16)
            .collect();
        write_temp(dir, &format!("seg{index}.au"), &build_au(&samples));
    }

    write_temp(
        dir,
        "media.m3u8",
        b"#EXTM3U\n\
          #EXT-X-VERSION:3\n\
          #EXT-X-PLAYLIST-TYPE:VOD\n\
          #EXTINF:1.0,\n\
          seg0.au\n\
          #EXTINF:1.0,\n\
          seg1.au\n\
          #EXTINF:0.5,\n\
          seg2.au\n\
          #EXT-X-ENDLIST\n",
    );

    write_temp(
        dir,
        "master.m3u8",
        b"#EXTM3U\n\
          #EXT-X-STREAM-INF:BANDWIDTH=900000,CODECS=\"avc1.42e00a,mp4a.40.2\"\n\
          muxed.m3u8\n\
          #EXT-X-STREAM-INF:BANDWIDTH=128000,CODECS=\"mp4a.40.2\"\n\
          media.m3u8\n",
    )
}

#[test]
fn segments_play_back_to_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let location = build_fixture(&dir);

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");

    let format = input.format();
    assert_eq!(format.sample_rate, 8_000);
    assert_eq!(format.channels, 1);

    // 2.5 s of playlist time at 8 kHz.
    let info = input.info(0).expect("info");
    assert_eq!(info.frames, 20_000);

    let mut pkt = Packet::new();
    let mut total = 0usize;
    let mut first_of_second_segment = None;
    loop {
        input.read(&mut pkt).expect("read");
        if pkt.is_empty() {
            break;
        }
        if total < 8_000 && total + pkt.frames() > 8_000 {
            let at = 8_000 - total;
            first_of_second_segment = Some(pkt.samples()[at]);
        } else if total == 8_000 {
            first_of_second_segment = Some(pkt.samples()[0]);
        }
        total += pkt.frames();
    }
    assert_eq!(total, 20_000);

    // The second segment's pattern starts at 2000.
    let expected = 2_000.0 / 32_768.0;
    assert!((first_of_second_segment.expect("segment boundary seen") - expected).abs() < 1e-6);
}

#[test]
fn seek_crosses_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let location = build_fixture(&dir);

    let mut input =
        input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA).expect("resolve");

    // 2.25 s: lands 0.25 s into the third segment.
    input.seek(18_000).expect("seek");

    let mut pkt = Packet::new();
    input.read(&mut pkt).expect("read");
    assert!(!pkt.is_empty());

    // Segment 2 pattern: 3000 + (i % 7) with i = 2000.
    let expected = f32::from(3_000i16 + (2_000 % 7) as i16) / 32_768.0;
    assert!((pkt.samples()[0] - expected).abs() < 1e-6);

    // Reading to the end covers exactly the remaining frames.
    let mut total = pkt.frames();
    loop {
        input.read(&mut pkt).expect("read");
        if pkt.is_empty() {
            break;
        }
        total += pkt.frames();
    }
    assert_eq!(total, 2_000);
}

#[test]
fn master_without_audio_variant_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_temp(
        &dir,
        "media.m3u8",
        b"#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:1.0,\nseg0.au\n",
    );
    let location = write_temp(
        &dir,
        "video.m3u8",
        b"#EXTM3U\n\
          #EXT-X-STREAM-INF:CODECS=\"avc1.42e00a,mp4a.40.2\"\n\
          media.m3u8\n",
    );

    let err = input::resolve(&location, OpenMode::METADATA).unwrap_err();
    assert_eq!(err.kind, tonearm::error::ErrorKind::Failure);
}
