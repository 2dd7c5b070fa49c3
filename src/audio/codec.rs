//! Codec identifiers.
//!
//! Codecs are identified by a four-character tag packed big-endian into a
//! `u32`, matching the convention of most container formats.

/// Packs a four-character tag.
#[must_use]
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

pub const AAC_LC: u32 = fourcc(b"aac ");
pub const ALAW: u32 = fourcc(b"alaw");
pub const ULAW: u32 = fourcc(b"ulaw");
pub const LPCM: u32 = fourcc(b"lpcm");

pub const ADPCM_G722: u32 = fourcc(b"g722");
pub const ADPCM_IMA_QT: u32 = fourcc(b"ima4");
pub const GSM: u32 = fourcc(b"gsm ");
pub const MACE3: u32 = fourcc(b"mac3");
pub const MACE6: u32 = fourcc(b"mac6");
pub const QCELP: u32 = fourcc(b"qclp");
pub const QDESIGN: u32 = fourcc(b"qdmc");
pub const QDESIGN2: u32 = fourcc(b"qdm2");

pub const FLAC: u32 = fourcc(b"flac");
pub const MONKEYS_AUDIO: u32 = fourcc(b"mac ");
pub const MPEG_LAYER1: u32 = fourcc(b"mpg1");
pub const MPEG_LAYER2: u32 = fourcc(b"mpg2");
pub const MPEG_LAYER3: u32 = fourcc(b"mpg3");
pub const MUSEPACK_SV7: u32 = fourcc(b"mpc7");
pub const MUSEPACK_SV8: u32 = fourcc(b"mpc8");
pub const OPTIMFROG: u32 = fourcc(b"ofr ");
pub const OPUS: u32 = fourcc(b"opus");
pub const TTA: u32 = fourcc(b"tta ");
pub const VORBIS: u32 = fourcc(b"vorb");
pub const WAVPACK: u32 = fourcc(b"wvpk");

/// Human-readable codec name, used in `props` dictionaries.
#[must_use]
pub fn name(id: u32) -> &'static str {
    match id {
        AAC_LC => "AAC LC",
        ALAW => "A-law",
        ULAW => "µ-law",
        LPCM => "Linear PCM",
        ADPCM_G722 => "G.722 ADPCM",
        ADPCM_IMA_QT => "QuickTime IMA ADPCM",
        GSM => "GSM",
        MACE3 => "MACE 3:1",
        MACE6 => "MACE 6:1",
        QCELP => "Qualcomm PureVoice",
        QDESIGN => "QDesign Music Codec",
        QDESIGN2 => "QDesign Music Codec 2",
        FLAC => "FLAC",
        MONKEYS_AUDIO => "Monkey's Audio",
        MPEG_LAYER1 => "MP1",
        MPEG_LAYER2 => "MP2",
        MPEG_LAYER3 => "MP3",
        MUSEPACK_SV7 => "Musepack SV7",
        MUSEPACK_SV8 => "Musepack SV8",
        OPTIMFROG => "OptimFROG",
        OPUS => "Opus",
        TTA => "TTA",
        VORBIS => "Vorbis",
        WAVPACK => "WavPack",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_packs_big_endian() {
        assert_eq!(FLAC, 0x666c_6163);
        assert_eq!(name(OPUS), "Opus");
        assert_eq!(name(0), "unknown");
    }
}
