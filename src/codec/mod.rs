//! Codec decoder adapters.
//!
//! Each module adapts one external decoder to the [`crate::audio::Decoder`]
//! contract and announces which codec identifiers it serves. The
//! registrations listed here seed the codec registry before the first
//! lookup.

use crate::audio::decoder::Factory;

pub mod aac;
pub mod flac;
pub mod mpa;
pub mod opus;
pub mod pcm;
pub mod vorbis;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

/// All codec registrations compiled into this build.
pub(crate) fn registrations() -> Vec<(u32, Factory)> {
    let mut list: Vec<(u32, Factory)> = Vec::new();

    for &id in pcm::CODECS {
        list.push((id, pcm::create));
    }
    for &id in mpa::CODECS {
        list.push((id, mpa::create));
    }
    for &id in aac::CODECS {
        list.push((id, aac::create));
    }
    for &id in flac::CODECS {
        list.push((id, flac::create));
    }
    for &id in vorbis::CODECS {
        list.push((id, vorbis::create));
    }
    for &id in opus::CODECS {
        list.push((id, opus::create));
    }

    #[cfg(feature = "ffmpeg")]
    for &id in ffmpeg::CODECS {
        list.push((id, ffmpeg::create));
    }

    list
}
