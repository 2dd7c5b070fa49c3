//! Container demuxers.
//!
//! One module per container format. Each announces the file extensions
//! it serves and a factory; the registrations listed here seed the input
//! registry before the first lookup.

use crate::audio::input::Factory;

pub mod adts;
pub mod aiff;
pub mod au;
pub mod flac;
pub mod hls;
pub mod m3u;
pub mod mac;
pub mod mpa;
pub mod ogg;
pub(crate) mod oggutil;
pub mod opus;
pub mod tta;
pub mod vorbis;

#[cfg(feature = "musepack")]
pub mod musepack;
#[cfg(feature = "optimfrog")]
pub mod optimfrog;
#[cfg(feature = "wavpack")]
pub mod wavpack;

/// All container registrations compiled into this build.
///
/// `.ogg`/`.oga` route through the sniffing dispatcher, which selects
/// the Opus, Vorbis, or FLAC demuxer by the first packet's magic.
pub(crate) fn registrations() -> Vec<(&'static [&'static str], Factory)> {
    let mut list: Vec<(&'static [&'static str], Factory)> = vec![
        (aiff::EXTENSIONS, aiff::create),
        (au::EXTENSIONS, au::create),
        (mac::EXTENSIONS, mac::create),
        (mpa::EXTENSIONS, mpa::create),
        (adts::EXTENSIONS, adts::create),
        (tta::EXTENSIONS, tta::create),
        (opus::EXTENSIONS, opus::create),
        (flac::EXTENSIONS, flac::create),
        (ogg::EXTENSIONS, ogg::create),
        (hls::EXTENSIONS, hls::create),
    ];

    #[cfg(feature = "wavpack")]
    list.push((wavpack::EXTENSIONS, wavpack::create));
    #[cfg(feature = "musepack")]
    list.push((musepack::EXTENSIONS, musepack::create));
    #[cfg(feature = "optimfrog")]
    list.push((optimfrog::EXTENSIONS, optimfrog::create));

    list
}
