//! Multi-format audio demultiplexing and decoding pipeline.
//!
//! **tonearm** turns a URI-addressed byte stream into a uniform sequence
//! of decoded PCM packets — interleaved 32-bit floats — while preserving
//! embedded metadata, cover art, and random-access seeking. It provides:
//!
//! # Core Features
//!
//! * **Format Support**: AIFF/AIFF-C, AU, Monkey's Audio, FLAC (native
//!   and Ogg), MPEG audio Layers I–III, ADTS/AAC, TrueAudio, Ogg Opus,
//!   Ogg Vorbis, and HLS playlists; WavPack, Musepack, and OptimFROG
//!   behind cargo features
//! * **Metadata Aggregation**: ID3v1, ID3v2.2/2.3/2.4, APEv1/v2, and
//!   Vorbis comments merged into one canonical-key dictionary
//! * **Gapless Playback**: encoder-delay priming and total-frame
//!   clamping (LAME/Xing, VBRI, iTunSMPB, Opus pre-skip)
//! * **Byte Streams**: local files and prefetching HTTP(S), addressed
//!   by RFC 3986 URIs
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! * **Byte Streams**
//!   - [`io`]: stream trait, backends, buffers, bounds-checked readers
//!   - [`uri`]: RFC 3986 parsing, normalization, and resolution
//!
//! * **Audio Pipeline**
//!   - [`audio`]: formats, packets, the demuxer protocol, registries
//!   - [`demux`]: one demuxer per container format
//!   - [`codec`]: adapters from external decoders to the decoder
//!     contract
//!
//! * **Metadata**
//!   - [`media`]: dictionaries, canonical tag keys, tag readers, images
//!   - [`istr`]: interned strings and legacy text encodings
//!
//! * **Utilities**
//!   - [`error`]: error types and handling
//!   - [`util`]: overflow-free arithmetic helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use tonearm::audio::{input, OpenMode, Packet};
//! use tonearm::uri::Uri;
//!
//! fn example() -> tonearm::error::Result<()> {
//!     let location = Uri::from_file_path("/music/track.flac")?;
//!     let mut input = input::resolve(&location, OpenMode::PLAYBACK | OpenMode::METADATA)?;
//!
//!     let info = input.info(0)?;
//!     println!("{} frames @ {} Hz", info.frames, info.sample_rate);
//!
//!     let mut pkt = Packet::new();
//!     loop {
//!         input.read(&mut pkt)?;
//!         if pkt.is_empty() {
//!             break; // end of stream
//!         }
//!         // Process interleaved f32 samples...
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result). A bad frame in
//! the middle of a stream is skipped, not fatal; the normal end of a
//! stream is an empty packet, not an error.
//!
//! # Concurrency
//!
//! Each open input is single-threaded: the caller drives `read`/`seek`
//! from one playback thread. Multiple inputs may exist concurrently.
//! The string intern pool and the format registries are the only
//! process-wide state.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod audio;
pub mod codec;
pub mod demux;
pub mod error;
pub mod io;
pub mod istr;
pub mod media;
pub mod uri;
pub mod util;

pub use istr::IStr;
pub use uri::Uri;
