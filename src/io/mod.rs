//! Byte-stream layer: streams, buffers, readers, and backend registry.
//!
//! A [`Stream`] is a seekable byte source addressed by URI. Backends
//! register under URI schemes; [`open`] dispatches on the scheme of the
//! requested location:
//!
//! * `file` (and scheme-less references) — local files
//! * `http` / `https` — whole-payload prefetching HTTP client
//!
//! [`Buffer`] and [`Reader`] are the in-memory companions: an owning byte
//! buffer for encoded packets and a borrowing bounds-checked cursor for
//! structured parsing.

use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::uri::Uri;

mod buffer;
mod file;
mod http;
mod memory;
mod reader;
pub(crate) mod stream;

pub use buffer::Buffer;
pub use memory::MemoryStream;
pub use reader::Reader;
pub use stream::{IoAdapter, Stream};

/// Stream open mode; flag-combinable with `|`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Mode(u32);

impl Mode {
    /// Open for reading.
    pub const IN: Mode = Mode(1 << 0);
    /// Open for writing.
    pub const OUT: Mode = Mode(1 << 1);
    /// Append to existing content.
    pub const APP: Mode = Mode(1 << 2);
    /// Truncate existing content.
    pub const TRUNC: Mode = Mode(1 << 3);
    /// No text-mode translation. Accepted for interface parity; all
    /// backends are binary.
    pub const BINARY: Mode = Mode(1 << 4);

    #[must_use]
    pub fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: Mode) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, other: Mode) -> Mode {
        Mode(self.0 | other.0)
    }
}

type StreamFactory = fn(&Uri, Mode) -> Result<Box<dyn Stream>>;

/// Scheme → backend factory table. Built before first use; read-only at
/// steady state.
static REGISTRY: LazyLock<HashMap<&'static str, StreamFactory>> = LazyLock::new(|| {
    let mut schemes: HashMap<&'static str, StreamFactory> = HashMap::new();
    schemes.insert("file", file::create);
    schemes.insert("http", http::create);
    schemes.insert("https", http::create);
    schemes
});

/// Opens a stream for `location`, dispatching on its URI scheme.
///
/// A location without a scheme is treated as a local file path.
///
/// # Errors
///
/// Fails with `protocol_not_supported` for unregistered schemes, and with
/// the backend's error for everything else.
pub fn open(location: &Uri, mode: Mode) -> Result<Box<dyn Stream>> {
    let scheme = location.scheme();
    let scheme = if scheme.is_empty() { "file" } else { scheme };

    let factory = REGISTRY.get(scheme).ok_or_else(|| {
        Error::protocol_not_supported(format!("no stream backend for scheme '{scheme}'"))
    })?;
    factory(location, mode)
}
