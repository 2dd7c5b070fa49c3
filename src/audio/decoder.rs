//! Decoder contract and codec registry.
//!
//! A [`Decoder`] turns encoded packets into interleaved float frames. The
//! demuxer protocol drives it in two steps: [`Decoder::send`] hands over
//! one container packet, then [`Decoder::recv`] is called until the
//! decoder reports no buffered frames remain. An empty `send` signals
//! end of stream and lets the decoder drain.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::audio::{CodecFormat, Packet};
use crate::error::{Error, Result};
use crate::io::Buffer;

/// Outcome of one [`Decoder::recv`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeStatus {
    /// The decoder has emitted everything for the current packet.
    Complete,
    /// More frames remain buffered; call `recv` again before sending.
    Incomplete,
}

/// Codec decoder contract.
pub trait Decoder: Send {
    /// Accepts one encoded packet. An empty buffer signals end of stream.
    ///
    /// # Errors
    ///
    /// Fails with the translated decoder-library error.
    fn send(&mut self, buf: &Buffer) -> Result<()>;

    /// Produces decoded frames for the most recent packet.
    ///
    /// Leaves `pkt` empty when the packet produced no output (decoder
    /// priming, drain exhausted).
    ///
    /// # Errors
    ///
    /// Fails with the translated decoder-library error.
    fn recv(&mut self, pkt: &mut Packet) -> Result<DecodeStatus>;

    /// Discards all internal state (seek support).
    fn flush(&mut self);

    /// Frames of intrinsic decoder start-up delay to trim, in addition
    /// to any container-declared encoder delay.
    fn decoder_delay(&self) -> u32 {
        0
    }
}

/// Factory signature for codec adapters.
///
/// The factory may refine the format in place — notably
/// `channel_layout` and `sample_rate` when the container left them unset
/// and the codec configuration determines them.
pub type Factory = fn(&mut CodecFormat) -> Result<Box<dyn Decoder>>;

/// Codec id → factory table. Populated before first use from the codec
/// adapter modules; read-only at steady state.
static REGISTRY: LazyLock<HashMap<u32, Factory>> = LazyLock::new(|| {
    let mut codecs = HashMap::new();
    for (id, factory) in crate::codec::registrations() {
        // Later registrations win; duplicates are a programming error.
        codecs.insert(id, factory);
    }
    codecs
});

/// Resolves a decoder for the given codec format.
///
/// # Errors
///
/// Fails with `protocol_not_supported` when no adapter is registered for
/// `fmt.codec_id`, or with the factory's error when construction fails.
pub fn resolve(fmt: &mut CodecFormat) -> Result<Box<dyn Decoder>> {
    let factory = REGISTRY.get(&fmt.codec_id).ok_or_else(|| {
        Error::protocol_not_supported(format!(
            "no decoder registered for codec '{}'",
            crate::audio::codec::name(fmt.codec_id)
        ))
    })?;
    factory(fmt)
}
