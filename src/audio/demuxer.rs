//! Generic demuxer protocol.
//!
//! [`Demuxer`] couples any container parser to any decoder through a
//! three-state machine:
//!
//! * **Send** — ask the parser to [`Feed::feed`] the next encoded packet
//!   and hand it to the decoder. A parser that reports end of stream
//!   sends one final empty packet so the decoder can drain.
//! * **Recv** — collect decoded frames; stay here while the decoder
//!   reports buffered output, then return to Send.
//! * **Eos** — yield empty packets indefinitely.
//!
//! After every receive, up to `priming` frames are dropped from the
//! packet's front (encoder delay, seek overshoot) and output past
//! `total_frames` is truncated from its tail — the demuxer never emits
//! more than the authoritative sample count.

use crate::audio::{decoder, CodecFormat, DecodeStatus, Decoder, Format, Packet};
use crate::error::Result;
use crate::io::Buffer;

/// Outcome of one [`Feed::feed`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeedStatus {
    /// A packet was produced; `bit_rate` updates the instantaneous rate
    /// when known.
    Packet { bit_rate: Option<u32> },
    /// The container has no more packets.
    Eos,
}

/// Downward capability a container parser supplies to the protocol:
/// produce the next encoded packet.
pub trait Feed: Send {
    /// Reads the next encoded packet into `dest`.
    ///
    /// # Errors
    ///
    /// Fails on unrecoverable stream errors; a clean end of the container
    /// is reported as [`FeedStatus::Eos`], not an error.
    fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Send,
    Recv,
    Eos,
}

/// Reusable controller connecting a container parser to a decoder.
pub struct Demuxer<P> {
    pub(crate) parser: P,
    pub(crate) format: CodecFormat,
    decoder: Option<Box<dyn Decoder>>,
    total_frames: u64,
    instant_bit_rate: u32,
    average_bit_rate: u32,
    rdbuf: Buffer,
    priming: u64,
    pts: u64,
    encoder_delay: u32,
    state: State,
}

impl<P: Feed> Demuxer<P> {
    /// Creates a demuxer in the metadata-only configuration (no decoder).
    pub fn new(parser: P, format: CodecFormat) -> Self {
        Self {
            parser,
            format,
            decoder: None,
            total_frames: 0,
            instant_bit_rate: 0,
            average_bit_rate: 0,
            rdbuf: Buffer::new(),
            priming: 0,
            pts: 0,
            encoder_delay: 0,
            state: State::Send,
        }
    }

    /// Resolves and installs the decoder for the current codec format.
    ///
    /// The decoder may refine the format (channel layout, sample rate);
    /// priming is recomputed from its intrinsic delay.
    ///
    /// # Errors
    ///
    /// Fails with `protocol_not_supported` when no decoder is registered
    /// for the codec.
    pub fn resolve_decoder(&mut self) -> Result<()> {
        let decoder = decoder::resolve(&mut self.format)?;
        self.decoder = Some(decoder);
        self.reset_priming(0);
        Ok(())
    }

    #[must_use]
    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut P {
        &mut self.parser
    }

    #[must_use]
    pub fn codec_format(&self) -> &CodecFormat {
        &self.format
    }

    pub fn codec_format_mut(&mut self) -> &mut CodecFormat {
        &mut self.format
    }

    /// The decoded stream shape.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format.to_format()
    }

    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Installs the authoritative sample count; output is clamped to it.
    pub fn set_total_frames(&mut self, frames: u64) {
        self.total_frames = frames;
    }

    /// Installs the container-declared encoder delay (frames to drop at
    /// decode start).
    pub fn set_encoder_delay(&mut self, frames: u32) {
        self.encoder_delay = frames;
        self.reset_priming(0);
    }

    #[must_use]
    pub fn average_bit_rate(&self) -> u32 {
        self.average_bit_rate
    }

    pub fn set_average_bit_rate(&mut self, bit_rate: u32) {
        self.average_bit_rate = bit_rate;
        if self.instant_bit_rate == 0 {
            self.instant_bit_rate = bit_rate;
        }
    }

    /// Produces the next non-empty packet, or an empty one at end of
    /// stream.
    ///
    /// Without a decoder (metadata-only open) every read yields an empty
    /// packet.
    ///
    /// # Errors
    ///
    /// Propagates parser and decoder failures.
    pub fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        pkt.clear();
        if self.decoder.is_none() {
            return Ok(());
        }

        loop {
            if self.state == State::Eos {
                return Ok(());
            }

            if self.state == State::Send {
                match self.parser.feed(&mut self.rdbuf)? {
                    FeedStatus::Packet { bit_rate } => {
                        if let Some(rate) = bit_rate {
                            self.instant_bit_rate = rate;
                        }
                        self.state = State::Recv;
                    }
                    FeedStatus::Eos => {
                        self.rdbuf.clear();
                        self.state = State::Eos;
                        self.instant_bit_rate = self.average_bit_rate;
                    }
                }
                self.decoder
                    .as_mut()
                    .expect("decoder present")
                    .send(&self.rdbuf)?;
            }

            let status = self
                .decoder
                .as_mut()
                .expect("decoder present")
                .recv(pkt)?;
            if status != DecodeStatus::Incomplete && self.state == State::Recv {
                self.state = State::Send;
            }

            if self.priming != 0 {
                let drop = self.priming.min(pkt.frames() as u64);
                self.priming -= drop;
                pkt.pop_front(drop as usize * pkt.channels() as usize);
            }

            self.pts += pkt.frames() as u64;
            if self.pts > self.total_frames {
                let excess = (self.pts - self.total_frames) as usize;
                pkt.pop_back(excess * pkt.channels() as usize);
                self.pts = self.total_frames;
                self.state = State::Eos;
            }

            if !pkt.is_empty() {
                break;
            }
        }

        pkt.set_bit_rate(self.instant_bit_rate);
        Ok(())
    }

    /// Resets the protocol for a seek.
    ///
    /// `target` is the output frame position the caller requested;
    /// `extra_offset` is how many frames before it the parser actually
    /// landed (e.g. a seek into the middle of a packet). The decoder is
    /// flushed and priming rebuilt from its intrinsic delay, the encoder
    /// delay, and the landing offset.
    pub fn set_seek_target(&mut self, target: u64, extra_offset: u64) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        self.state = State::Send;
        self.pts = target;
        self.reset_priming(extra_offset);
    }

    fn reset_priming(&mut self, extra_offset: u64) {
        let decoder_delay = self
            .decoder
            .as_ref()
            .map_or(0, |decoder| decoder.decoder_delay());
        self.priming = u64::from(decoder_delay) + u64::from(self.encoder_delay) + extra_offset;
    }

    #[cfg(test)]
    pub(crate) fn install_decoder(&mut self, decoder: Box<dyn Decoder>) {
        self.decoder = Some(decoder);
        self.reset_priming(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    /// Parser producing `packets` dummy packets of four bytes each.
    struct FakeParser {
        packets: u32,
        produced: u32,
    }

    impl Feed for FakeParser {
        fn feed(&mut self, dest: &mut Buffer) -> Result<FeedStatus> {
            if self.produced == self.packets {
                return Ok(FeedStatus::Eos);
            }
            self.produced += 1;
            dest.assign_slice(&[0, 1, 2, 3]);
            Ok(FeedStatus::Packet {
                bit_rate: Some(128_000),
            })
        }
    }

    /// Decoder emitting a fixed number of stereo frames per packet, with
    /// a configurable intrinsic delay. Sample values count up so tests
    /// can check exactly which frames were trimmed.
    struct FakeDecoder {
        frames_per_packet: u32,
        delay: u32,
        next_sample: f32,
        pending: bool,
    }

    impl Decoder for FakeDecoder {
        fn send(&mut self, buf: &Buffer) -> Result<()> {
            self.pending = !buf.is_empty();
            Ok(())
        }

        fn recv(&mut self, pkt: &mut Packet) -> Result<DecodeStatus> {
            pkt.clear();
            pkt.set_channel_layout(layout::STEREO);
            if self.pending {
                self.pending = false;
                let samples: Vec<f32> = (0..self.frames_per_packet * 2)
                    .map(|_| {
                        let s = self.next_sample;
                        self.next_sample += 1.0;
                        s
                    })
                    .collect();
                pkt.assign(&samples);
            }
            Ok(DecodeStatus::Complete)
        }

        fn flush(&mut self) {
            self.pending = false;
        }

        fn decoder_delay(&self) -> u32 {
            self.delay
        }
    }

    fn demuxer(
        packets: u32,
        frames_per_packet: u32,
        delay: u32,
        encoder_delay: u32,
        total_frames: u64,
    ) -> Demuxer<FakeParser> {
        let mut demuxer = Demuxer::new(
            FakeParser {
                packets,
                produced: 0,
            },
            CodecFormat::default(),
        );
        demuxer.install_decoder(Box::new(FakeDecoder {
            frames_per_packet,
            delay,
            next_sample: 0.0,
            pending: false,
        }));
        demuxer.set_encoder_delay(encoder_delay);
        demuxer.set_total_frames(total_frames);
        demuxer.set_average_bit_rate(96_000);
        demuxer
    }

    fn drain(demuxer: &mut Demuxer<FakeParser>) -> (u64, Vec<f32>) {
        let mut pkt = Packet::new();
        let mut frames = 0;
        let mut first = Vec::new();
        loop {
            demuxer.read(&mut pkt).unwrap();
            if pkt.is_empty() {
                break;
            }
            if first.is_empty() {
                first = pkt.samples().to_vec();
            }
            frames += pkt.frames() as u64;
        }
        (frames, first)
    }

    #[test]
    fn emits_exactly_total_frames() {
        // 10 packets x 100 frames, priming 30, total 940: the sum of all
        // emitted frames must equal the clamp exactly.
        let mut demuxer = demuxer(10, 100, 0, 30, 940);
        let (frames, first) = drain(&mut demuxer);
        assert_eq!(frames, 940);
        // The first emitted sample sits 30 stereo frames into the decode.
        assert_eq!(first[0], 60.0);
    }

    #[test]
    fn priming_spans_multiple_packets() {
        // Priming larger than one packet: the first two packets vanish
        // entirely and the third is partially trimmed.
        let mut demuxer = demuxer(5, 100, 150, 100, 250);
        let (frames, first) = drain(&mut demuxer);
        assert_eq!(frames, 250);
        assert_eq!(first[0], 500.0); // frame 250, stereo
    }

    #[test]
    fn clamp_on_final_partial_packet() {
        // EOS arrives while the clamp still truncates the tail packet.
        let mut demuxer = demuxer(3, 100, 0, 0, 250);
        let (frames, _) = drain(&mut demuxer);
        assert_eq!(frames, 250);
    }

    #[test]
    fn empty_after_eos_stays_empty() {
        let mut demuxer = demuxer(1, 10, 0, 0, 10);
        let (frames, _) = drain(&mut demuxer);
        assert_eq!(frames, 10);

        let mut pkt = Packet::new();
        for _ in 0..3 {
            demuxer.read(&mut pkt).unwrap();
            assert!(pkt.is_empty());
        }
    }

    #[test]
    fn seek_reprimes() {
        let mut demuxer = demuxer(10, 100, 20, 0, 1_000);
        let mut pkt = Packet::new();
        demuxer.read(&mut pkt).unwrap();

        // Land 40 frames before the requested position; the protocol
        // must drop decoder delay + landing offset.
        demuxer.set_seek_target(500, 40);
        demuxer.read(&mut pkt).unwrap();
        assert_eq!(pkt.frames(), 40); // 100 - (20 + 40)
    }

    #[test]
    fn metadata_only_reads_are_empty() {
        let mut demuxer = Demuxer::new(
            FakeParser {
                packets: 3,
                produced: 0,
            },
            CodecFormat::default(),
        );
        let mut pkt = Packet::new();
        demuxer.read(&mut pkt).unwrap();
        assert!(pkt.is_empty());
    }

    #[test]
    fn bit_rate_attached_to_packets() {
        let mut demuxer = demuxer(2, 50, 0, 0, 100);
        let mut pkt = Packet::new();
        demuxer.read(&mut pkt).unwrap();
        assert_eq!(pkt.bit_rate(), 128_000);
    }
}
