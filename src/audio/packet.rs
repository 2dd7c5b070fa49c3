//! Decoded audio packets.
//!
//! A [`Packet`] is the unit of decoded audio crossing the decoder→caller
//! boundary: a dynamically-sized block of 32-bit floats interleaved by
//! channel, plus the bit rate of the compressed data it was decoded from
//! and the channel layout it is laid out in.
//!
//! Invariant: `len() == frames() × channels()`.

/// Interleaved `f32` sample packet.
#[derive(Clone, Debug, Default)]
pub struct Packet {
    data: Vec<f32>,
    bit_rate: u32,
    channels: u32,
    channel_layout: u32,
}

impl Packet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total sample count (frames × channels).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[must_use]
    pub fn channel_layout(&self) -> u32 {
        self.channel_layout
    }

    #[must_use]
    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    /// Frame count; zero when no channel layout has been set.
    #[must_use]
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Empties the packet and resets the bit rate. The channel layout is
    /// retained.
    pub fn clear(&mut self) {
        self.data.clear();
        self.bit_rate = 0;
    }

    /// Resizes to `n` samples, zero-filling any new tail.
    pub fn resize(&mut self, n: usize) {
        self.data.resize(n, 0.0);
    }

    /// Drops the first `n` samples, shifting the remainder down.
    ///
    /// Used to trim encoder delay from the front of a decoded packet.
    pub fn pop_front(&mut self, n: usize) {
        if n >= self.data.len() {
            self.data.clear();
        } else if n != 0 {
            self.data.copy_within(n.., 0);
            let len = self.data.len() - n;
            self.data.truncate(len);
        }
    }

    /// Drops the last `n` samples.
    ///
    /// Used to clamp output past the authoritative total frame count.
    pub fn pop_back(&mut self, n: usize) {
        let len = self.data.len().saturating_sub(n);
        self.data.truncate(len);
    }

    /// Replaces the content with a copy of interleaved `samples`.
    pub fn assign(&mut self, samples: &[f32]) {
        self.data.clear();
        self.data.extend_from_slice(samples);
    }

    /// Appends a copy of interleaved `samples`.
    pub fn append(&mut self, samples: &[f32]) {
        self.data.extend_from_slice(samples);
    }

    /// Replaces the content by interleaving `frames` frames from
    /// channel-separated planes.
    ///
    /// `planes` must contain one slice of at least `frames` samples per
    /// channel of the current layout.
    pub fn fill_planar(&mut self, planes: &[&[f32]], frames: usize) {
        self.data.clear();
        self.append_planar(planes, frames);
    }

    /// Appends `frames` frames interleaved from channel-separated planes.
    pub fn append_planar(&mut self, planes: &[&[f32]], frames: usize) {
        debug_assert_eq!(planes.len(), self.channels as usize);
        self.data.reserve(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                self.data.push(plane[frame]);
            }
        }
    }

    /// Sets the channel layout; the channel count follows from its
    /// popcount.
    pub fn set_channel_layout(&mut self, channel_layout: u32) {
        if self.channel_layout != channel_layout {
            self.channel_layout = channel_layout;
            self.channels = channel_layout.count_ones();
        }
    }

    /// Sets the channel layout with an explicit count.
    ///
    /// # Panics
    ///
    /// In debug builds, panics when `channels` does not match the layout
    /// popcount of a nonzero layout.
    pub fn set_channel_layout_n(&mut self, channel_layout: u32, channels: u32) {
        debug_assert!(channel_layout == 0 || channels == channel_layout.count_ones());
        self.channel_layout = channel_layout;
        self.channels = channels;
    }

    pub fn set_bit_rate(&mut self, bit_rate: u32) {
        self.bit_rate = bit_rate;
    }

    pub fn swap(&mut self, other: &mut Packet) {
        std::mem::swap(self, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layout;

    #[test]
    fn pop_front_then_append() {
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::STEREO);
        pkt.assign(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        pkt.pop_front(2); // drop one stereo frame
        pkt.append(&[7.0, 8.0]);

        assert_eq!(pkt.samples(), &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(pkt.frames(), 3);
    }

    #[test]
    fn frames_follow_layout() {
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::L5_1);
        pkt.resize(12);
        assert_eq!(pkt.channels(), 6);
        assert_eq!(pkt.frames(), 2);
        assert_eq!(pkt.len(), pkt.frames() * pkt.channels() as usize);
    }

    #[test]
    fn planar_interleaving() {
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::STEREO);

        let left = [1.0f32, 3.0, 5.0];
        let right = [2.0f32, 4.0, 6.0];
        pkt.fill_planar(&[&left, &right], 3);
        assert_eq!(pkt.samples(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        pkt.append_planar(&[&[7.0][..], &[8.0][..]], 1);
        assert_eq!(pkt.frames(), 4);
        assert_eq!(&pkt.samples()[6..], &[7.0, 8.0]);
    }

    #[test]
    fn pop_back_clamps() {
        let mut pkt = Packet::new();
        pkt.set_channel_layout(layout::MONO);
        pkt.assign(&[1.0, 2.0, 3.0]);
        pkt.pop_back(2);
        assert_eq!(pkt.samples(), &[1.0]);
        pkt.pop_back(9);
        assert!(pkt.is_empty());
    }
}
