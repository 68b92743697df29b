// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A fully decoded sample, ready for playback.
///
/// The audio data is interleaved f32 and is never mutated once created. Voices
/// share a buffer through an `Arc<DecodedBuffer>`, so any number of overlapping
/// playbacks read the same memory.
pub struct DecodedBuffer {
    /// Interleaved samples, normalized to [-1.0, 1.0].
    data: Arc<[f32]>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Creates a new buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> DecodedBuffer {
        DecodedBuffer {
            data: data.into(),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the interleaved samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the sample for the given frame and channel, or silence if out of range.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.data
            .get(frame * self.channel_count as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Returns the playback duration.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}
