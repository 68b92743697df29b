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
// Core audio mixing logic that can be used by both CPAL and test implementations
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::buffer::DecodedBuffer;
use super::VoiceId;

/// A one-shot voice: a decoded buffer bound to a start position on the mixer clock.
pub struct ActiveVoice {
    /// Unique ID for this voice.
    pub id: VoiceId,
    /// The buffer being played. Shared with the sample cache and other voices.
    pub buffer: Arc<DecodedBuffer>,
    /// The clock position (in frames) at which playback begins.
    pub start_at_sample: u64,
    /// Next frame of the buffer to render.
    position: usize,
}

impl ActiveVoice {
    /// Creates a new voice that starts at the given clock position.
    pub fn new(id: VoiceId, buffer: Arc<DecodedBuffer>, start_at_sample: u64) -> ActiveVoice {
        ActiveVoice {
            id,
            buffer,
            start_at_sample,
            position: 0,
        }
    }

    fn is_finished(&self) -> bool {
        self.position >= self.buffer.frames()
    }
}

/// Sums active voices into an interleaved output stream.
///
/// The number of frames rendered so far is the audio clock. It is published through
/// an atomic so other threads can read the current time without touching the voices.
pub struct AudioMixer {
    /// Voices waiting to start or currently playing.
    voices: Vec<ActiveVoice>,
    /// Number of output channels.
    num_channels: u16,
    /// Sample rate.
    sample_rate: u32,
    /// Frames rendered since the mixer was created.
    current_sample: Arc<AtomicU64>,
}

impl AudioMixer {
    /// Creates a new audio mixer.
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            voices: Vec::new(),
            num_channels: num_channels.max(1),
            sample_rate,
            current_sample: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a handle to the mixer clock, in frames.
    pub fn clock(&self) -> Arc<AtomicU64> {
        self.current_sample.clone()
    }

    /// Returns the current clock position in frames.
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    /// Adds a voice. Voices whose start position has already passed begin with the next
    /// rendered frame.
    pub fn add_voice(&mut self, voice: ActiveVoice) {
        self.voices.push(voice);
    }

    /// Number of voices that are scheduled or playing.
    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Renders `num_frames` frames into `output`, which must hold at least
    /// `num_frames * num_channels` samples, and advances the clock.
    pub fn process_into_output(&mut self, output: &mut [f32], num_frames: usize) {
        let num_channels = self.num_channels as usize;
        let num_frames = num_frames.min(output.len() / num_channels);
        let output = &mut output[..num_frames * num_channels];
        output.fill(0.0);

        let block_start = self.current_sample.load(Ordering::Acquire);
        let block_end = block_start + num_frames as u64;

        for voice in self.voices.iter_mut() {
            if voice.start_at_sample >= block_end {
                continue;
            }
            let offset = voice.start_at_sample.saturating_sub(block_start) as usize;
            let source_channels = voice.buffer.channel_count() as usize;
            let remaining = voice.buffer.frames() - voice.position;
            let to_render = remaining.min(num_frames - offset);

            for i in 0..to_render {
                let frame = voice.position + i;
                let out = &mut output[(offset + i) * num_channels..][..num_channels];
                if source_channels == 1 {
                    let sample = voice.buffer.sample(frame, 0);
                    for slot in out.iter_mut() {
                        *slot += sample;
                    }
                } else {
                    for channel in 0..source_channels {
                        out[channel % num_channels] += voice.buffer.sample(frame, channel);
                    }
                }
            }
            voice.position += to_render;
        }

        self.voices.retain(|voice| !voice.is_finished());
        self.current_sample.store(block_end, Ordering::Release);
    }

    /// Processes multiple frames of audio mixing into a newly allocated buffer.
    pub fn process_frames(&mut self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Gets the number of output channels.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Converts a time on the mixer clock to a frame position.
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}
