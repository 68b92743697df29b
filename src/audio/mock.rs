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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::buffer::DecodedBuffer;
use super::mixer::seconds_to_samples;
use super::{next_voice_id, DeviceError, VoiceId};

/// Default sample rate of a mock device.
const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A start instruction received by the mock device.
#[derive(Clone, Debug)]
pub struct StartInstruction {
    /// The voice created for the instruction.
    pub voice_id: VoiceId,
    /// The buffer bound to the voice.
    pub buffer: Arc<DecodedBuffer>,
    /// The requested start time, in seconds.
    pub when: f64,
    /// The clock position (in frames) the voice would start at.
    pub start_at_sample: u64,
}

/// A mock device. Doesn't actually play anything; it records every start instruction
/// and has a clock that only moves when told to.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    /// Clock position in frames.
    clock: Arc<AtomicU64>,
    started: Arc<Mutex<Vec<StartInstruction>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: Option<u32>) -> Device {
        Device {
            name: name.to_string(),
            sample_rate: sample_rate
                .filter(|rate| *rate > 0)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
            clock: Arc::new(AtomicU64::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Moves the clock forward by the given number of seconds.
    pub fn advance(&self, seconds: f64) {
        self.clock.fetch_add(
            seconds_to_samples(seconds, self.sample_rate),
            Ordering::AcqRel,
        );
    }

    /// Returns all start instructions received so far.
    pub fn started(&self) -> Vec<StartInstruction> {
        self.started.lock().clone()
    }

    /// Returns the number of start instructions received so far.
    pub fn started_count(&self) -> usize {
        self.started.lock().len()
    }
}

impl super::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn start(&self, buffer: Arc<DecodedBuffer>, when: f64) -> Result<VoiceId, DeviceError> {
        let voice_id = next_voice_id();
        let now = self.clock.load(Ordering::Acquire);
        let start_at_sample = seconds_to_samples(when, self.sample_rate).max(now);
        debug!(device = self.name, voice_id, when, "Starting voice (mock)");

        self.started.lock().push(StartInstruction {
            voice_id,
            buffer,
            when,
            start_at_sample,
        });
        Ok(voice_id)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&Device> {
        Some(self)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
