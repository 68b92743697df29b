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
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;
mod thread_priority;

pub use buffer::DecodedBuffer;

/// Identifies one started voice (a one-shot playback node).
pub type VoiceId = u64;

/// Global atomic counter for generating unique voice IDs.
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a new, process-unique voice ID.
pub fn next_voice_id() -> VoiceId {
    VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Errors raised by an output device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no audio output device found with name {0}")]
    NotFound(String),

    #[error("audio output stream is not running")]
    Stopped,

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// An audio output device. The device owns the audio clock: a monotonically advancing
/// time in seconds, starting at zero when the device is opened.
pub trait Device: fmt::Display + Send + Sync {
    /// The sample rate the device renders at. Buffers should match it.
    fn sample_rate(&self) -> u32;

    /// The current position of the audio clock, in seconds.
    fn current_time(&self) -> f64;

    /// Starts a new one-shot voice playing `buffer` at clock time `when` (seconds).
    /// A time at or before `current_time()` starts as soon as possible. Returns
    /// immediately; the voice plays to completion on its own.
    fn start(&self, buffer: Arc<DecodedBuffer>, when: f64) -> Result<VoiceId, DeviceError>;

    #[cfg(test)]
    fn to_mock(&self) -> Option<&mock::Device> {
        None
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Opens the output device described by the configuration. Device names starting
/// with "mock" produce a mock device that plays nothing.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config.sample_rate())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
