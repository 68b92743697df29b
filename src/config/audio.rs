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
use serde::Deserialize;

use super::error::ConfigError;

/// Device name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device: "default", a device name as listed by `sampledeck devices`,
    /// or anything starting with "mock".
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz. Defaults to the device's preferred rate.
    sample_rate: Option<u32>,

    /// Number of output channels. Defaults to the device's preferred count.
    channels: Option<u16>,

    /// Stream buffer size in frames. Defaults to the backend's choice.
    buffer_size: Option<u32>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            buffer_size: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the requested sample rate, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns the requested output channel count, if any.
    pub fn channels(&self) -> Option<u16> {
        self.channels
    }

    /// Returns the requested stream buffer size, if any.
    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    /// Rejects zero values, which no output stream can run with.
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == Some(0) {
            return Err(ConfigError::ZeroAudioValue {
                field: "sample_rate",
            });
        }
        if self.channels == Some(0) {
            return Err(ConfigError::ZeroAudioValue { field: "channels" });
        }
        if self.buffer_size == Some(0) {
            return Err(ConfigError::ZeroAudioValue {
                field: "buffer_size",
            });
        }
        Ok(())
    }
}
