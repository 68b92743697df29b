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
use std::sync::Arc;

use crate::audio::decode::DecodeError;
use crate::audio::DeviceError;
use crate::fetch::FetchError;

/// Why a sample failed to load. Every waiter on a load receives the same error, so the
/// underlying causes are shared.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("unable to fetch sample @ {locator}: {source}")]
    Fetch {
        locator: String,
        #[source]
        source: Arc<FetchError>,
    },

    #[error("unable to decode sample @ {locator}: {source}")]
    Decode {
        locator: String,
        #[source]
        source: Arc<DecodeError>,
    },

    #[error("load of sample @ {locator} was interrupted")]
    Interrupted { locator: String },
}

impl LoadError {
    /// Returns the locator that failed to load.
    pub fn locator(&self) -> &str {
        match self {
            LoadError::Fetch { locator, .. }
            | LoadError::Decode { locator, .. }
            | LoadError::Interrupted { locator } => locator,
        }
    }
}

/// Why a playback request was not bound to the output device.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("sample {key:?} is not loaded")]
    NotLoaded { key: String },

    #[error("invalid start time {when}")]
    InvalidStartTime { when: f64 },

    #[error("output device rejected the voice: {0}")]
    Device(#[from] DeviceError),
}
