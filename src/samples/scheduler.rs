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

//! Binds cached samples to the output device clock.

use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::SampleCache;
use super::error::PlaybackError;
use crate::audio::{Device, VoiceId};

/// Schedules playback of cached samples on an output device.
pub struct PlaybackScheduler {
    cache: SampleCache,
    device: Arc<dyn Device>,
}

impl PlaybackScheduler {
    /// Creates a new scheduler reading from `cache` and playing through `device`.
    pub fn new(cache: SampleCache, device: Arc<dyn Device>) -> PlaybackScheduler {
        PlaybackScheduler { cache, device }
    }

    /// Starts a new voice for the sample under `key` at clock time `when` (seconds on
    /// the device clock). A time that has already passed plays as soon as possible.
    ///
    /// Fails without touching the device if the sample isn't loaded yet (never loaded,
    /// still in flight or failed). Each call creates an independent voice; overlapping
    /// calls for the same key play over each other.
    pub fn schedule_playback(&self, key: &str, when: f64) -> Result<VoiceId, PlaybackError> {
        if !when.is_finite() || when < 0.0 {
            return Err(PlaybackError::InvalidStartTime { when });
        }

        let Some(buffer) = self.cache.lookup(key) else {
            warn!(key, when, "Sample not loaded, dropping playback");
            return Err(PlaybackError::NotLoaded {
                key: key.to_string(),
            });
        };

        let voice_id = self.device.start(buffer, when)?;
        debug!(key, when, voice_id, "Playback scheduled");
        Ok(voice_id)
    }

    /// Returns the current position of the device clock, in seconds.
    pub fn current_time(&self) -> f64 {
        self.device.current_time()
    }

    /// Returns the sample cache.
    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    /// Returns the output device.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("cache", &self.cache)
            .field("device", &self.device.to_string())
            .finish()
    }
}
