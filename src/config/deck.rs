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
use std::collections::BTreeMap;

use serde::Deserialize;

use super::audio::Audio;
use super::fetch::Fetch;

/// A YAML representation of a deck: an output device, the samples to preload and an
/// optional list of hits to play.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Deck {
    /// The output device.
    #[serde(default)]
    pub audio: Audio,

    /// How samples are fetched.
    #[serde(default)]
    pub fetch: Fetch,

    /// Samples to load, by key. Values are source locators.
    #[serde(default)]
    pub samples: BTreeMap<String, String>,

    /// Hits to play once all samples are loaded.
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// A single scheduled playback of a sample.
#[derive(Deserialize, Clone, Debug)]
pub struct Hit {
    /// The sample key to play.
    pub key: String,

    /// Seconds after the start of the run.
    #[serde(default)]
    pub at: f64,
}
