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

//! Sample caching and clock-scheduled playback.
//!
//! This module provides:
//! - A cache of decoded samples keyed by host-chosen names, with at most one
//!   fetch in flight per key
//! - A scheduler that binds cached samples to the output device clock

mod cache;
mod error;
mod scheduler;

pub use cache::{LoadHandle, SampleCache, SampleEvent};
pub use error::{LoadError, PlaybackError};
pub use scheduler::PlaybackScheduler;
