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
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

/// A YAML representation of how samples are fetched.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Fetch {
    /// Directory that relative locators resolve against.
    base_path: Option<PathBuf>,

    /// Per-request timeout, e.g. "5s" or "500ms". No timeout when unset.
    timeout: Option<String>,
}

impl Fetch {
    /// Returns the base path for relative locators.
    pub fn base_path(&self) -> &Path {
        self.base_path.as_deref().unwrap_or(Path::new("."))
    }

    /// Makes a relative (or missing) base path relative to the given directory.
    pub(super) fn resolve_base_path(&mut self, config_dir: &Path) {
        self.base_path = Some(match self.base_path.take() {
            Some(path) if path.is_absolute() => path,
            Some(path) => config_dir.join(path),
            None => config_dir.to_path_buf(),
        });
    }

    /// Returns the fetch timeout, if one is configured.
    pub fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        match &self.timeout {
            Some(timeout) => DurationString::from_string(timeout.clone())
                .map(|d| Some(d.into()))
                .map_err(|e| ConfigError::InvalidDuration {
                    value: timeout.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}
