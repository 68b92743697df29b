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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::debug;

pub mod audio;
pub mod deck;
pub mod error;
pub mod fetch;

pub use audio::Audio;
pub use deck::{Deck, Hit};
pub use error::ConfigError;
pub use fetch::Fetch;

/// Loads a deck from a YAML file. Values can be overridden with SAMPLEDECK_* environment
/// variables, e.g. SAMPLEDECK_AUDIO__DEVICE=mock.
///
/// Relative sample locators resolve against the deck file's directory unless
/// `fetch.base_path` says otherwise.
pub fn load_deck(path: &Path) -> Result<Deck, ConfigError> {
    let mut deck: Deck = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix("SAMPLEDECK")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    let config_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    deck.fetch.resolve_base_path(&config_dir);

    // Bad values fail here rather than at the first fetch or stream open.
    deck.fetch.timeout()?;
    deck.audio.validate()?;

    debug!(
        path = ?path,
        samples = deck.samples.len(),
        hits = deck.hits.len(),
        "Deck loaded"
    );
    Ok(deck)
}

/// Parses a deck from a YAML string. Relative locators resolve against the current
/// directory.
pub fn parse_deck(yaml: &str) -> Result<Deck, Box<dyn Error>> {
    let mut deck: Deck = Config::builder()
        .add_source(File::from_str(yaml, config::FileFormat::Yaml))
        .build()?
        .try_deserialize()?;
    deck.fetch.resolve_base_path(Path::new("."));
    deck.fetch.timeout()?;
    deck.audio.validate()?;
    Ok(deck)
}
