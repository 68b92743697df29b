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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use sampledeck::audio::{self, mock};
use sampledeck::config::{self, Deck};
use sampledeck::controller::Controller;
use sampledeck::fetch::LocatorFetcher;
use sampledeck::samples::{PlaybackScheduler, SampleCache};
use tracing::{error, info};

/// Lead time between the end of preloading and the first hit.
const START_DELAY: f64 = 0.1;

/// Extra time to wait after the last hit should have finished.
const TAIL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A clock-scheduled sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Preloads the samples of a deck and plays its hits.
    Play {
        /// The path to the deck file.
        deck_path: PathBuf,
    },
    /// Fetches and decodes every sample of a deck without playing anything.
    Check {
        /// The path to the deck file.
        deck_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play { deck_path } => {
            let deck = config::load_deck(&deck_path)?;
            play(deck).await?;
        }
        Commands::Check { deck_path } => {
            let deck = config::load_deck(&deck_path)?;
            check(deck).await?;
        }
    }

    Ok(())
}

fn new_cache(deck: &Deck, target_sample_rate: u32) -> Result<SampleCache, Box<dyn Error>> {
    let fetcher = LocatorFetcher::new(deck.fetch.base_path(), deck.fetch.timeout()?);
    Ok(SampleCache::new(Arc::new(fetcher), Some(target_sample_rate)))
}

async fn play(deck: Deck) -> Result<(), Box<dyn Error>> {
    let device = audio::get_device(&deck.audio)?;
    info!(device = %device, "Opened output device");

    let cache = new_cache(&deck, device.sample_rate())?;
    let handles: Vec<_> = deck
        .samples
        .iter()
        .map(|(key, locator)| (key, cache.load(key, locator)))
        .collect();
    for (key, handle) in handles {
        if let Err(e) = handle.wait().await {
            error!(key, err = %e, "Sample failed to load; its hits will be dropped");
        }
    }

    let scheduler = Arc::new(PlaybackScheduler::new(cache.clone(), device.clone()));
    let controller = Controller::new(scheduler);
    let sender = controller.sender();

    let start = device.current_time() + START_DELAY;
    let mut end = start;
    for hit in deck.hits.iter() {
        let when = start + hit.at.max(0.0);
        sender.play_sample(&hit.key, when)?;
        if let Some(buffer) = cache.lookup(&hit.key) {
            end = end.max(when + buffer.duration().as_secs_f64());
        }
    }
    drop(sender);
    controller.join().await?;

    let remaining = (end - device.current_time()).max(0.0);
    tokio::time::sleep(Duration::from_secs_f64(remaining) + TAIL).await;
    info!(hits = deck.hits.len(), "Playback finished");
    Ok(())
}

async fn check(deck: Deck) -> Result<(), Box<dyn Error>> {
    let device = mock::Device::get("mock-check", deck.audio.sample_rate());
    let cache = new_cache(&deck, audio::Device::sample_rate(&device))?;

    let handles: Vec<_> = deck
        .samples
        .iter()
        .map(|(key, locator)| (key, locator, cache.load(key, locator)))
        .collect();

    let mut failures = 0;
    println!("Samples (count: {}):", handles.len());
    for (key, locator, handle) in handles {
        match handle.wait().await {
            Ok(buffer) => println!(
                "- {} ({}): {} channel(s), {:.3}s",
                key,
                locator,
                buffer.channel_count(),
                buffer.duration().as_secs_f64()
            ),
            Err(e) => {
                failures += 1;
                println!("- {} ({}): {}", key, locator, e);
            }
        }
    }

    for hit in deck.hits.iter() {
        if !deck.samples.contains_key(&hit.key) {
            failures += 1;
            println!("Hit at {}s refers to unknown sample {}", hit.at, hit.key);
        }
    }

    if failures > 0 {
        return Err(format!("{} problem(s) found", failures).into());
    }
    println!("All samples OK.");
    Ok(())
}
