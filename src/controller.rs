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

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, span, warn, Level};

use crate::samples::{PlaybackError, PlaybackScheduler};

/// Commands sent by the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Loads the sample at `locator` under `key`.
    LoadSample { key: String, locator: String },

    /// Plays the sample under `key` at clock time `when` (seconds).
    PlaySample { key: String, when: f64 },
}

/// Errors raised while accepting a command. Failures while executing a command are
/// never reported back through the command path.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown port {0:?}")]
    UnknownPort(String),

    #[error("invalid arguments for {port}: {reason}")]
    InvalidArguments { port: String, reason: String },

    #[error("controller has shut down")]
    Closed,
}

impl Command {
    /// Builds a command from a host port name and its positional argument array, e.g.
    /// `loadSample ["kick", "samples/Kick.wav"]` or `playSample ["kick", 0.5]`.
    pub fn from_port(port: &str, args: &Value) -> Result<Command, CommandError> {
        let invalid = |reason: &str| CommandError::InvalidArguments {
            port: port.to_string(),
            reason: reason.to_string(),
        };
        let args = args
            .as_array()
            .ok_or_else(|| invalid("expected an array of arguments"))?;
        // Arguments past the second are ignored.
        if args.len() < 2 {
            return Err(invalid("expected at least two arguments"));
        }
        let key = args[0]
            .as_str()
            .ok_or_else(|| invalid("sample key must be a string"))?
            .to_string();

        match port {
            "loadSample" => {
                let locator = args[1]
                    .as_str()
                    .ok_or_else(|| invalid("source locator must be a string"))?
                    .to_string();
                Ok(Command::LoadSample { key, locator })
            }
            "playSample" => {
                let when = args[1]
                    .as_f64()
                    .ok_or_else(|| invalid("start time must be a number"))?;
                Ok(Command::PlaySample { key, when })
            }
            _ => Err(CommandError::UnknownPort(port.to_string())),
        }
    }
}

/// Sends commands to a running controller. Cheap to clone; sending never blocks.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Sends a command. Only fails if the controller has shut down.
    pub fn send(&self, command: Command) -> Result<(), CommandError> {
        self.tx.send(command).map_err(|_| CommandError::Closed)
    }

    /// Sends a `loadSample` command.
    pub fn load_sample(&self, key: &str, locator: &str) -> Result<(), CommandError> {
        self.send(Command::LoadSample {
            key: key.to_string(),
            locator: locator.to_string(),
        })
    }

    /// Sends a `playSample` command.
    pub fn play_sample(&self, key: &str, when: f64) -> Result<(), CommandError> {
        self.send(Command::PlaySample {
            key: key.to_string(),
            when,
        })
    }

    /// Parses and sends a command from a host port.
    pub fn dispatch(&self, port: &str, args: &Value) -> Result<(), CommandError> {
        self.send(Command::from_port(port, args)?)
    }
}

/// Runs host commands against the sample cache and scheduler, in order, on a single
/// task.
pub struct Controller {
    sender: CommandSender,
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller. Must be called from within a tokio runtime.
    pub fn new(scheduler: Arc<PlaybackScheduler>) -> Controller {
        let (tx, rx) = mpsc::unbounded_channel();
        Controller {
            sender: CommandSender { tx },
            handle: tokio::spawn(Controller::process_commands(scheduler, rx)),
        }
    }

    /// Returns a sender for this controller.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Waits until every sender (including this controller's) is gone and all queued
    /// commands have been handled.
    pub async fn join(self) -> Result<(), JoinError> {
        drop(self.sender);
        self.handle.await
    }

    async fn process_commands(
        scheduler: Arc<PlaybackScheduler>,
        mut rx: mpsc::UnboundedReceiver<Command>,
    ) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        info!("Controller started.");
        while let Some(command) = rx.recv().await {
            debug!(command = ?command, "Received command.");
            Controller::handle(&scheduler, command);
        }
        info!("Controller closing.");
    }

    fn handle(scheduler: &PlaybackScheduler, command: Command) {
        match command {
            Command::LoadSample { key, locator } => {
                // Completion is reported through logs and sample events.
                let _ = scheduler.cache().load(&key, &locator);
            }
            Command::PlaySample { key, when } => {
                match scheduler.schedule_playback(&key, when) {
                    // Already logged by the scheduler.
                    Ok(_) | Err(PlaybackError::NotLoaded { .. }) => {}
                    Err(e) => {
                        warn!(key, when, error = %e, "Unable to schedule playback");
                    }
                }
            }
        }
    }
}
