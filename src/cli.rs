use std::env;
use std::path::PathBuf;
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::spawn;

use crate::config::types::Config;
use crate::error::AppRunError;
use crate::render::console::describe;
use crate::render::{battery_label, status_label};
use crate::session::registry::RegistrySnapshot;
use crate::session::SessionHandle;

/// Forward Freedrum sensors (BLE-MIDI) to a raw MIDI output
#[derive(Debug, Clone, Default, Parser)]
#[command(version)]
pub struct Args {
    /// Log every decoded MIDI message, or set FREEDRUM_DEBUG=1
    #[arg(long)]
    pub debug: bool,

    /// Raw MIDI device or FIFO that receives the forwarded frames (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pair the first device found right after start
    #[arg(short, long)]
    pub pair: bool,
}

impl Args {
    pub fn debug_requested(&self) -> bool {
        self.debug || env::var("FREEDRUM_DEBUG").map(|value| value == "1").unwrap_or(false)
    }

    /// Command line flags win over the config file.
    pub fn apply(&self, config: &mut Config) {
        if self.debug_requested() {
            config.debug = true;
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pair,
    Disconnect(usize),
    List,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next()? {
            "pair" | "p" => ConsoleCommand::Pair,
            "disconnect" | "d" => ConsoleCommand::Disconnect(words.next()?.parse().ok()?),
            "list" | "l" => ConsoleCommand::List,
            "quit" | "q" | "exit" => ConsoleCommand::Quit,
            _ => return None,
        };

        match words.next() {
            Some(_) => None,
            None => Some(command),
        }
    }
}

pub fn spawn_pair(session: SessionHandle) {
    spawn(async move {
        match session.pair().await {
            Ok(id) => info!("Device {} is ready", id),
            Err(err) => warn!("Pairing failed: {}", err),
        }
    });
}

fn list(snapshot: &RegistrySnapshot) {
    if snapshot.devices.is_empty() {
        info!("No devices");
    }

    for (index, view) in snapshot.devices.values().enumerate() {
        info!(
            "[{}] {} ({}) {} battery {} [{}]",
            index,
            view.name.as_deref().unwrap_or("unnamed"),
            view.id,
            status_label(view),
            battery_label(view.battery, view.state.is_connected()),
            view.capabilities.join(", "),
        );
        if !view.activity.is_empty() {
            let pulses: Vec<String> = view.activity.iter().map(describe).collect();
            info!("[{}] {}", index, pulses.join(" "));
        }
    }
}

/// Read commands from stdin until `quit` or ctrl-c. A closed stdin leaves only ctrl-c.
pub async fn command_loop(session: &SessionHandle) -> Result<(), AppRunError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!("Commands: pair, disconnect <n>, list, quit");

    loop {
        let line = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted");
                return Ok(());
            },
            line = lines.next_line(), if stdin_open => line?,
        };

        let Some(line) = line else {
            info!("stdin closed, press ctrl-c to stop");
            stdin_open = false;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Pair) => spawn_pair(session.clone()),
            Some(ConsoleCommand::Disconnect(index)) => {
                let snapshot = session.snapshot();
                match snapshot.devices.get_index(index) {
                    Some((id, _)) => {
                        if let Err(err) = session.disconnect(id.clone()).await {
                            warn!("Failed to disconnect {}: {}", id, err);
                        }
                    },
                    None => warn!("There is no device [{}]", index),
                }
            },
            Some(ConsoleCommand::List) => list(&session.snapshot()),
            Some(ConsoleCommand::Quit) => return Ok(()),
            None => warn!("Unknown command: {}", line.trim()),
        }
    }
}
