// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley CLI - local demos of negotiation and session results
//!
//! Everything runs in one process over the in-memory transport: rooms,
//! players and the session coordinator are tasks of this binary.

mod render;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use parley_core::{Command, Envelope, MapData, PeerRef, PlayerDied, Tile};
use parley_network::{
    config, load_config, load_config_from, Lobby, MemoryNetwork, ParleyConfig, ReplicationHub,
    Room, RoomEvent, RoomHandle,
};

/// How long the demos wait for the rooms to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(
    name = "parley-cli",
    about = "Typed message negotiation and team consensus, run locally",
    version
)]
struct Args {
    /// Enable debug logging
    #[clap(long, global = true)]
    debug: bool,

    /// Configuration file to use instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Host rooms, start a session and eliminate teams until it is decided
    Demo {
        /// Number of rooms (one team each)
        #[clap(long, default_value = "2")]
        rooms: usize,

        /// Players per room
        #[clap(long, default_value = "2")]
        players: usize,

        /// Also report the team left standing; the session is already decided
        #[clap(long)]
        all: bool,
    },
    /// Send a map to a peer that has never seen one and watch it learn
    Negotiate {
        #[clap(long, default_value = "8")]
        width: u16,

        #[clap(long, default_value = "5")]
        height: u16,

        /// Print the map envelope as JSON before sending it
        #[clap(long)]
        json: bool,
    },
    /// Show the configuration, creating the default file if missing
    Config {
        /// Overwrite the file with defaults
        #[clap(long)]
        reset: bool,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    tracing::debug!(command = ?args.command, "Starting parley-cli");

    match args.command {
        Commands::Config { reset } => show_config(args.config, reset),
        Commands::Demo {
            rooms,
            players,
            all,
        } => {
            let config = read_config(args.config.as_ref())?;
            run_demo(&config, rooms, players, all).await
        }
        Commands::Negotiate {
            width,
            height,
            json,
        } => {
            let config = read_config(args.config.as_ref())?;
            run_negotiation(&config, width, height, json).await
        }
    }
}

fn read_config(path: Option<&PathBuf>) -> Result<ParleyConfig> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

fn show_config(path: Option<PathBuf>, reset: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::get_config_path()?,
    };

    let current = if reset {
        let defaults = ParleyConfig::default();
        config::save_config_to(&defaults, &path)?;
        defaults
    } else {
        load_config_from(&path)?
    };

    println!("# {}", path.display());
    print!(
        "{}",
        toml::to_string_pretty(&current).context("Failed to serialize config")?
    );
    Ok(())
}

async fn run_demo(config: &ParleyConfig, rooms: usize, players: usize, all: bool) -> Result<()> {
    if rooms == 0 || players == 0 {
        return Err(anyhow!("Need at least one room and one player per room"));
    }

    let network = Arc::new(MemoryNetwork::new());
    let lobby = Lobby::new("host", network.clone(), config.room_options());

    let mut joined: Vec<(String, Vec<RoomHandle>)> = Vec::new();
    let mut host_events = Vec::new();
    for r in 1..=rooms {
        let name = format!("room{}", r);
        lobby.create_room(&name).await?;
        host_events.push(lobby.room_events(&name).await?);
        print_events(&name, lobby.room_events(&name).await?);

        let mut members = Vec::new();
        for p in 1..=players {
            let player = format!("player{}", p);
            members.push(lobby.join_room(&player, &name, config.room_options()).await?);
        }
        joined.push((name, members));
    }

    let session = lobby.start_session().await?;
    println!("Started {} with {} rooms", session, rooms);
    for events in host_events.iter_mut() {
        wait_for_start(events).await?;
    }

    // every room but the last falls; a single room always falls and draws
    let falling = if all || joined.len() == 1 {
        joined.len()
    } else {
        joined.len() - 1
    };
    for (room, members) in joined.iter().take(falling) {
        let host = lobby.host_peer(room);
        for member in members {
            member.send(
                &host,
                &PlayerDied {
                    player: member.local().clone(),
                },
            )?;
        }
    }

    let result = tokio::time::timeout(SETTLE_TIMEOUT, lobby.session().wait_for_result())
        .await
        .context("Session was not decided in time")??;
    println!("Result: {}", result);

    // let the result reach the players before tearing down
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("{} envelopes delivered", network.traffic().len());

    lobby.close().await
}

async fn run_negotiation(config: &ParleyConfig, width: u16, height: u16, json: bool) -> Result<()> {
    let network = Arc::new(MemoryNetwork::new());
    let hub = ReplicationHub::new();

    let cartographer = Room::join(
        network.clone(),
        &hub,
        PeerRef::new("cartographer", "atlas"),
        config.room_options().with_commands(Command::APPLICATION),
        None,
    )?;
    let viewer = Room::join(
        network.clone(),
        &hub,
        PeerRef::new("viewer", "atlas"),
        config.room_options(),
        None,
    )?;
    let mut events = viewer.subscribe();

    let envelope = Envelope::new(cartographer.local().clone(), &sample_map(width, height))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&envelope.to_json())?);
    }
    cartographer.send_envelope(viewer.local(), envelope)?;

    let map = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(RoomEvent::Map { map, .. }) => return Ok(map),
                Ok(RoomEvent::Status(status)) => {
                    return Err(anyhow!("{}: {}", status.kind, status.message))
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => return Err(anyhow!("Viewer stopped: {}", err)),
            }
        }
    })
    .await
    .context("Map was not displayed in time")??;

    println!("{}", render::render_map(&map));
    for delivery in network.traffic() {
        println!(
            "{} -> {}: {} ({})",
            delivery.from, delivery.to, delivery.kind, delivery.tag
        );
    }

    cartographer.shutdown().await?;
    viewer.shutdown().await
}

/// Walled map with water in the middle and spawns in two corners
fn sample_map(width: u16, height: u16) -> MapData {
    let mut map = MapData::open("sample", width, height);
    for y in 0..height {
        for x in 0..width {
            let index = y as usize * width as usize + x as usize;
            let edge = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
            map.tiles[index] = if edge {
                Tile::Wall
            } else if x == width / 2 && y == height / 2 {
                Tile::Water
            } else if (x == 1 && y == 1) || (x + 2 == width && y + 2 == height) {
                Tile::Spawn
            } else {
                Tile::Floor
            };
        }
    }
    map
}

async fn wait_for_start(events: &mut broadcast::Receiver<RoomEvent>) -> Result<()> {
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(RoomEvent::GameStarted { .. }) => return Ok(()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => return Err(anyhow!("Room stopped before the game started: {}", err)),
            }
        }
    })
    .await
    .context("Game did not start in time")?
}

/// Print a room's events until the room closes
fn print_events(room: &str, mut events: broadcast::Receiver<RoomEvent>) {
    let room = room.to_string();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if !matches!(event, RoomEvent::RosterChanged { .. }) {
                println!("[{}] {}", room, render::describe_event(&event));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_args() {
        let args = Args::try_parse_from(["parley-cli", "--debug", "demo", "--rooms", "3"]).unwrap();
        assert!(args.debug);
        match args.command {
            Commands::Demo {
                rooms,
                players,
                all,
            } => {
                assert_eq!(rooms, 3);
                assert_eq!(players, 2);
                assert!(!all);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_sample_map_is_well_formed() {
        let map = sample_map(6, 4);
        assert!(map.is_well_formed());
        assert_eq!(map.tile(0, 0), Some(Tile::Wall));
        assert_eq!(map.tile(1, 1), Some(Tile::Spawn));
        assert_eq!(map.tile(3, 2), Some(Tile::Water));
    }

    #[tokio::test]
    async fn test_demo_runs_to_a_result() {
        let config = ParleyConfig::default();
        run_demo(&config, 2, 1, false).await.unwrap();
        run_demo(&config, 1, 2, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiation_demo_displays_the_map() {
        run_negotiation(&ParleyConfig::default(), 4, 3, false).await.unwrap();
    }
}
