// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley Network - in-process rooms and session coordination
//!
//! This crate provides the runtime side of parley:
//! - A transport trait with an in-memory implementation
//! - Replicated values and room rosters built on them
//! - Room connections running as single-owner tasks
//! - The session coordinator deciding winner or draw
//! - A lobby tying rooms and sessions together
//! - TOML configuration

#![deny(unsafe_code)]

pub mod config;
pub mod lobby;
pub mod replication;
pub mod room;
pub mod roster;
pub mod session;
pub mod transport;

pub use config::{load_config, load_config_from, save_config, ParleyConfig};
pub use lobby::{Lobby, LobbyEvent, RoomInfo};
pub use replication::{ReplicatedChannel, ReplicationHub, Stamped};
pub use room::{Room, RoomEvent, RoomHandle, RoomOptions, TagReport};
pub use roster::{Roster, RosterSync, RosterView};
pub use session::{RoomLink, SessionCoordinator, SessionHandle};
pub use transport::{Delivery, Inbox, MemoryNetwork, Transport};
