// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - typed message dispatch with handler negotiation
//!
//! Re-exports [`parley_core`] (envelopes, dispatcher, negotiation, consensus
//! state) and [`parley_network`] (rooms, sessions, lobby, configuration).

pub use parley_core;
pub use parley_network;

pub use parley_core::{
    Command, DispatchError, Dispatcher, Envelope, GameResult, Message, PeerRef, Status,
    StatusKind, TypeTag,
};
pub use parley_network::{
    Lobby, MemoryNetwork, ParleyConfig, ReplicationHub, Room, RoomEvent, RoomHandle, RoomOptions,
};
