// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley Core - typed envelopes, dispatch and team consensus
//!
//! This crate provides the transport-independent parts of parley:
//! - Envelopes, payloads and stable type tags
//! - Per-connection dispatcher with an unknown-type cache
//! - The handshake that installs handlers for unknown message kinds
//! - Status reports correlated to a causing envelope
//! - Player and team bookkeeping for winner/draw determination

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod cache;
pub mod cbor;
pub mod command;
pub mod consensus;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod negotiation;
pub mod status;
pub mod tag;

pub use cache::UnknownCache;
pub use command::{Command, RESULT_ENTRY, SESSION_ENTRY};
pub use consensus::{Elimination, PlayerStatusMap, SessionState, TeamResultMap};
pub use context::{report_failure, send_message, Entries, RoomContext};
pub use dispatcher::Dispatcher;
pub use envelope::{Envelope, Message, Payload, PeerRef};
pub use error::{CommunicationError, DispatchError};
pub use messages::{
    Batch, CmdData, CmdRequest, GameResult, MapData, PlayerDied, StartGame, TextMessage, Tile,
};
pub use negotiation::{NegotiationConfig, NegotiationState, ReplayPolicy};
pub use status::{Status, StatusKind};
pub use tag::TypeTag;
