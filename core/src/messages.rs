// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message kinds shipped with every peer

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::command::Command;
use crate::envelope::{Envelope, Message, PeerRef};
use crate::tag::TypeTag;

/// Request for the handler of a tag the requester does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdRequest {
    pub tag: TypeTag,
}

impl Message for CmdRequest {
    const KIND: &'static str = "parley.cmd.request";
}

/// Handler offered in answer to a [`CmdRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdData {
    pub tag: TypeTag,
    pub command: Command,
}

impl Message for CmdData {
    const KIND: &'static str = "parley.cmd.data";
}

/// Ordered list of envelopes delivered as one unit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Batch {
    pub envelopes: Vec<Envelope>,
}

impl Message for Batch {
    const KIND: &'static str = "parley.batch";
}

impl Batch {
    pub fn new(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes }
    }

    pub fn push(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// Plain text for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

impl Message for TextMessage {
    const KIND: &'static str = "parley.text";
}

impl TextMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A single map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tile {
    Floor,
    Wall,
    Water,
    Spawn,
}

/// A named grid of tiles, stored row by row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapData {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub tiles: Vec<Tile>,
}

impl Message for MapData {
    const KIND: &'static str = "parley.map";
}

impl MapData {
    /// Map filled with floor tiles
    pub fn open(name: impl Into<String>, width: u16, height: u16) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            tiles: vec![Tile::Floor; width as usize * height as usize],
        }
    }

    pub fn tile(&self, x: u16, y: u16) -> Option<Tile> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Whether the tile count matches the dimensions
    pub fn is_well_formed(&self) -> bool {
        self.tiles.len() == self.width as usize * self.height as usize
    }
}

/// Signals that a room's game has begun
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGame {
    pub session: String,
}

impl Message for StartGame {
    const KIND: &'static str = "parley.game.start";
}

/// Death notification for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDied {
    pub player: PeerRef,
}

impl Message for PlayerDied {
    const KIND: &'static str = "parley.game.death";
}

/// Final outcome of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum GameResult {
    /// Exactly one team is left standing
    Winner { room: String },
    /// Every remaining team was eliminated
    Draw,
}

impl Message for GameResult {
    const KIND: &'static str = "parley.game.result";
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Winner { room } => write!(f, "team {} wins", room),
            GameResult::Draw => write!(f, "draw"),
        }
    }
}
