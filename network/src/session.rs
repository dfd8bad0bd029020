// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session coordinator deciding the winner or a draw
//!
//! The coordinator is a single task owning the team result map. Rooms reach
//! it only through a [`SessionHandle`], so eliminations reported from many
//! rooms at once are applied one after another.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parley_core::{Envelope, GameResult, PeerRef, SessionState, TeamResultMap};
use tokio::sync::{mpsc, watch};

use crate::roster::{members, RosterView};
use crate::transport::Transport;

/// The coordinator's own connection to one room
#[derive(Clone)]
pub struct RoomLink {
    pub local: PeerRef,
    pub roster: RosterView,
}

impl RoomLink {
    pub fn room(&self) -> &str {
        self.local.room()
    }
}

enum SessionCommand {
    Begin { session: String, rooms: Vec<RoomLink> },
    Eliminate { room: String },
}

/// Cloneable handle to a running coordinator
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Start the session with one team per room
    pub fn begin(&self, session: impl Into<String>, rooms: Vec<RoomLink>) -> Result<()> {
        self.tx
            .send(SessionCommand::Begin {
                session: session.into(),
                rooms,
            })
            .map_err(|_| anyhow!("session coordinator has stopped"))
    }

    /// Report that a room's team has no player left
    pub fn eliminate(&self, room: &str) -> Result<()> {
        self.tx
            .send(SessionCommand::Eliminate {
                room: room.to_string(),
            })
            .map_err(|_| anyhow!("session coordinator has stopped"))
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Wait until the session is won or drawn
    pub async fn wait_for_result(&self) -> Result<GameResult> {
        let mut state = self.state.clone();
        loop {
            if let Some(result) = state.borrow_and_update().result() {
                return Ok(result);
            }
            state
                .changed()
                .await
                .context("session coordinator stopped before a result")?;
        }
    }
}

/// Owner of the team result map
pub struct SessionCoordinator {
    transport: Arc<dyn Transport>,
    session: Option<String>,
    teams: Option<TeamResultMap>,
    links: BTreeMap<String, RoomLink>,
    state_tx: watch::Sender<SessionState>,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionCoordinator {
    /// Spawn a coordinator task and return its handle
    pub fn spawn(transport: Arc<dyn Transport>) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let coordinator = Self {
            transport,
            session: None,
            teams: None,
            links: BTreeMap::new(),
            state_tx,
            rx,
        };
        tokio::spawn(coordinator.run());
        SessionHandle { tx, state }
    }

    /// Resolves after every elimination, in arrival order
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                SessionCommand::Begin { session, rooms } => self.begin(session, rooms),
                SessionCommand::Eliminate { room } => {
                    if self.apply_elimination(&room) {
                        self.resolve();
                    }
                }
            }
        }
        tracing::debug!(session = ?self.session, "Session coordinator stopped");
    }

    fn begin(&mut self, session: String, rooms: Vec<RoomLink>) {
        if self.teams.is_some() {
            tracing::warn!(%session, "Session already started, ignoring");
            return;
        }

        let teams = TeamResultMap::new(rooms.iter().map(|link| link.room().to_string()));
        self.links = rooms
            .into_iter()
            .map(|link| (link.room().to_string(), link))
            .collect();
        tracing::info!(%session, teams = teams.remaining(), "Session started");

        self.state_tx.send_replace(teams.state());
        self.teams = Some(teams);
        self.session = Some(session);
    }

    /// Returns whether the team map changed and needs resolving
    fn apply_elimination(&mut self, room: &str) -> bool {
        let Some(teams) = self.teams.as_mut() else {
            tracing::warn!(room, "Elimination reported before the session started");
            return false;
        };

        if teams.state().is_terminal() {
            tracing::debug!(room, "Session already decided, ignoring elimination");
            return false;
        }

        if teams.eliminate(room) {
            tracing::info!(room, "Team eliminated");
            true
        } else {
            tracing::warn!(room, "Elimination for a room outside the session");
            false
        }
    }

    fn resolve(&mut self) {
        let Some(teams) = self.teams.as_mut() else {
            return;
        };

        let result = teams.resolve();
        self.state_tx.send_replace(teams.state());

        if let Some(result) = result {
            self.broadcast(&result);
        }
    }

    /// Send the result to every member of every room known at session start
    fn broadcast(&self, result: &GameResult) {
        tracing::info!(session = ?self.session, %result, "Session decided");
        for link in self.links.values() {
            let envelope = match Envelope::new(link.local.clone(), result) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(room = link.room(), "Failed to encode result: {}", err);
                    continue;
                }
            };
            let roster = members(&link.roster);
            for failure in self.transport.send_all(&roster, &envelope) {
                tracing::warn!(room = link.room(), "Result not delivered: {}", failure);
            }
        }
    }
}
