// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process lobby for rooms and sessions.
//!   * create_room / join_room / start_session
//!   * broadcast LobbyEvent via tokio::sync::broadcast

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parley_core::{PeerRef, StartGame};
use tokio::sync::{broadcast, RwLock};

use crate::replication::ReplicationHub;
use crate::room::{Room, RoomEvent, RoomHandle, RoomOptions};
use crate::session::{SessionCoordinator, SessionHandle};
use crate::transport::Transport;

/// Information about a room in the lobby
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub name: String,
    /// The host's own connection to the room
    pub host: PeerRef,
    /// Roster size, host connection included
    pub members: usize,
    pub created_at: DateTime<Utc>,
}

/// Events emitted by the lobby
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    RoomCreated(RoomInfo),
    PlayerJoined { room: String, player: PeerRef },
    SessionStarted { session: String, rooms: Vec<String> },
}

struct HostedRoom {
    handle: RoomHandle,
    created_at: DateTime<Utc>,
}

/// Rooms hosted by one peer, plus the session deciding between them
pub struct Lobby {
    host: String,
    transport: Arc<dyn Transport>,
    hub: ReplicationHub,
    options: RoomOptions,
    session: SessionHandle,
    rooms: RwLock<HashMap<String, HostedRoom>>,
    events_tx: broadcast::Sender<LobbyEvent>,
    /// Keep a receiver alive so sends succeed without subscribers
    _events_rx: broadcast::Receiver<LobbyEvent>,
}

impl Lobby {
    /// Create a lobby hosted by `host`; must run inside a tokio runtime
    pub fn new(host: impl Into<String>, transport: Arc<dyn Transport>, options: RoomOptions) -> Self {
        let host = host.into();
        let _span = tracing::info_span!("network.lobby", %host).entered();

        let (events_tx, events_rx) = broadcast::channel(100);
        let session = SessionCoordinator::spawn(transport.clone());

        Self {
            host,
            transport,
            hub: ReplicationHub::new(),
            options,
            session,
            rooms: RwLock::new(HashMap::new()),
            events_tx,
            _events_rx: events_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.events_tx.subscribe()
    }

    /// Open a room and connect the host to it
    #[tracing::instrument(name = "network.lobby", skip(self))]
    pub async fn create_room(&self, name: &str) -> Result<RoomInfo> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(anyhow!("Room already exists: {}", name));
        }

        let options = self
            .options
            .clone()
            .with_commands(parley_core::Command::APPLICATION);
        let handle = Room::join(
            self.transport.clone(),
            &self.hub,
            PeerRef::new(self.host.clone(), name),
            options,
            Some(self.session.clone()),
        )?;
        let created_at = Utc::now();
        let info = RoomInfo {
            name: name.to_string(),
            host: handle.local().clone(),
            members: handle.roster().len(),
            created_at,
        };
        rooms.insert(name.to_string(), HostedRoom { handle, created_at });
        drop(rooms);

        tracing::debug!(room = name, event_type = "RoomCreated", "Broadcasting lobby event");
        self.events_tx
            .send(LobbyEvent::RoomCreated(info.clone()))
            .map_err(|e| anyhow!("Failed to broadcast room created event: {}", e))?;
        Ok(info)
    }

    /// Connect `player` to an existing room
    ///
    /// The player's connection starts with protocol commands only and learns
    /// the rest from the host.
    #[tracing::instrument(name = "network.lobby", skip(self, options))]
    pub async fn join_room(&self, player: &str, room: &str, options: RoomOptions) -> Result<RoomHandle> {
        if !self.rooms.read().await.contains_key(room) {
            return Err(anyhow!("Room not found: {}", room));
        }

        let peer = PeerRef::new(player, room);
        let handle = Room::join(self.transport.clone(), &self.hub, peer.clone(), options, None)?;

        tracing::debug!(room, player, event_type = "PlayerJoined", "Broadcasting lobby event");
        self.events_tx
            .send(LobbyEvent::PlayerJoined {
                room: room.to_string(),
                player: peer,
            })
            .map_err(|e| anyhow!("Failed to broadcast player joined event: {}", e))?;
        Ok(handle)
    }

    /// Start a session over every room and tell each roster to begin
    #[tracing::instrument(name = "network.lobby", skip(self))]
    pub async fn start_session(&self) -> Result<String> {
        let session = format!("session-{}", uuid::Uuid::new_v4());

        let rooms = self.rooms.read().await;
        if rooms.is_empty() {
            return Err(anyhow!("No rooms to start a session with"));
        }

        self.session
            .begin(session.clone(), rooms.values().map(|r| r.handle.link()).collect())?;

        let start = StartGame {
            session: session.clone(),
        };
        for (name, room) in rooms.iter() {
            for failure in room.handle.broadcast(&start)? {
                tracing::warn!(room = %name, "Start not delivered: {}", failure);
            }
        }

        let names: Vec<String> = rooms.keys().cloned().collect();
        drop(rooms);

        tracing::debug!(event_type = "SessionStarted", "Broadcasting lobby event");
        self.events_tx
            .send(LobbyEvent::SessionStarted {
                session: session.clone(),
                rooms: names,
            })
            .map_err(|e| anyhow!("Failed to broadcast session started event: {}", e))?;
        Ok(session)
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms = self.rooms.read().await;
        let mut list: Vec<RoomInfo> = rooms
            .iter()
            .map(|(name, room)| RoomInfo {
                name: name.clone(),
                host: room.handle.local().clone(),
                members: room.handle.roster().len(),
                created_at: room.created_at,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Events of the host's connection to `room`
    pub async fn room_events(&self, room: &str) -> Result<broadcast::Receiver<RoomEvent>> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|r| r.handle.subscribe())
            .ok_or_else(|| anyhow!("Room not found: {}", room))
    }

    pub fn host_peer(&self, room: &str) -> PeerRef {
        PeerRef::new(self.host.clone(), room)
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn hub(&self) -> &ReplicationHub {
        &self.hub
    }

    /// Stop every host connection
    pub async fn close(self) -> Result<()> {
        let rooms = self.rooms.into_inner();
        for (name, room) in rooms {
            tracing::debug!(room = %name, "Closing room");
            room.handle.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;

    fn lobby() -> Lobby {
        Lobby::new("host", Arc::new(MemoryNetwork::new()), RoomOptions::default())
    }

    #[tokio::test]
    async fn test_lobby_create_room() {
        let lobby = lobby();
        let mut rx = lobby.subscribe();

        let info = lobby.create_room("red").await.unwrap();
        assert_eq!(info.host, PeerRef::new("host", "red"));
        assert_eq!(info.members, 1);

        match rx.recv().await.unwrap() {
            LobbyEvent::RoomCreated(created) => assert_eq!(created.name, "red"),
            _ => panic!("Expected RoomCreated event"),
        }

        assert!(lobby.create_room("red").await.is_err());
    }

    #[tokio::test]
    async fn test_lobby_join_room() {
        let lobby = lobby();
        lobby.create_room("red").await.unwrap();

        let player = lobby
            .join_room("alice", "red", RoomOptions::default())
            .await
            .unwrap();
        assert_eq!(player.roster().len(), 2);
        assert!(lobby.join_room("bob", "blue", RoomOptions::default()).await.is_err());

        let rooms = lobby.list_rooms().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].members, 2);
    }

    #[tokio::test]
    async fn test_start_session_needs_rooms() {
        let lobby = lobby();
        assert!(lobby.start_session().await.is_err());
    }

    #[tokio::test]
    async fn test_start_session_seeds_host() {
        let lobby = lobby();
        lobby.create_room("red").await.unwrap();
        let _alice = lobby
            .join_room("alice", "red", RoomOptions::default())
            .await
            .unwrap();
        let mut events = lobby.room_events("red").await.unwrap();

        let session = lobby.start_session().await.unwrap();
        assert!(session.starts_with("session-"));

        loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let RoomEvent::GameStarted { players, .. } = event {
                assert_eq!(players, 1);
                break;
            }
        }
    }
}
