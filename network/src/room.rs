// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room connections
//!
//! Each connection of a peer to a room runs as its own task. The task owns
//! the connection's dispatcher, player statuses and key-value entries and
//! handles one inbound envelope at a time, so none of that state is shared.
//! Presentation effects leave the task as [`RoomEvent`]s on a broadcast
//! channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use parley_core::{
    cbor, report_failure, Command, CommunicationError, DispatchError, Dispatcher, Entries,
    Envelope, GameResult, MapData, Message, NegotiationConfig, NegotiationState, PeerRef,
    PlayerStatusMap, RoomContext, Status, TypeTag,
};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::replication::ReplicationHub;
use crate::roster::{members, RosterSync, RosterView};
use crate::session::{RoomLink, SessionHandle};
use crate::transport::{Inbox, Transport};

/// Something a room connection wants shown or noticed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Text { from: PeerRef, text: String },
    Map { from: PeerRef, map: MapData },
    /// A status report addressed to this connection
    Status(Status),
    RosterChanged { members: Vec<PeerRef> },
    GameStarted { session: String, players: usize },
    PlayerDied { player: PeerRef },
    TeamEliminated { room: String },
    GameOver(GameResult),
    /// Negotiation for `tag` was given up
    DeadLettered { tag: TypeTag, count: usize },
}

/// Settings for one room connection
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub negotiation: NegotiationConfig,
    /// How often outstanding handler requests are checked for expiry
    pub tick: Duration,
    pub event_buffer: usize,
    /// Application commands registered before the first envelope arrives
    pub commands: Vec<Command>,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            negotiation: NegotiationConfig::default(),
            tick: Duration::from_secs(1),
            event_buffer: 256,
            commands: Vec::new(),
        }
    }
}

impl RoomOptions {
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Options for a connection that knows every shipped command
    pub fn application() -> Self {
        Self::default().with_commands(Command::APPLICATION)
    }
}

/// Negotiation snapshot for one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReport {
    pub state: NegotiationState,
    pub cached: usize,
    pub dead_letters: usize,
}

enum Control {
    Register(Command),
    Inspect {
        tag: TypeTag,
        reply: oneshot::Sender<TagReport>,
    },
    Players(oneshot::Sender<Option<PlayerStatusMap>>),
    Entry {
        key: String,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    Shutdown,
}

/// Entry point for joining rooms
pub struct Room;

impl Room {
    /// Connect `local` to its room and start the connection task
    ///
    /// A connection given a session handle reports its team's elimination to
    /// that session.
    pub fn join(
        transport: Arc<dyn Transport>,
        hub: &ReplicationHub,
        local: PeerRef,
        options: RoomOptions,
        session: Option<SessionHandle>,
    ) -> Result<RoomHandle> {
        let (events, _) = broadcast::channel(options.event_buffer.max(1));

        let roster_events = events.clone();
        let roster = RosterSync::join(hub, local.clone(), move |roster| {
            let _ = roster_events.send(RoomEvent::RosterChanged {
                members: roster.iter().cloned().collect(),
            });
        })
        .with_context(|| format!("Failed to join roster of room {}", local.room()))?;
        let roster_view = roster.view();

        let mut dispatcher = Dispatcher::new(options.negotiation.clone());
        for command in &options.commands {
            dispatcher.register_command(*command);
        }

        let inbox = transport.register(local.clone());
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let actor = RoomActor {
            dispatcher,
            state: RoomState {
                local: local.clone(),
                transport: transport.clone(),
                roster,
                events: events.clone(),
                players: None,
                session,
                entries: Entries::new(),
            },
            inbox,
            control: control_rx,
            tick: options.tick,
        };
        let task = tokio::spawn(actor.run());
        tracing::info!(peer = %local, "Joined room");

        Ok(RoomHandle {
            local,
            transport,
            control: control_tx,
            events,
            roster: roster_view,
            task,
        })
    }
}

/// Owner's handle to a running room connection
pub struct RoomHandle {
    local: PeerRef,
    transport: Arc<dyn Transport>,
    control: mpsc::UnboundedSender<Control>,
    events: broadcast::Sender<RoomEvent>,
    roster: RosterView,
    task: JoinHandle<()>,
}

impl RoomHandle {
    pub fn local(&self) -> &PeerRef {
        &self.local
    }

    pub fn room(&self) -> &str {
        self.local.room()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Send a message from this connection to one peer
    pub fn send<M: Message>(&self, to: &PeerRef, message: &M) -> Result<()> {
        let envelope = Envelope::new(self.local.clone(), message)?;
        self.send_envelope(to, envelope)
    }

    pub fn send_envelope(&self, to: &PeerRef, envelope: Envelope) -> Result<()> {
        self.transport.send(to, envelope)?;
        Ok(())
    }

    /// Send a message to every roster member, this connection included
    pub fn broadcast<M: Message>(&self, message: &M) -> Result<Vec<CommunicationError>> {
        let envelope = Envelope::new(self.local.clone(), message)?;
        Ok(self.transport.send_all(&self.roster(), &envelope))
    }

    pub fn roster(&self) -> Vec<PeerRef> {
        members(&self.roster)
    }

    pub fn roster_view(&self) -> RosterView {
        self.roster.clone()
    }

    /// What a session coordinator needs to reach this room
    pub fn link(&self) -> RoomLink {
        RoomLink {
            local: self.local.clone(),
            roster: self.roster.clone(),
        }
    }

    /// Register a command on the running connection
    pub fn register(&self, command: Command) -> Result<()> {
        self.control(Control::Register(command))
    }

    pub async fn inspect(&self, tag: TypeTag) -> Result<TagReport> {
        let (reply, rx) = oneshot::channel();
        self.control(Control::Inspect { tag, reply })?;
        rx.await.context("room connection dropped the request")
    }

    /// Player statuses, once a game has started
    pub async fn players(&self) -> Result<Option<PlayerStatusMap>> {
        let (reply, rx) = oneshot::channel();
        self.control(Control::Players(reply))?;
        rx.await.context("room connection dropped the request")
    }

    /// Typed read of a key-value entry
    pub async fn entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let (reply, rx) = oneshot::channel();
        self.control(Control::Entry {
            key: key.to_string(),
            reply,
        })?;
        match rx.await.context("room connection dropped the request")? {
            Some(bytes) => Ok(Some(cbor::from_cbor(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Stop the connection task and wait for it to finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.control.send(Control::Shutdown);
        self.task.await.context("room connection task failed")?;
        Ok(())
    }

    fn control(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .map_err(|_| anyhow!("room connection {} has stopped", self.local))
    }
}

struct RoomActor {
    dispatcher: Dispatcher,
    state: RoomState,
    inbox: Inbox,
    control: mpsc::UnboundedReceiver<Control>,
    tick: Duration,
}

impl RoomActor {
    #[tracing::instrument(name = "room", skip(self), fields(peer = %self.state.local))]
    async fn run(mut self) {
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // control before envelopes: a registration sent earlier applies first
            tokio::select! {
                biased;
                control = self.control.recv() => match control {
                    Some(Control::Shutdown) | None => break,
                    Some(control) => self.handle_control(control),
                },
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => break,
                },
                _ = tick.tick() => self.expire(),
            }
        }

        self.state.transport.unregister(&self.state.local);
        tracing::info!("Left room");
    }

    fn handle(&mut self, envelope: Envelope) {
        let cause = envelope.clone();
        if let Err(err) = self.dispatcher.dispatch(envelope, &mut self.state) {
            report_failure(&mut self.state, cause, &err);
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Register(command) => {
                if let Some(previous) = self.dispatcher.register_command(command) {
                    tracing::debug!(%command, %previous, "Replaced handler");
                }
            }
            Control::Inspect { tag, reply } => {
                let _ = reply.send(TagReport {
                    state: self.dispatcher.state(tag),
                    cached: self.dispatcher.cached(tag),
                    dead_letters: self.dead_letters(tag),
                });
            }
            Control::Players(reply) => {
                let _ = reply.send(self.state.players.clone());
            }
            Control::Entry { key, reply } => {
                let _ = reply.send(self.state.entries.raw(&key).map(<[u8]>::to_vec));
            }
            Control::Shutdown => {}
        }
    }

    fn expire(&mut self) {
        for tag in self.dispatcher.expire_requests(Instant::now(), &mut self.state) {
            let count = self.dead_letters(tag);
            self.state.emit(RoomEvent::DeadLettered { tag, count });
        }
    }

    fn dead_letters(&self, tag: TypeTag) -> usize {
        self.dispatcher
            .dead_letters()
            .filter(|envelope| envelope.tag() == tag)
            .count()
    }
}

/// Everything a command can reach while the actor dispatches
struct RoomState {
    local: PeerRef,
    transport: Arc<dyn Transport>,
    roster: RosterSync,
    events: broadcast::Sender<RoomEvent>,
    players: Option<PlayerStatusMap>,
    session: Option<SessionHandle>,
    entries: Entries,
}

impl RoomState {
    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No room event subscribers");
        }
    }
}

impl RoomContext for RoomState {
    fn local_peer(&self) -> &PeerRef {
        &self.local
    }

    fn send(&mut self, to: &PeerRef, envelope: Envelope) -> Result<(), CommunicationError> {
        self.transport.send(to, envelope)
    }

    fn display_text(&mut self, from: &PeerRef, text: &str) {
        tracing::info!(%from, "{}", text);
        self.emit(RoomEvent::Text {
            from: from.clone(),
            text: text.to_string(),
        });
    }

    fn display_map(&mut self, from: &PeerRef, map: &MapData) {
        tracing::info!(%from, map = %map.name, width = map.width, height = map.height, "Map received");
        self.emit(RoomEvent::Map {
            from: from.clone(),
            map: map.clone(),
        });
    }

    fn report_status(&mut self, status: &Status) {
        self.emit(RoomEvent::Status(status.clone()));
    }

    fn start_game(&mut self, session: &str) {
        let players = PlayerStatusMap::seed(self.roster.members(), &self.local);
        let alive = players.alive_count();
        tracing::info!(session, players = alive, "Game started");
        self.players = Some(players);
        self.emit(RoomEvent::GameStarted {
            session: session.to_string(),
            players: alive,
        });
    }

    fn record_death(&mut self, player: &PeerRef) -> Result<(), DispatchError> {
        let room = self.local.room().to_string();
        let Some(players) = self.players.as_mut() else {
            return Err(DispatchError::Processing(format!(
                "no game running in room {}",
                room
            )));
        };

        let was_alive = players.mark_dead(player);
        let elimination = players.check_team_survival(&room);
        if was_alive {
            tracing::info!(%player, "Player died");
            self.emit(RoomEvent::PlayerDied {
                player: player.clone(),
            });
        }

        if let Some(elimination) = elimination {
            tracing::info!(room = %elimination.room, "No player left, team eliminated");
            self.emit(RoomEvent::TeamEliminated {
                room: elimination.room.clone(),
            });
            if let Some(session) = &self.session {
                session
                    .eliminate(&elimination.room)
                    .map_err(|err| DispatchError::Processing(err.to_string()))?;
            }
        }
        Ok(())
    }

    fn announce_result(&mut self, result: &GameResult) {
        tracing::info!(%result, "Game over");
        self.emit(RoomEvent::GameOver(result.clone()));
    }

    fn entries(&mut self) -> &mut Entries {
        &mut self.entries
    }
}
