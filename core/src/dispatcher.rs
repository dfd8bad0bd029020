// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection routing from type tags to commands

use std::collections::{HashMap, VecDeque};

use crate::cache::UnknownCache;
use crate::command::Command;
use crate::context::RoomContext;
use crate::envelope::{Envelope, Message};
use crate::error::DispatchError;
use crate::negotiation::{NegotiationConfig, NegotiationState, PendingRequest};
use crate::tag::TypeTag;

/// Upper bound on retained dead letters; the oldest are dropped first
pub const MAX_DEAD_LETTERS: usize = 1024;

/// Routing table, unknown-type cache and negotiation bookkeeping for one
/// room connection
///
/// A dispatcher is owned by a single task and is never shared; all access
/// goes through `&mut self`.
#[derive(Debug)]
pub struct Dispatcher {
    pub(crate) registry: HashMap<TypeTag, Command>,
    pub(crate) unknown: UnknownCache,
    pub(crate) pending: HashMap<TypeTag, PendingRequest>,
    pub(crate) dead_letters: VecDeque<Envelope>,
    pub(crate) config: NegotiationConfig,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(NegotiationConfig::default())
    }
}

impl Dispatcher {
    /// Dispatcher with the protocol commands pre-registered
    pub fn new(config: NegotiationConfig) -> Self {
        let mut dispatcher = Self {
            registry: HashMap::new(),
            unknown: UnknownCache::new(),
            pending: HashMap::new(),
            dead_letters: VecDeque::new(),
            config,
        };
        for command in Command::PROTOCOL {
            dispatcher.register_command(command);
        }
        dispatcher
    }

    /// Register a command under `tag`, replacing any previous entry
    pub fn register(&mut self, tag: TypeTag, command: Command) -> Option<Command> {
        self.pending.remove(&tag);
        let previous = self.registry.insert(tag, command);
        if let Some(previous) = previous {
            if previous != command {
                tracing::debug!(%tag, %previous, %command, "Replaced handler");
            }
        }
        previous
    }

    /// Register a command under the tag of the message kind it interprets
    pub fn register_command(&mut self, command: Command) -> Option<Command> {
        self.register(command.tag(), command)
    }

    pub fn unregister(&mut self, tag: TypeTag) -> Option<Command> {
        self.registry.remove(&tag)
    }

    pub fn handler(&self, tag: TypeTag) -> Option<Command> {
        self.registry.get(&tag).copied()
    }

    pub fn knows<M: Message>(&self) -> bool {
        self.registry.contains_key(&TypeTag::of::<M>())
    }

    /// Route an envelope to its handler, or into negotiation when none exists
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(tag = %envelope.tag(), kind = envelope.kind(), from = %envelope.sender())
    )]
    pub fn dispatch<C>(&mut self, envelope: Envelope, ctx: &mut C) -> Result<(), DispatchError>
    where
        C: RoomContext + ?Sized,
    {
        match self.registry.get(&envelope.tag()).copied() {
            Some(command) => command.apply(self, envelope, ctx),
            None => self.on_unknown(envelope, ctx),
        }
    }

    /// Negotiation state of `tag`
    pub fn state(&self, tag: TypeTag) -> NegotiationState {
        if let Some(command) = self.registry.get(&tag) {
            return NegotiationState::Installed(*command);
        }
        match self.pending.get(&tag) {
            Some(pending) => NegotiationState::Requested {
                peer: pending.peer.clone(),
                attempts: pending.attempts,
            },
            None => NegotiationState::Unknown,
        }
    }

    /// Number of envelopes cached for `tag`
    pub fn cached(&self, tag: TypeTag) -> usize {
        self.unknown.len(tag)
    }

    pub fn unknown(&self) -> &UnknownCache {
        &self.unknown
    }

    pub fn dead_letters(&self) -> impl Iterator<Item = &Envelope> {
        self.dead_letters.iter()
    }

    pub fn take_dead_letters(&mut self) -> Vec<Envelope> {
        self.dead_letters.drain(..).collect()
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Tags with an installed handler
    pub fn known_tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.registry.keys().copied()
    }

    pub(crate) fn push_dead_letters(&mut self, envelopes: Vec<Envelope>) {
        self.dead_letters.extend(envelopes);
        while self.dead_letters.len() > MAX_DEAD_LETTERS {
            self.dead_letters.pop_front();
        }
    }
}
