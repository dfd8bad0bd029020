// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/install handshake for unknown type tags
//!
//! Per (connection, tag) the handshake moves through three states:
//!
//! ```text
//! UNKNOWN --first unknown envelope--> REQUESTED --CmdData--> INSTALLED
//!    ^                                    |
//!    +------- Reject / given up ----------+
//! ```
//!
//! While REQUESTED, further envelopes for the tag are cached without a new
//! request. Installation replays cached envelopes according to the
//! [`ReplayPolicy`].

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::context::{report_failure, send_message, RoomContext};
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, PeerRef};
use crate::error::DispatchError;
use crate::messages::{CmdData, CmdRequest};
use crate::status::Status;
use crate::tag::TypeTag;

/// Which cached envelopes are replayed when a handler is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPolicy {
    /// Replay only the oldest cached envelope
    #[default]
    Oldest,
    /// Replay every cached envelope, oldest first
    Drain,
}

/// Tuning for the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationConfig {
    /// How long to wait for `CmdData` before re-requesting; `None` waits forever
    pub request_timeout: Option<Duration>,
    /// Requests sent for one tag before its cached envelopes are dead-lettered
    pub max_attempts: u32,
    pub replay: ReplayPolicy,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            max_attempts: 3,
            replay: ReplayPolicy::Oldest,
        }
    }
}

impl NegotiationConfig {
    /// Requests never expire
    pub fn without_expiry() -> Self {
        Self {
            request_timeout: None,
            ..Self::default()
        }
    }
}

/// Negotiation state of one tag on one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    Unknown,
    Requested { peer: PeerRef, attempts: u32 },
    Installed(Command),
}

#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub(crate) peer: PeerRef,
    pub(crate) sent_at: Instant,
    pub(crate) attempts: u32,
}

impl Dispatcher {
    /// Default path: cache the envelope and ask its sender for a handler
    pub(crate) fn on_unknown<C>(&mut self, envelope: Envelope, ctx: &mut C) -> Result<(), DispatchError>
    where
        C: RoomContext + ?Sized,
    {
        let tag = envelope.tag();
        let sender = envelope.sender().clone();
        let kind = envelope.kind().to_string();
        self.unknown.push(envelope);

        if let Some(pending) = self.pending.get(&tag) {
            tracing::debug!(
                %tag,
                kind = %kind,
                asked = %pending.peer,
                cached = self.unknown.len(tag),
                "Handler already requested, caching envelope"
            );
            return Ok(());
        }

        tracing::info!(%tag, kind = %kind, peer = %sender, "Unknown message kind, requesting handler");
        self.pending.insert(
            tag,
            PendingRequest {
                peer: sender.clone(),
                sent_at: Instant::now(),
                attempts: 1,
            },
        );
        send_message(ctx, &sender, &CmdRequest { tag })
    }

    /// Answer a request with the local handler for `tag`, or reject it
    pub(crate) fn serve_request<C>(
        &mut self,
        tag: TypeTag,
        request: Envelope,
        ctx: &mut C,
    ) -> Result<(), DispatchError>
    where
        C: RoomContext + ?Sized,
    {
        let requester = request.sender().clone();
        match self.registry.get(&tag).copied() {
            Some(command) => {
                tracing::info!(%tag, %command, peer = %requester, "Serving handler");
                send_message(ctx, &requester, &CmdData { tag, command })
            }
            None => {
                tracing::warn!(%tag, peer = %requester, "No handler to offer, rejecting request");
                let status = Status::reject(request, format!("no handler for tag {}", tag));
                send_message(ctx, &requester, &status)
            }
        }
    }

    /// Install a received handler and replay cached envelopes
    pub(crate) fn install<C>(
        &mut self,
        tag: TypeTag,
        command: Command,
        ctx: &mut C,
    ) -> Result<(), DispatchError>
    where
        C: RoomContext + ?Sized,
    {
        if command.tag() != tag {
            return Err(DispatchError::TagMismatch {
                expected: command.message_kind().to_string(),
                found: tag.to_string(),
            });
        }

        self.register(tag, command);
        tracing::info!(%tag, %command, cached = self.unknown.len(tag), "Installed handler");

        match self.config.replay {
            ReplayPolicy::Oldest => {
                if let Some(envelope) = self.unknown.pop(tag) {
                    self.replay(envelope, ctx);
                }
            }
            ReplayPolicy::Drain => {
                while let Some(envelope) = self.unknown.pop(tag) {
                    self.replay(envelope, ctx);
                }
            }
        }
        Ok(())
    }

    /// Failures of a replayed envelope go to its own sender, not to the
    /// peer that served the handler
    fn replay<C>(&mut self, envelope: Envelope, ctx: &mut C)
    where
        C: RoomContext + ?Sized,
    {
        let cause = envelope.clone();
        if let Err(err) = self.dispatch(envelope, ctx) {
            report_failure(ctx, cause, &err);
        }
    }

    /// Give up on an outstanding request, keeping the cached envelopes
    pub fn abandon(&mut self, tag: TypeTag) -> bool {
        match self.pending.remove(&tag) {
            Some(pending) => {
                tracing::warn!(
                    %tag,
                    peer = %pending.peer,
                    cached = self.unknown.len(tag),
                    "Handler request abandoned"
                );
                true
            }
            None => false,
        }
    }

    /// Re-request or give up on requests older than the configured timeout
    ///
    /// Returns the tags that were given up. Their cached envelopes are moved
    /// to the dead-letter queue.
    pub fn expire_requests<C>(&mut self, now: Instant, ctx: &mut C) -> Vec<TypeTag>
    where
        C: RoomContext + ?Sized,
    {
        let Some(timeout) = self.config.request_timeout else {
            return Vec::new();
        };

        let expired: Vec<TypeTag> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.sent_at) >= timeout)
            .map(|(tag, _)| *tag)
            .collect();

        let mut given_up = Vec::new();
        for tag in expired {
            let Some(pending) = self.pending.get_mut(&tag) else {
                continue;
            };

            if pending.attempts >= self.config.max_attempts {
                let peer = pending.peer.clone();
                self.pending.remove(&tag);
                let dropped = self.unknown.drain(tag);
                tracing::warn!(
                    %tag,
                    %peer,
                    dropped = dropped.len(),
                    "No handler after {} requests, dead-lettering",
                    self.config.max_attempts
                );
                self.push_dead_letters(dropped);
                given_up.push(tag);
                continue;
            }

            pending.attempts += 1;
            pending.sent_at = now;
            let peer = pending.peer.clone();
            tracing::debug!(%tag, %peer, attempt = pending.attempts, "Re-requesting handler");
            if let Err(err) = send_message(ctx, &peer, &CmdRequest { tag }) {
                tracing::warn!(%tag, %peer, "Handler request failed: {}", err);
            }
        }
        given_up
    }
}
