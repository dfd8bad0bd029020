// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replicated room membership

use std::collections::BTreeSet;

use anyhow::Result;
use parley_core::PeerRef;
use tokio::sync::watch;

use crate::replication::{ReplicatedChannel, ReplicationHub, Stamped};

/// Members of one room
pub type Roster = BTreeSet<PeerRef>;

/// Read handle following a room's roster
pub type RosterView = watch::Receiver<Stamped<Roster>>;

/// Name of the replicated channel holding a room's roster
pub fn roster_channel(room: &str) -> String {
    format!("roster/{}", room)
}

/// Current members behind a roster view
pub fn members(view: &RosterView) -> Vec<PeerRef> {
    view.borrow().value.iter().cloned().collect()
}

/// A room connection's subscription to the room roster
pub struct RosterSync {
    local: PeerRef,
    channel: ReplicatedChannel<Roster>,
}

impl RosterSync {
    /// Subscribe and publish an add-self update
    pub fn join<S>(hub: &ReplicationHub, local: PeerRef, on_sync: S) -> Result<Self>
    where
        S: Fn(&Roster) + Send + 'static,
    {
        let quitting = local.clone();
        let channel = hub.create_channel(
            &roster_channel(local.room()),
            Roster::new(),
            on_sync,
            move || tracing::debug!(peer = %quitting, "Left roster"),
        )?;

        let me = local.clone();
        let version = channel.update(move |mut roster| {
            roster.insert(me);
            roster
        });
        tracing::debug!(peer = %local, version, "Joined roster");

        Ok(Self { local, channel })
    }

    pub fn members(&self) -> Vec<PeerRef> {
        self.channel.value().into_iter().collect()
    }

    pub fn contains(&self, peer: &PeerRef) -> bool {
        self.channel.snapshot().value.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.channel.snapshot().value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> RosterView {
        self.channel.watch()
    }

    pub fn local(&self) -> &PeerRef {
        &self.local
    }

    /// Stop following the roster; the local entry is left in place
    pub fn leave(self) {
        self.channel.unsubscribe();
    }
}
