// SPDX-License-Identifier: MIT OR Apache-2.0

//! Envelopes waiting for a handler, queued per tag in arrival order

use std::collections::{HashMap, VecDeque};

use crate::envelope::Envelope;
use crate::tag::TypeTag;

#[derive(Debug, Default)]
pub struct UnknownCache {
    queues: HashMap<TypeTag, VecDeque<Envelope>>,
}

impl UnknownCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the queue of the envelope's tag
    pub fn push(&mut self, envelope: Envelope) {
        self.queues
            .entry(envelope.tag())
            .or_default()
            .push_back(envelope);
    }

    /// Remove the oldest envelope for `tag`
    pub fn pop(&mut self, tag: TypeTag) -> Option<Envelope> {
        let queue = self.queues.get_mut(&tag)?;
        let envelope = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&tag);
        }
        envelope
    }

    /// Remove every envelope for `tag`, oldest first
    pub fn drain(&mut self, tag: TypeTag) -> Vec<Envelope> {
        self.queues
            .remove(&tag)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn peek(&self, tag: TypeTag) -> Option<&Envelope> {
        self.queues.get(&tag).and_then(|queue| queue.front())
    }

    /// Number of envelopes waiting for `tag`
    pub fn len(&self, tag: TypeTag) -> usize {
        self.queues.get(&tag).map_or(0, VecDeque::len)
    }

    /// Number of envelopes waiting across all tags
    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Tags with at least one waiting envelope
    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.queues.keys().copied()
    }
}
