// SPDX-License-Identifier: MIT OR Apache-2.0

//! Point-to-point envelope delivery
//!
//! [`Transport::send`] returns as soon as the envelope is handed to the
//! recipient's inbox; delivery to the recipient's dispatcher happens later on
//! the recipient's own task.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Mutex, RwLock};
use parley_core::{CommunicationError, Envelope, PeerRef, TypeTag};
use tokio::sync::mpsc;

/// Receiving half of a registered endpoint
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// Reliable request/reply channel between room connections
pub trait Transport: Send + Sync {
    /// Open an inbox for `peer`, replacing any previous one
    fn register(&self, peer: PeerRef) -> Inbox;

    /// Close the inbox for `peer`; returns whether one existed
    fn unregister(&self, peer: &PeerRef) -> bool;

    /// Hand an envelope to `to`
    fn send(&self, to: &PeerRef, envelope: Envelope) -> Result<(), CommunicationError>;

    /// Send the same envelope to several peers, returning the failures
    fn send_all(&self, to: &[PeerRef], envelope: &Envelope) -> Vec<CommunicationError> {
        to.iter()
            .filter_map(|peer| self.send(peer, envelope.clone()).err())
            .collect()
    }
}

/// Maximum number of deliveries remembered by the traffic log
const TRAFFIC_LOG_CAPACITY: usize = 8192;

/// One successful hand-off recorded by [`MemoryNetwork`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: PeerRef,
    pub to: PeerRef,
    pub tag: TypeTag,
    pub kind: String,
}

/// In-process transport routing envelopes through unbounded channels
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: RwLock<HashMap<PeerRef, mpsc::UnboundedSender<Envelope>>>,
    traffic: Mutex<VecDeque<Delivery>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, peer: &PeerRef) -> bool {
        self.endpoints.read().contains_key(peer)
    }

    pub fn endpoints(&self) -> Vec<PeerRef> {
        self.endpoints.read().keys().cloned().collect()
    }

    /// Deliveries recorded so far, oldest first
    pub fn traffic(&self) -> Vec<Delivery> {
        self.traffic.lock().iter().cloned().collect()
    }

    /// Deliveries of one message kind sent to `to`
    pub fn deliveries_to(&self, to: &PeerRef, tag: TypeTag) -> usize {
        self.traffic
            .lock()
            .iter()
            .filter(|d| &d.to == to && d.tag == tag)
            .count()
    }

    pub fn clear_traffic(&self) {
        self.traffic.lock().clear();
    }

    fn record(&self, delivery: Delivery) {
        let mut traffic = self.traffic.lock();
        traffic.push_back(delivery);
        if traffic.len() > TRAFFIC_LOG_CAPACITY {
            traffic.pop_front();
        }
    }
}

impl Transport for MemoryNetwork {
    fn register(&self, peer: PeerRef) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.endpoints.write().insert(peer.clone(), tx).is_some() {
            tracing::debug!(%peer, "Replaced existing endpoint");
        }
        rx
    }

    fn unregister(&self, peer: &PeerRef) -> bool {
        self.endpoints.write().remove(peer).is_some()
    }

    fn send(&self, to: &PeerRef, envelope: Envelope) -> Result<(), CommunicationError> {
        let endpoints = self.endpoints.read();
        let tx = endpoints
            .get(to)
            .ok_or_else(|| CommunicationError::Unreachable(to.clone()))?;

        tracing::trace!(from = %envelope.sender(), %to, kind = envelope.kind(), "Sending envelope");
        let delivery = Delivery {
            from: envelope.sender().clone(),
            to: to.clone(),
            tag: envelope.tag(),
            kind: envelope.kind().to_string(),
        };
        tx.send(envelope)
            .map_err(|_| CommunicationError::Closed(to.clone()))?;
        self.record(delivery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::TextMessage;

    fn text(from: &PeerRef) -> Envelope {
        Envelope::new(from.clone(), &TextMessage::new("hi")).unwrap()
    }

    #[tokio::test]
    async fn test_send_reaches_registered_inbox() {
        let network = MemoryNetwork::new();
        let alice = PeerRef::new("alice", "red");
        let bob = PeerRef::new("bob", "red");
        let mut inbox = network.register(bob.clone());

        network.send(&bob, text(&alice)).unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.sender(), &alice);
        assert_eq!(network.deliveries_to(&bob, TypeTag::of::<TextMessage>()), 1);
    }

    #[test]
    fn test_send_to_unknown_peer_is_unreachable() {
        let network = MemoryNetwork::new();
        let alice = PeerRef::new("alice", "red");
        let ghost = PeerRef::new("ghost", "red");

        let err = network.send(&ghost, text(&alice)).unwrap_err();
        assert_eq!(err, CommunicationError::Unreachable(ghost));
        assert!(network.traffic().is_empty());
    }

    #[test]
    fn test_send_to_dropped_inbox_is_closed() {
        let network = MemoryNetwork::new();
        let alice = PeerRef::new("alice", "red");
        let bob = PeerRef::new("bob", "red");
        drop(network.register(bob.clone()));

        let err = network.send(&bob, text(&alice)).unwrap_err();
        assert_eq!(err, CommunicationError::Closed(bob));
    }

    #[test]
    fn test_send_all_collects_failures() {
        let network = MemoryNetwork::new();
        let alice = PeerRef::new("alice", "red");
        let bob = PeerRef::new("bob", "red");
        let _inbox = network.register(bob.clone());

        let failures = network.send_all(
            &[bob, PeerRef::new("ghost", "red")],
            &text(&alice),
        );
        assert_eq!(failures.len(), 1);
    }
}
