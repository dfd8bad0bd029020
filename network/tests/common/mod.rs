// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common utilities for parley integration tests

#![allow(dead_code)]

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

use parley_core::PeerRef;
use parley_network::{MemoryNetwork, ReplicationHub, Room, RoomEvent, RoomHandle, RoomOptions, Transport};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

// Initialize logging for tests
static INIT_LOGGING: Lazy<()> = Lazy::new(|| {
    // Only show warnings and errors unless RUST_LOG is explicitly set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// How long a test waits for one room event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory network plus replication hub shared by test peers
pub struct TestNet {
    pub network: Arc<MemoryNetwork>,
    pub hub: ReplicationHub,
}

impl TestNet {
    pub fn new() -> Self {
        Lazy::force(&INIT_LOGGING);
        Self {
            network: Arc::new(MemoryNetwork::new()),
            hub: ReplicationHub::new(),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.network.clone()
    }

    /// Join `peer@room` with the given options
    pub fn join(&self, peer: &str, room: &str, options: RoomOptions) -> RoomHandle {
        Room::join(
            self.transport(),
            &self.hub,
            PeerRef::new(peer, room),
            options,
            None,
        )
        .expect("failed to join room")
    }
}

/// Options with quick expiry checks
pub fn fast_options() -> RoomOptions {
    RoomOptions {
        tick: Duration::from_millis(10),
        ..RoomOptions::default()
    }
}

/// Wait for the first event `pick` accepts, skipping the others
pub async fn wait_for<T>(
    events: &mut broadcast::Receiver<RoomEvent>,
    mut pick: impl FnMut(RoomEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("room events closed: {}", err),
            }
        }
    })
    .await
    .expect("timed out waiting for room event")
}

/// Assert that no event `pick` accepts arrives within `window`
pub async fn assert_quiet<T: std::fmt::Debug>(
    events: &mut broadcast::Receiver<RoomEvent>,
    window: Duration,
    mut pick: impl FnMut(RoomEvent) -> Option<T>,
) {
    let seen = tokio::time::timeout(window, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(_) => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    if let Ok(found) = seen {
        panic!("unexpected room event: {:?}", found);
    }
}
