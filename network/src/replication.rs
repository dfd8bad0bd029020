// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named replicated values with publish/subscribe merge
//!
//! Every channel created under the same name shares one value. An update
//! applies a function to the current value and propagates the result,
//! stamped with a version and time, to every subscriber. There is no global
//! lock across channels: subscribers observe updates eventually, in order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A replicated value with its version and update time
#[derive(Debug, Clone)]
pub struct Stamped<V> {
    pub value: V,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl<V> Stamped<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

type SharedValue<V> = Arc<watch::Sender<Stamped<V>>>;

/// Registry of replicated channels by name
#[derive(Default)]
pub struct ReplicationHub {
    channels: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ReplicationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the channel `name`, creating it with `initial` if needed
    ///
    /// `on_sync` runs on a background task for every later update, including
    /// this subscriber's own. `on_quit` runs once when the subscription ends.
    pub fn create_channel<V, S, Q>(
        &self,
        name: &str,
        initial: V,
        on_sync: S,
        on_quit: Q,
    ) -> Result<ReplicatedChannel<V>>
    where
        V: Clone + Send + Sync + 'static,
        S: Fn(&V) + Send + 'static,
        Q: FnOnce() + Send + 'static,
    {
        let shared: SharedValue<V> = {
            let mut channels = self.channels.lock();
            match channels.get(name) {
                Some(existing) => existing.clone().downcast().map_err(|_| {
                    anyhow!("replicated channel {} holds a different value type", name)
                })?,
                None => {
                    let (tx, _rx) = watch::channel(Stamped::new(initial));
                    let tx = Arc::new(tx);
                    channels.insert(name.to_string(), tx.clone());
                    tracing::debug!(channel = name, "Created replicated channel");
                    tx
                }
            }
        };

        let mut updates = shared.subscribe();
        let channel_name = name.to_string();
        let task = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let value = updates.borrow_and_update().value.clone();
                tracing::trace!(channel = %channel_name, "Replicated value synced");
                on_sync(&value);
            }
        });

        Ok(ReplicatedChannel {
            name: name.to_string(),
            shared,
            task,
            on_quit: Some(Box::new(on_quit)),
        })
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }
}

/// One subscription to a replicated value
///
/// Dropping the subscription detaches it; nothing is published on the way
/// out.
pub struct ReplicatedChannel<V> {
    name: String,
    shared: SharedValue<V>,
    task: JoinHandle<()>,
    on_quit: Option<Box<dyn FnOnce() + Send>>,
}

impl<V: Clone> ReplicatedChannel<V> {
    /// Apply `f` to the shared value and propagate the result
    pub fn update<F>(&self, f: F) -> u64
    where
        F: FnOnce(V) -> V,
    {
        let mut version = 0;
        self.shared.send_modify(|stamped| {
            stamped.value = f(stamped.value.clone());
            stamped.version += 1;
            stamped.updated_at = Utc::now();
            version = stamped.version;
        });
        tracing::trace!(channel = %self.name, version, "Published replicated update");
        version
    }

    pub fn snapshot(&self) -> Stamped<V> {
        self.shared.borrow().clone()
    }

    pub fn value(&self) -> V {
        self.shared.borrow().value.clone()
    }

    /// Read handle that follows the shared value
    pub fn watch(&self) -> watch::Receiver<Stamped<V>> {
        self.shared.subscribe()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<V> Drop for ReplicatedChannel<V> {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(on_quit) = self.on_quit.take() {
            on_quit();
        }
    }
}
