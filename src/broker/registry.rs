//! Subscription registry
//!
//! The registry is the only state shared between sessions and the dispatcher.
//! Everything lives behind one mutex: the topic map and a reverse index of
//! which topics each connection joined. No reference into the map ever leaves
//! the lock; readers get owned snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::broker::topic::Topic;
use crate::client::{ConnectionHandle, ConnectionId};

#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashMap<String, Topic>,
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation leaves the maps consistent before it can panic, so a
    // poisoned lock still guards valid state.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `connection` to `topic`, creating the topic if needed.
    ///
    /// Returns `true` when the subscription is new. Re-subscribing and
    /// subscribing an already closed connection both return `false`.
    pub fn subscribe(&self, topic: &str, connection: &ConnectionHandle) -> bool {
        let mut state = self.state();
        if connection.is_closed() {
            return false;
        }

        let added = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(connection);
        if added {
            state
                .memberships
                .entry(connection.id())
                .or_default()
                .insert(topic.to_string());
        }
        added
    }

    /// Removes `connection` from every topic it joined and drops topics left
    /// empty. Returns how many topics it was removed from.
    pub fn unsubscribe_all(&self, connection: ConnectionId) -> usize {
        let mut state = self.state();
        let Some(joined) = state.memberships.remove(&connection) else {
            return 0;
        };

        for name in &joined {
            let now_empty = match state.topics.get_mut(name) {
                Some(topic) => {
                    topic.unsubscribe(&connection);
                    topic.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.topics.remove(name);
                debug!(topic = %name, "dropped empty topic");
            }
        }
        joined.len()
    }

    /// Snapshot of the current subscribers of `topic`; empty for unknown topics.
    pub fn subscribers_of(&self, topic: &str) -> Vec<ConnectionHandle> {
        self.state()
            .topics
            .get(topic)
            .map(Topic::snapshot)
            .unwrap_or_default()
    }

    /// Whether `connection` is currently subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str, connection: ConnectionId) -> bool {
        self.state()
            .topics
            .get(topic)
            .is_some_and(|t| t.contains(&connection))
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.state().topics.len()
    }

    /// Number of connections subscribed to `topic`; zero for unknown topics.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state().topics.get(topic).map_or(0, Topic::len)
    }

    /// Number of topics `connection` is subscribed to.
    pub fn subscription_count(&self, connection: ConnectionId) -> usize {
        self.state()
            .memberships
            .get(&connection)
            .map_or(0, HashSet::len)
    }
}
