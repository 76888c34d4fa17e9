//! Topic management
//!
//! A `Topic` is one chat's subscriber set. Subscribers are keyed by
//! connection id, so duplicate subscriptions are a no-op and removal is O(1).
//!
//! Concurrency note: `Topic` is not synchronized itself; it is only ever
//! touched through the registry lock.

use std::collections::HashMap;

use crate::client::{ConnectionHandle, ConnectionId};

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    subscribers: HashMap<ConnectionId, ConnectionHandle>,
}

impl Topic {
    /// Creates an empty topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    /// Adds a subscriber. Returns `false` if it was already subscribed.
    pub fn subscribe(&mut self, handle: &ConnectionHandle) -> bool {
        if self.subscribers.contains_key(&handle.id()) {
            return false;
        }
        self.subscribers.insert(handle.id(), handle.clone());
        true
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: &ConnectionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Whether the connection is subscribed to this topic.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.subscribers.contains_key(id)
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the topic has no subscribers left.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Owned copy of the current subscribers.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.subscribers.values().cloned().collect()
    }
}
