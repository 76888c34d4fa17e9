//! The broker is the relay core: the subscription registry and the fan-out
//! dispatcher, wired together by `Relay`.
//!
//! There is no global instance. `Relay::new` builds a registry and a broadcast
//! queue; the caller spawns the returned `Dispatcher` and hands clones of the
//! `Relay` to whatever accepts connections.

pub mod dispatcher;
pub mod registry;
pub mod topic;

use std::sync::Arc;

pub use dispatcher::{BroadcastSender, Dispatcher, FanOutReport};
pub use registry::Registry;

#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<Registry>,
    queue: BroadcastSender,
}

impl Relay {
    pub fn new(queue_capacity: usize) -> (Self, Dispatcher) {
        let registry = Arc::new(Registry::new());
        let (queue, dispatcher) = dispatcher::broadcast_queue(registry.clone(), queue_capacity);
        (Self { registry, queue }, dispatcher)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn queue(&self) -> &BroadcastSender {
        &self.queue
    }
}
