//! Fan-out dispatcher
//!
//! Sessions push payloads onto a bounded broadcast queue; a single dispatcher
//! task drains it in order and writes each payload to the topic's current
//! subscribers. Because there is one consumer, delivery order per topic
//! matches enqueue order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::registry::Registry;
use crate::transport::message::PayloadEnvelope;
use crate::utils::error::RelayError;

/// Producer side of the broadcast queue. Cloned into every session.
#[derive(Debug, Clone)]
pub struct BroadcastSender {
    tx: mpsc::Sender<PayloadEnvelope>,
}

impl BroadcastSender {
    /// Queues a payload, waiting while the queue is full.
    pub async fn enqueue(&self, envelope: PayloadEnvelope) -> Result<(), RelayError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| RelayError::QueueClosed)
    }
}

/// Outcome of one fan-out round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    queue: mpsc::Receiver<PayloadEnvelope>,
}

/// Creates the broadcast queue and the dispatcher that consumes it.
pub fn broadcast_queue(registry: Arc<Registry>, capacity: usize) -> (BroadcastSender, Dispatcher) {
    let (tx, queue) = mpsc::channel(capacity.max(1));
    (BroadcastSender { tx }, Dispatcher { registry, queue })
}

impl Dispatcher {
    /// Drains the queue until every `BroadcastSender` is dropped.
    pub async fn run(mut self) {
        info!("dispatcher started");
        while let Some(envelope) = self.queue.recv().await {
            self.fan_out(&envelope);
        }
        info!("dispatcher stopped");
    }

    /// Writes `envelope` to every current subscriber of its topic.
    ///
    /// A failing subscriber never stops delivery to the others. It is closed
    /// so its own session tears it down; the registry is left untouched here.
    pub fn fan_out(&self, envelope: &PayloadEnvelope) -> FanOutReport {
        let subscribers = self.registry.subscribers_of(envelope.topic());
        let mut report = FanOutReport::default();
        if subscribers.is_empty() {
            debug!(topic = envelope.topic(), "no subscribers");
            return report;
        }

        let frame = envelope.to_frame();
        for subscriber in &subscribers {
            match subscriber.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(topic = envelope.topic(), error = %e, "dispatch failed");
                    if !e.is_fatal_for_connection() {
                        subscriber.close();
                    }
                }
            }
        }

        debug!(
            topic = envelope.topic(),
            delivered = report.delivered,
            failed = report.failed,
            "fan-out complete"
        );
        report
    }
}
