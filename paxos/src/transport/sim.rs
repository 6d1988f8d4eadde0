//! In-process transport grounded on `original_source/network/network.py` and
//! `original_source/network/failures.py`: a central registry of per-node
//! inbound queues, random delivery delay, a message-loss probability, and a
//! set of currently-"failed" node ids that silently swallow both outbound
//! and inbound traffic. Matches the teacher's `shared::State` hub pattern
//! (one lock-guarded map of channels rather than a delivery thread per
//! message).

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::mpsc;

use crate::message::{Message, Operation};
use crate::transport::Transport;

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub message_loss_probability: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
            message_loss_probability: 0.0,
        }
    }
}

struct Inner<O> {
    routes: RwLock<HashMap<String, mpsc::UnboundedSender<(String, Message<O>)>>>,
    failed: RwLock<HashSet<String>>,
    config: SimConfig,
}

/// An in-process transport for simulation and tests. Cheap to clone (an
/// `Arc` underneath); share one instance across every node in a run.
pub struct SimTransport<O> {
    inner: Arc<Inner<O>>,
    _marker: PhantomData<O>,
}

impl<O> Clone for SimTransport<O> {
    fn clone(&self) -> Self {
        SimTransport { inner: Arc::clone(&self.inner), _marker: PhantomData }
    }
}

impl<O: Operation> SimTransport<O> {
    pub fn new(config: SimConfig) -> Self {
        SimTransport {
            inner: Arc::new(Inner {
                routes: RwLock::new(HashMap::new()),
                failed: RwLock::new(HashSet::new()),
                config,
            }),
            _marker: PhantomData,
        }
    }

    /// Marks a node as failed: both its outbound sends and anything routed
    /// to it are dropped until `recover` is called. Mirrors
    /// `Network.simulate_node_failure`.
    pub fn fail(&self, node_id: &str) {
        self.inner.failed.write().insert(node_id.to_string());
        log::warn!("{node_id} marked failed");
    }

    /// Clears a node's failed flag. Mirrors `Network.simulate_node_recovery`.
    pub fn recover(&self, node_id: &str) {
        self.inner.failed.write().remove(node_id);
        log::info!("{node_id} recovered");
    }

    pub fn is_failed(&self, node_id: &str) -> bool {
        self.inner.failed.read().contains(node_id)
    }

    fn sample_delay(&self) -> Duration {
        let SimConfig { min_delay, max_delay, .. } = self.inner.config;
        if max_delay <= min_delay {
            return min_delay;
        }
        let span = (max_delay - min_delay).as_micros().max(1) as u64;
        let jitter = rand::thread_rng().gen_range(0..=span);
        min_delay + Duration::from_micros(jitter)
    }
}

impl<O: Operation> Transport<O> for SimTransport<O> {
    fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<(String, Message<O>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.routes.write().insert(node_id.to_string(), tx);
        rx
    }

    fn send(&self, sender_id: &str, receiver_id: &str, message: Message<O>) {
        if self.is_failed(sender_id) || self.is_failed(receiver_id) {
            log::debug!("dropping {message} {sender_id} -> {receiver_id}: node failed");
            return;
        }
        if self.inner.config.message_loss_probability > 0.0
            && rand::thread_rng().gen_bool(self.inner.config.message_loss_probability)
        {
            log::debug!("dropping {message} {sender_id} -> {receiver_id}: simulated loss");
            return;
        }
        let route = self.inner.routes.read().get(receiver_id).cloned();
        let Some(route) = route else {
            log::debug!("dropping {message} {sender_id} -> {receiver_id}: unknown receiver");
            return;
        };
        let delay = self.sample_delay();
        let sender_id = sender_id.to_string();
        let receiver_id = receiver_id.to_string();
        let failed = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if failed.failed.read().contains(&receiver_id) {
                log::debug!("dropping late delivery to {receiver_id}: failed by arrival");
                return;
            }
            let _ = route.send((sender_id, message));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Ballot;

    fn prepare(sender: &str, receiver: &str) -> Message<String> {
        Message::Prepare {
            timestamp: Ballot::new(1, 1),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_node() {
        let transport: SimTransport<String> = SimTransport::new(SimConfig {
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(1),
            message_loss_probability: 0.0,
        });
        let mut rx = transport.register("acceptor_0");
        transport.send("proposer_0", "acceptor_0", prepare("proposer_0", "acceptor_0"));
        let (from, message) = rx.recv().await.expect("message delivered");
        assert_eq!(from, "proposer_0");
        assert_eq!(message, prepare("proposer_0", "acceptor_0"));
    }

    #[tokio::test]
    async fn drops_to_unknown_receiver() {
        let transport: SimTransport<String> = SimTransport::new(SimConfig::default());
        // No register() call for "acceptor_0": send should not panic and
        // should simply not be observed anywhere.
        transport.send("proposer_0", "acceptor_0", prepare("proposer_0", "acceptor_0"));
    }

    #[tokio::test]
    async fn failed_node_drops_inbound_and_outbound() {
        let transport: SimTransport<String> = SimTransport::new(SimConfig {
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(1),
            message_loss_probability: 0.0,
        });
        let mut rx = transport.register("acceptor_0");
        transport.fail("acceptor_0");
        transport.send("proposer_0", "acceptor_0", prepare("proposer_0", "acceptor_0"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());

        transport.recover("acceptor_0");
        transport.send("proposer_0", "acceptor_0", prepare("proposer_0", "acceptor_0"));
        let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(received.is_ok());
    }

    #[tokio::test]
    async fn total_loss_probability_drops_everything() {
        let transport: SimTransport<String> = SimTransport::new(SimConfig {
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(1),
            message_loss_probability: 1.0,
        });
        let mut rx = transport.register("acceptor_0");
        transport.send("proposer_0", "acceptor_0", prepare("proposer_0", "acceptor_0"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
