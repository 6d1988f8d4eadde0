//! # Summary
//!
//! The shared scaffolding every role sits on: an id, a handle to the
//! transport, a receive loop that spawns one task per inbound message (so a
//! slow handler for one message never blocks the next), and a cooperative
//! stop. Mirrors the teacher's `shared::Shared` hub in spirit, minus the
//! Multi-Paxos routing table this protocol doesn't need.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::message::{Message, Operation};
use crate::transport::Transport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-message dispatch target. Each role implements this once, over
/// `Arc<Self>`, so the boxed future can clone the role and run independently
/// of the receive loop.
pub trait Handler<O: Operation>: Send + Sync + 'static {
    fn handle(&self, sender_id: String, message: Message<O>) -> BoxFuture<'static, ()>;
}

/// Common node scaffolding: id, transport handle, receive loop lifecycle.
pub struct Node<O: Operation> {
    pub id: String,
    transport: Arc<dyn Transport<O>>,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<O: Operation> Node<O> {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport<O>>) -> Arc<Self> {
        Arc::new(Node {
            id: id.into(),
            transport,
            shutdown: Notify::new(),
            task: Mutex::new(None),
        })
    }

    /// Spawns the receive loop, dispatching every inbound message to a
    /// fresh task running `handler.handle`. Replaces any previously running
    /// loop (calling `start` twice restarts it).
    pub fn start(self: &Arc<Self>, handler: Arc<dyn Handler<O>>) {
        let mut inbound = self.transport.register(&self.id);
        let node = Arc::clone(self);
        let loop_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = node.shutdown.notified() => break,
                    received = inbound.recv() => {
                        match received {
                            Some((sender_id, message)) => {
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move { handler.handle(sender_id, message).await });
                            }
                            None => break,
                        }
                    }
                }
            }
        });
        if let Some(previous) = self.task.lock().replace(loop_handle) {
            previous.abort();
        }
    }

    /// Signals the receive loop to exit after its current iteration. Does
    /// not cancel in-flight per-message handler tasks.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    pub fn send(&self, receiver_id: &str, message: Message<O>) {
        self.transport.send(&self.id, receiver_id, message);
    }
}
