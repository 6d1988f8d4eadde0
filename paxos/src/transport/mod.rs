//! # Summary
//!
//! The pluggable delivery primitive every role sends and receives through.
//! Two implementations: [`sim::SimTransport`], an in-process lossy/delayed
//! transport for the simulator and the test suite, and
//! [`udp::UdpTransport`], a real `UdpSocket`-backed transport that speaks
//! the JSON wire format over the network.

pub mod sim;
pub mod udp;

use tokio::sync::mpsc;

use crate::message::{Message, Operation};

pub use sim::SimTransport;
pub use udp::UdpTransport;

/// A best-effort, asynchronous, non-FIFO, non-duplicating delivery
/// primitive. `send` never blocks on delivery; `register` hands the caller
/// an inbound queue for one node id.
pub trait Transport<O: Operation>: Send + Sync + 'static {
    /// Registers a node id with this transport and returns the channel its
    /// inbound messages arrive on, tagged with the sender's id. Registering
    /// the same id twice replaces the previous registration.
    fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<(String, Message<O>)>;

    /// Hands a message to the transport for delivery to `receiver_id`. May
    /// silently drop the message (unknown receiver, injected loss, a failed
    /// node) per the transport's own policy; callers never learn whether a
    /// given send was delivered.
    fn send(&self, sender_id: &str, receiver_id: &str, message: Message<O>);
}
