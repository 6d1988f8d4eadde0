//! Single-decree Paxos: proposer, acceptor, and learner roles connected by
//! a pluggable transport.
//!
//! The wire codec and the transport are concerns an embedder supplies or
//! swaps out ([`transport::Transport`] has two implementations, one
//! in-process and one over real UDP); the role state machines in
//! [`role`] are the part of this crate that actually enforces Paxos's
//! safety invariants.

pub mod error;
pub mod message;
pub mod node;
pub mod role;
pub mod roster;
pub mod transport;

pub use error::{CodecError, ConfigError};
pub use message::{Ballot, Message, MessageKind, Operation, WireMessage, BALLOT_BAND};
pub use node::{Handler, Node};
pub use role::{Acceptor, Learner, Proposer};
pub use roster::{load_config, save_config, generate_default_config, NodeAddr, Roster};
pub use transport::{SimTransport, Transport, UdpTransport};
