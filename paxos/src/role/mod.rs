//! The three Paxos role state machines. Each wraps a [`crate::node::Node`]
//! and implements [`crate::node::Handler`] so it can be wired into that
//! node's receive loop.

pub mod acceptor;
pub mod learner;
pub mod proposer;

pub use acceptor::Acceptor;
pub use learner::Learner;
pub use proposer::Proposer;
