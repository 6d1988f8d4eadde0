//! Enforces the two safety invariants promise monotonicity and accept
//! safety, and forwards to every learner on a successful accept. Grounded
//! on `original_source/paxos/acceptor.py`'s `_handle_prepare` (strict `>`)
//! and `_handle_accept` (`>=`) pair.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::{Ballot, Message, Operation};
use crate::node::{BoxFuture, Handler, Node};

struct State<O> {
    highest_promised: Ballot,
    accepted: Option<(Ballot, O)>,
}

/// `highest_promised` starts at the zero ballot. Valid ballots are always
/// `ordinal * BALLOT_BAND + counter` with `counter >= 1` and `ordinal >= 1`
/// (roster ids are `<role>_<ordinal>` with a positive ordinal), so zero
/// never collides with a real ballot and safely means "no promise yet".
impl<O> Default for State<O> {
    fn default() -> Self {
        State { highest_promised: Ballot::from_raw(0), accepted: None }
    }
}

pub struct Acceptor<O: Operation> {
    node: Arc<Node<O>>,
    learner_ids: Vec<String>,
    state: Mutex<State<O>>,
}

impl<O: Operation> Acceptor<O> {
    pub fn new(node: Arc<Node<O>>, learner_ids: Vec<String>) -> Arc<Self> {
        Arc::new(Acceptor { node, learner_ids, state: Mutex::new(State::default()) })
    }

    pub fn highest_promised(&self) -> Ballot {
        self.state.lock().highest_promised
    }

    pub fn accepted(&self) -> Option<(Ballot, O)> {
        self.state.lock().accepted.clone()
    }

    /// Seeds the accepted pair without touching `highest_promised` —
    /// restores only what a crash-recovery path that persists the accepted
    /// pair but not the in-memory promise ceiling would have (see the
    /// durable-recovery design note this protocol otherwise doesn't
    /// implement). Intended for bringing up a node with pre-existing
    /// accepted state; not invoked by message handling.
    pub fn seed(&self, accepted_ballot: Ballot, operation: O) {
        self.state.lock().accepted = Some((accepted_ballot, operation));
    }

    fn handle_prepare(&self, sender_id: String, timestamp: Ballot) {
        let reply = {
            let mut state = self.state.lock();
            if timestamp > state.highest_promised {
                state.highest_promised = timestamp;
                let (accepted_timestamp, accepted_operation) = match &state.accepted {
                    Some((ballot, operation)) => (Some(*ballot), Some(operation.clone())),
                    None => (None, None),
                };
                Message::Promise {
                    timestamp,
                    sender_id: self.node.id.clone(),
                    receiver_id: sender_id,
                    accepted_timestamp,
                    accepted_operation,
                }
            } else {
                Message::Nack { timestamp, sender_id: self.node.id.clone(), receiver_id: sender_id }
            }
        };
        let receiver_id = reply.receiver_id().to_string();
        self.node.send(&receiver_id, reply);
    }

    fn handle_accept(&self, sender_id: String, timestamp: Ballot, operation: O) {
        let honored = {
            let mut state = self.state.lock();
            if timestamp >= state.highest_promised {
                state.highest_promised = timestamp;
                state.accepted = Some((timestamp, operation.clone()));
                true
            } else {
                false
            }
        };
        if honored {
            for learner_id in &self.learner_ids {
                self.node.send(
                    learner_id,
                    Message::Learn {
                        timestamp,
                        sender_id: self.node.id.clone(),
                        receiver_id: learner_id.clone(),
                        operation: operation.clone(),
                    },
                );
            }
        } else {
            self.node.send(
                &sender_id.clone(),
                Message::Nack { timestamp, sender_id: self.node.id.clone(), receiver_id: sender_id },
            );
        }
    }
}

impl<O: Operation> Handler<O> for Acceptor<O> {
    fn handle(&self, sender_id: String, message: Message<O>) -> BoxFuture<'static, ()> {
        match message {
            Message::Prepare { timestamp, .. } => self.handle_prepare(sender_id, timestamp),
            Message::Accept { timestamp, operation, .. } => self.handle_accept(sender_id, timestamp, operation),
            other => log::warn!("{}: dropping role-foreign {other}", self.node.id),
        }
        Box::pin(async {})
    }
}
