//! Aggregates independent LEARN notifications into a single chosen
//! sequence. Grounded on `original_source/paxos/learner.py`'s
//! `accepted_operations`/`chosen_operations`/`chosen_operation_sequence`
//! triple and its single-slot `on_chosen_operation` callback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::{Ballot, Message, Operation};
use crate::node::{BoxFuture, Handler, Node};

type ChosenCallback<O> = dyn Fn(O) + Send + Sync;

struct State<O> {
    accepted_by: HashMap<(Ballot, O), HashSet<String>>,
    chosen_keys: HashSet<(Ballot, O)>,
    sequence: Vec<O>,
}

impl<O> Default for State<O> {
    fn default() -> Self {
        State { accepted_by: HashMap::new(), chosen_keys: HashSet::new(), sequence: Vec::new() }
    }
}

pub struct Learner<O: Operation> {
    node: Arc<Node<O>>,
    acceptor_count: usize,
    state: Mutex<State<O>>,
    on_chosen: Mutex<Option<Arc<ChosenCallback<O>>>>,
}

impl<O: Operation> Learner<O> {
    pub fn new(node: Arc<Node<O>>, acceptor_count: usize) -> Arc<Self> {
        Arc::new(Learner {
            node,
            acceptor_count,
            state: Mutex::new(State::default()),
            on_chosen: Mutex::new(None),
        })
    }

    /// Installs the single-slot chosen-operation callback, replacing any
    /// previously set one.
    pub fn set_on_chosen(&self, callback: impl Fn(O) + Send + Sync + 'static) {
        *self.on_chosen.lock() = Some(Arc::new(callback));
    }

    /// A snapshot copy of the ordered chosen sequence.
    pub fn get_chosen_operations(&self) -> Vec<O> {
        self.state.lock().sequence.clone()
    }

    fn handle_learn(&self, sender_id: String, timestamp: Ballot, operation: O) {
        let newly_chosen = {
            let mut state = self.state.lock();
            let key = (timestamp, operation.clone());
            let acceptors = state.accepted_by.entry(key.clone()).or_default();
            acceptors.insert(sender_id);
            let has_quorum = acceptors.len() * 2 > self.acceptor_count;
            if has_quorum && !state.chosen_keys.contains(&key) {
                state.chosen_keys.insert(key);
                state.sequence.push(operation.clone());
                Some(operation)
            } else {
                None
            }
        };
        if let Some(operation) = newly_chosen {
            log::info!("{}: chose {operation:?} at ballot {timestamp}", self.node.id);
            let callback = self.on_chosen.lock().clone();
            if let Some(callback) = callback {
                callback(operation);
            }
        }
    }
}

impl<O: Operation> Handler<O> for Learner<O> {
    fn handle(&self, sender_id: String, message: Message<O>) -> BoxFuture<'static, ()> {
        match message {
            Message::Learn { timestamp, operation, .. } => self.handle_learn(sender_id, timestamp, operation),
            other => log::warn!("{}: dropping role-foreign {other}", self.node.id),
        }
        Box::pin(async {})
    }
}
