//! Drives Phase 1 -> Phase 2, tallying PROMISEs and NACKs per ballot under
//! one guard so the promote-on-quorum decision can never race with itself.
//! Grounded on `original_source/paxos/proposer.py`'s `active_proposals`
//! table and its lock-guarded `_handle_promise`/`_handle_nack`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::message::{Ballot, Message, Operation};
use crate::node::{BoxFuture, Handler, Node};
use crate::roster;

struct Proposal<O> {
    original_operation: O,
    phase: u8,
    promises: usize,
    nacks: usize,
    responded: HashSet<String>,
    highest_accepted: Option<(Ballot, O)>,
    acceptor_count: usize,
    created_at: Instant,
}

/// Drives one Paxos ballot at a time per call to `propose`, and can run
/// many ballots concurrently: the table is keyed by ballot, not by a single
/// "current round" slot.
pub struct Proposer<O: Operation> {
    node: Arc<Node<O>>,
    acceptor_ids: Vec<String>,
    counter: AtomicU64,
    ordinal: u64,
    proposals: Mutex<HashMap<Ballot, Proposal<O>>>,
}

impl<O: Operation> Proposer<O> {
    pub fn new(node: Arc<Node<O>>, acceptor_ids: Vec<String>) -> Arc<Self> {
        let ordinal = roster::ordinal(&node.id);
        Arc::new(Proposer {
            node,
            acceptor_ids,
            counter: AtomicU64::new(0),
            ordinal,
            proposals: Mutex::new(HashMap::new()),
        })
    }

    /// Mints a fresh ballot, registers its proposal record, broadcasts
    /// PREPARE to every acceptor, and returns the ballot as a handle. The
    /// broadcast runs on a spawned task so this call never blocks on
    /// network I/O.
    pub async fn propose(&self, operation: O) -> Ballot {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let ballot = Ballot::new(self.ordinal, counter);
        let proposal = Proposal {
            original_operation: operation,
            phase: 1,
            promises: 0,
            nacks: 0,
            responded: HashSet::new(),
            highest_accepted: None,
            acceptor_count: self.acceptor_ids.len(),
            created_at: Instant::now(),
        };
        self.proposals.lock().insert(ballot, proposal);
        log::info!("{}: proposing ballot {ballot}", self.node.id);
        self.broadcast_prepare(ballot);
        ballot
    }

    fn broadcast_prepare(&self, ballot: Ballot) {
        let node = Arc::clone(&self.node);
        let acceptor_ids = self.acceptor_ids.clone();
        tokio::spawn(async move {
            for acceptor_id in acceptor_ids {
                node.send(
                    &acceptor_id,
                    Message::Prepare { timestamp: ballot, sender_id: node.id.clone(), receiver_id: acceptor_id.clone() },
                );
            }
        });
    }

    fn broadcast_accept(&self, ballot: Ballot, operation: O) {
        let node = Arc::clone(&self.node);
        let acceptor_ids = self.acceptor_ids.clone();
        tokio::spawn(async move {
            for acceptor_id in acceptor_ids {
                node.send(
                    &acceptor_id,
                    Message::Accept {
                        timestamp: ballot,
                        sender_id: node.id.clone(),
                        receiver_id: acceptor_id.clone(),
                        operation: operation.clone(),
                    },
                );
            }
        });
    }

    /// Removes proposal records older than `max_age` that never reached a
    /// quorum promise or quorum nack. Exposed for the simulator's periodic
    /// sweep rather than spawned automatically, so the library has no
    /// hidden background tasks.
    pub fn gc_sweep(&self, max_age: Duration) {
        let now = Instant::now();
        let mut proposals = self.proposals.lock();
        let before = proposals.len();
        proposals.retain(|_, proposal| now.duration_since(proposal.created_at) < max_age);
        let swept = before - proposals.len();
        if swept > 0 {
            log::debug!("{}: gc swept {swept} stale proposal(s)", self.node.id);
        }
    }

    pub fn active_ballots(&self) -> Vec<Ballot> {
        self.proposals.lock().keys().copied().collect()
    }

    fn handle_promise(
        &self,
        sender_id: String,
        timestamp: Ballot,
        accepted_timestamp: Option<Ballot>,
        accepted_operation: Option<O>,
    ) {
        let broadcast_value = {
            let mut proposals = self.proposals.lock();
            let Some(proposal) = proposals.get_mut(&timestamp) else {
                log::warn!("{}: PROMISE for unknown ballot {timestamp} from {sender_id}", self.node.id);
                return;
            };
            if !proposal.responded.insert(sender_id.clone()) {
                log::warn!("{}: duplicate PROMISE from {sender_id} for {timestamp}", self.node.id);
                return;
            }
            proposal.promises += 1;
            if let Some(accepted_ballot) = accepted_timestamp {
                let replace = match &proposal.highest_accepted {
                    Some((current, _)) => accepted_ballot > *current,
                    None => true,
                };
                if replace {
                    let operation = accepted_operation
                        .expect("PROMISE carrying accepted_timestamp must also carry accepted_operation");
                    proposal.highest_accepted = Some((accepted_ballot, operation));
                }
            }
            if proposal.phase == 1 && proposal.promises * 2 > proposal.acceptor_count {
                proposal.phase = 2;
                let value = proposal
                    .highest_accepted
                    .as_ref()
                    .map(|(_, operation)| operation.clone())
                    .unwrap_or_else(|| proposal.original_operation.clone());
                Some(value)
            } else {
                None
            }
        };
        if let Some(value) = broadcast_value {
            log::info!("{}: ballot {timestamp} reached promise quorum, broadcasting ACCEPT", self.node.id);
            self.broadcast_accept(timestamp, value);
        }
    }

    fn handle_nack(&self, sender_id: String, timestamp: Ballot) {
        let mut proposals = self.proposals.lock();
        let Some(proposal) = proposals.get_mut(&timestamp) else {
            log::warn!("{}: NACK for unknown ballot {timestamp} from {sender_id}", self.node.id);
            return;
        };
        if !proposal.responded.insert(sender_id.clone()) {
            log::warn!("{}: duplicate NACK from {sender_id} for {timestamp}", self.node.id);
            return;
        }
        proposal.nacks += 1;
        if proposal.nacks * 2 > proposal.acceptor_count {
            proposals.remove(&timestamp);
            log::info!("{}: abandoning ballot {timestamp} after nack majority", self.node.id);
        }
    }
}

impl<O: Operation> Handler<O> for Proposer<O> {
    fn handle(&self, sender_id: String, message: Message<O>) -> BoxFuture<'static, ()> {
        match message {
            Message::Promise { timestamp, accepted_timestamp, accepted_operation, .. } => {
                self.handle_promise(sender_id, timestamp, accepted_timestamp, accepted_operation)
            }
            Message::Nack { timestamp, .. } => self.handle_nack(sender_id, timestamp),
            other => log::warn!("{}: dropping role-foreign {other}", self.node.id),
        }
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sim::{SimConfig, SimTransport};
    use crate::transport::Transport;
    use std::time::Duration;

    fn fixture(num_acceptors: usize) -> Arc<Proposer<String>> {
        let transport: Arc<dyn Transport<String>> = Arc::new(SimTransport::new(SimConfig {
            min_delay: Duration::ZERO,
            max_delay: Duration::from_millis(1),
            message_loss_probability: 0.0,
        }));
        let node = Node::new("proposer_1", transport);
        let acceptor_ids = (0..num_acceptors).map(|i| format!("acceptor_{i}")).collect();
        Proposer::new(node, acceptor_ids)
    }

    #[tokio::test]
    async fn propose_mints_a_ballot_from_its_ordinal() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        assert_eq!(ballot, Ballot::new(1, 1));
        let second = proposer.propose("y".to_string()).await;
        assert_eq!(second, Ballot::new(1, 2));
    }

    #[tokio::test]
    async fn promise_quorum_promotes_to_phase_two_with_own_value() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.handle_promise("acceptor_0".into(), ballot, None, None);
        proposer.handle_promise("acceptor_1".into(), ballot, None, None);
        proposer.handle_promise("acceptor_2".into(), ballot, None, None);
        let proposals = proposer.proposals.lock();
        assert_eq!(proposals.get(&ballot).unwrap().phase, 2);
    }

    #[tokio::test]
    async fn pick_highest_prefers_largest_reported_accepted_ballot() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.handle_promise("acceptor_0".into(), ballot, Some(Ballot::new(2, 1)), Some("y".to_string()));
        proposer.handle_promise("acceptor_1".into(), ballot, Some(Ballot::new(3, 1)), Some("z".to_string()));
        proposer.handle_promise("acceptor_2".into(), ballot, None, None);
        let proposals = proposer.proposals.lock();
        let proposal = proposals.get(&ballot).unwrap();
        assert_eq!(proposal.highest_accepted, Some((Ballot::new(3, 1), "z".to_string())));
    }

    #[tokio::test]
    async fn duplicate_promise_from_same_acceptor_is_ignored() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.handle_promise("acceptor_0".into(), ballot, None, None);
        proposer.handle_promise("acceptor_0".into(), ballot, None, None);
        let proposals = proposer.proposals.lock();
        assert_eq!(proposals.get(&ballot).unwrap().promises, 1);
    }

    #[tokio::test]
    async fn nack_majority_abandons_the_proposal() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.handle_nack("acceptor_0".into(), ballot);
        proposer.handle_nack("acceptor_1".into(), ballot);
        proposer.handle_nack("acceptor_2".into(), ballot);
        assert!(proposer.proposals.lock().get(&ballot).is_none());
    }

    #[tokio::test]
    async fn late_promise_after_phase_two_does_not_retrigger() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.handle_promise("acceptor_0".into(), ballot, None, None);
        proposer.handle_promise("acceptor_1".into(), ballot, None, None);
        proposer.handle_promise("acceptor_2".into(), ballot, None, None);
        // Already in phase 2; one more promise must not re-run the phase
        // transition or panic.
        proposer.handle_promise("acceptor_3".into(), ballot, None, None);
        let proposals = proposer.proposals.lock();
        assert_eq!(proposals.get(&ballot).unwrap().phase, 2);
    }

    #[tokio::test]
    async fn gc_sweep_removes_only_stale_proposals() {
        let proposer = fixture(5);
        let ballot = proposer.propose("x".to_string()).await;
        proposer.gc_sweep(Duration::from_secs(3600));
        assert!(proposer.proposals.lock().contains_key(&ballot));
        proposer.gc_sweep(Duration::from_secs(0));
        assert!(!proposer.proposals.lock().contains_key(&ballot));
    }
}
