//! End-to-end consensus scenarios driven over the simulated transport.

use std::sync::Arc;
use std::time::Duration;

use paxos::transport::sim::SimConfig;
use paxos::{Acceptor, Ballot, Handler, Learner, Node, Proposer, SimTransport, Transport};

struct Fleet {
    transport: Arc<SimTransport<String>>,
    proposer: Arc<Proposer<String>>,
    acceptors: Vec<Arc<Acceptor<String>>>,
    learners: Vec<Arc<Learner<String>>>,
}

fn build_fleet(num_acceptors: usize, num_learners: usize, config: SimConfig) -> Fleet {
    let transport = Arc::new(SimTransport::<String>::new(config));
    let as_dyn = transport.clone() as Arc<dyn Transport<String>>;

    let acceptor_ids: Vec<String> = (0..num_acceptors).map(|i| format!("acceptor_{i}")).collect();
    let learner_ids: Vec<String> = (0..num_learners).map(|i| format!("learner_{i}")).collect();

    let proposer_node = Node::new("proposer_1", as_dyn.clone());
    let proposer = Proposer::new(Arc::clone(&proposer_node), acceptor_ids.clone());
    proposer_node.start(Arc::clone(&proposer) as Arc<dyn Handler<String>>);

    let mut acceptors = Vec::new();
    for id in &acceptor_ids {
        let node = Node::new(id.clone(), as_dyn.clone());
        let acceptor = Acceptor::new(node.clone(), learner_ids.clone());
        node.start(Arc::clone(&acceptor) as Arc<dyn Handler<String>>);
        acceptors.push(acceptor);
    }

    let mut learners = Vec::new();
    for id in &learner_ids {
        let node = Node::new(id.clone(), as_dyn.clone());
        let learner = Learner::new(node.clone(), acceptor_ids.len());
        node.start(Arc::clone(&learner) as Arc<dyn Handler<String>>);
        learners.push(learner);
    }

    Fleet { transport, proposer, acceptors, learners }
}

fn fast_config() -> SimConfig {
    SimConfig { min_delay: Duration::from_millis(0), max_delay: Duration::from_millis(2), message_loss_probability: 0.0 }
}

async fn wait_for_sequences(learners: &[Arc<Learner<String>>], expect_len: usize, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if learners.iter().all(|l| l.get_chosen_operations().len() >= expect_len) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn happy_path() {
    let fleet = build_fleet(5, 2, fast_config());
    let ballot = fleet.proposer.propose("x".to_string()).await;
    assert_eq!(ballot, Ballot::new(1, 1));

    wait_for_sequences(&fleet.learners, 1, Duration::from_secs(2)).await;
    for learner in &fleet.learners {
        assert_eq!(learner.get_chosen_operations(), vec!["x".to_string()]);
    }
}

#[tokio::test]
async fn pick_highest_accepted_value_wins() {
    let fleet = build_fleet(5, 2, fast_config());
    // A1..A3 already hold an accepted value from a prior round at a higher
    // ballot than the one proposer_1 is about to use.
    for acceptor in &fleet.acceptors[0..3] {
        acceptor.seed(Ballot::new(2, 1), "y".to_string());
    }

    fleet.proposer.propose("x".to_string()).await;

    wait_for_sequences(&fleet.learners, 1, Duration::from_secs(2)).await;
    for learner in &fleet.learners {
        assert_eq!(learner.get_chosen_operations(), vec!["y".to_string()]);
    }
}

#[tokio::test]
async fn duelling_proposers_higher_ballot_wins() {
    let fleet = build_fleet(5, 2, fast_config());
    let as_dyn = fleet.transport.clone() as Arc<dyn Transport<String>>;

    let proposer_2_node = Node::new("proposer_2", as_dyn.clone());
    let acceptor_ids: Vec<String> = (0..5).map(|i| format!("acceptor_{i}")).collect();
    let proposer_2 = Proposer::new(Arc::clone(&proposer_2_node), acceptor_ids);
    proposer_2_node.start(Arc::clone(&proposer_2) as Arc<dyn Handler<String>>);

    // proposer_2's PREPARE reaches the acceptors first and wins the
    // majority; proposer_1's lower ballot is NACKed at ACCEPT time.
    proposer_2.propose("b".to_string()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    fleet.proposer.propose("a".to_string()).await;

    wait_for_sequences(&fleet.learners, 1, Duration::from_secs(2)).await;
    for learner in &fleet.learners {
        assert_eq!(learner.get_chosen_operations(), vec!["b".to_string()]);
    }
}

#[tokio::test]
async fn minority_failure_still_reaches_quorum() {
    let fleet = build_fleet(5, 2, fast_config());
    fleet.transport.fail("acceptor_0");
    fleet.transport.fail("acceptor_1");

    fleet.proposer.propose("z".to_string()).await;

    wait_for_sequences(&fleet.learners, 1, Duration::from_secs(2)).await;
    for learner in &fleet.learners {
        assert_eq!(learner.get_chosen_operations(), vec!["z".to_string()]);
    }
}

#[tokio::test]
async fn majority_failure_never_reaches_quorum() {
    let fleet = build_fleet(5, 2, fast_config());
    fleet.transport.fail("acceptor_0");
    fleet.transport.fail("acceptor_1");
    fleet.transport.fail("acceptor_2");

    let ballot = fleet.proposer.propose("q".to_string()).await;

    wait_for_sequences(&fleet.learners, 1, Duration::from_millis(500)).await;
    for learner in &fleet.learners {
        assert!(learner.get_chosen_operations().is_empty());
    }
    // The proposal record is still sitting in phase 1, not abandoned.
    assert!(fleet.proposer.active_ballots().contains(&ballot));
}

#[tokio::test]
async fn lossy_transport_converges_to_the_same_value_or_not_at_all() {
    for _ in 0..10 {
        let fleet = build_fleet(5, 2, SimConfig {
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(2),
            message_loss_probability: 0.3,
        });
        fleet.proposer.propose("r".to_string()).await;
        wait_for_sequences(&fleet.learners, 1, Duration::from_millis(300)).await;
        for learner in &fleet.learners {
            let sequence = learner.get_chosen_operations();
            assert!(sequence.is_empty() || sequence == vec!["r".to_string()]);
        }
    }
}
