//! Binary entry point: wires a roster of in-process Paxos nodes together
//! over a lossy simulated transport, injects node failures per CLI flag,
//! issues one test proposal, and reports whether consensus was reached —
//! the Rust-native analogue of `original_source/main.py`'s `run_simulation`.

mod failure;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use rand::seq::SliceRandom;

use paxos::transport::sim::SimConfig;
use paxos::{Acceptor, Learner, Node, Proposer, Roster, SimTransport, Transport};

use failure::FailureInjector;

#[derive(Parser, Debug)]
#[command(name = "paxos-sim", about = "Paxos consensus algorithm simulator")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: String,

    /// Generate a default configuration file
    #[arg(long)]
    generate_config: bool,

    /// Number of proposers to generate in the default config
    #[arg(long, default_value_t = 3)]
    num_proposers: usize,

    /// Number of acceptors to generate in the default config
    #[arg(long, default_value_t = 5)]
    num_acceptors: usize,

    /// Number of learners to generate in the default config
    #[arg(long, default_value_t = 2)]
    num_learners: usize,

    /// Logging level
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Probability of message loss (0.0-1.0)
    #[arg(long, default_value_t = 0.0)]
    message_loss: f64,

    /// Minimum message delay in seconds
    #[arg(long, default_value_t = 0.01)]
    min_delay: f64,

    /// Maximum message delay in seconds
    #[arg(long, default_value_t = 0.1)]
    max_delay: f64,

    /// Probability of node failure during a check
    #[arg(long, default_value_t = 0.05)]
    failure_prob: f64,

    /// Probability of node recovery during a check
    #[arg(long, default_value_t = 0.2)]
    recovery_prob: f64,
}

fn load_or_generate_config(args: &Args) -> Roster {
    if args.generate_config {
        let roster = paxos::generate_default_config(args.num_proposers, args.num_acceptors, args.num_learners);
        if let Err(err) = paxos::save_config(&roster, &args.config) {
            log::error!("failed to save generated configuration: {err}");
            std::process::exit(1);
        }
        log::info!("generated default configuration and saved to {}", args.config);
    }
    match paxos::load_config(&args.config) {
        Ok(roster) => roster,
        Err(err) => {
            log::error!("error loading configuration: {err}");
            std::process::exit(1);
        }
    }
}

struct Fleet {
    proposers: Vec<(String, Arc<Node<String>>, Arc<Proposer<String>>)>,
    acceptors: Vec<(String, Arc<Node<String>>, Arc<Acceptor<String>>)>,
    learners: Vec<(String, Arc<Node<String>>, Arc<Learner<String>>)>,
}

fn create_nodes(roster: &Roster, transport: &Arc<SimTransport<String>>) -> Fleet {
    let as_dyn = transport.clone() as Arc<dyn Transport<String>>;
    let acceptor_ids: Vec<String> = roster.acceptor_ids().map(str::to_string).collect();
    let learner_ids: Vec<String> = roster.learner_ids().map(str::to_string).collect();

    let mut proposers = Vec::new();
    for id in roster.proposer_ids() {
        let node = Node::new(id, as_dyn.clone());
        let proposer = Proposer::new(Arc::clone(&node), acceptor_ids.clone());
        node.start(Arc::clone(&proposer) as Arc<dyn paxos::Handler<String>>);
        proposers.push((id.to_string(), node, proposer));
    }

    let mut acceptors = Vec::new();
    for id in roster.acceptor_ids() {
        let node = Node::new(id, as_dyn.clone());
        let acceptor = Acceptor::new(Arc::clone(&node), learner_ids.clone());
        node.start(Arc::clone(&acceptor) as Arc<dyn paxos::Handler<String>>);
        acceptors.push((id.to_string(), node, acceptor));
    }

    let mut learners = Vec::new();
    for id in roster.learner_ids() {
        let node = Node::new(id, as_dyn.clone());
        let learner = Learner::new(Arc::clone(&node), acceptor_ids.len());
        node.start(Arc::clone(&learner) as Arc<dyn paxos::Handler<String>>);
        learners.push((id.to_string(), node, learner));
    }

    Fleet { proposers, acceptors, learners }
}

fn on_operation_chosen(operation: String) {
    log::info!("CONSENSUS REACHED: operation {operation:?} has been chosen!");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_path = logging::init(args.log_level);
    log::info!("logging initialized, log file: {}", log_path.display());

    let roster = load_or_generate_config(&args);

    let transport = Arc::new(SimTransport::<String>::new(SimConfig {
        min_delay: Duration::from_secs_f64(args.min_delay),
        max_delay: Duration::from_secs_f64(args.max_delay),
        message_loss_probability: args.message_loss,
    }));

    let fleet = create_nodes(&roster, &transport);

    for (_, _, learner) in &fleet.learners {
        learner.set_on_chosen(on_operation_chosen);
    }

    let all_ids: Vec<String> = roster.all_ids().map(str::to_string).collect();
    let injector = FailureInjector::new(Arc::clone(&transport), all_ids, args.failure_prob, args.recovery_prob);
    if args.failure_prob > 0.0 {
        injector.spawn(Duration::from_secs(5));
        log::info!("failure simulator started");
    }

    log::info!("starting all nodes...");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let Some((proposer_id, _, proposer)) = fleet.proposers.choose(&mut rand::thread_rng()) else {
        log::error!("no proposers configured");
        return ExitCode::FAILURE;
    };
    log::info!("selected proposer {proposer_id} to propose a value");

    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs();
    let operation = format!("test_operation_{now}");
    let ballot = proposer.propose(operation.clone()).await;
    log::info!("proposed operation {operation:?} with ballot {ballot}");

    let max_wait = Duration::from_secs(10);
    let poll_interval = Duration::from_millis(500);
    let gc_max_age = Duration::from_secs(30);
    let mut waited = Duration::ZERO;
    let mut consensus_reached = false;
    while waited < max_wait && !consensus_reached {
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
        for (_, _, proposer) in &fleet.proposers {
            proposer.gc_sweep(gc_max_age);
        }
        for (learner_id, _, learner) in &fleet.learners {
            if learner.get_chosen_operations().contains(&operation) {
                consensus_reached = true;
                log::info!("learner {learner_id} has learned the chosen operation: {operation}");
                break;
            }
        }
    }

    if consensus_reached {
        log::info!("paxos consensus algorithm successfully demonstrated!");
    } else {
        log::warn!("consensus not reached within the time limit; this could be due to simulated failures or message loss");
    }

    if args.failure_prob > 0.0 {
        injector.stop();
    }
    for (_, node, _) in &fleet.proposers {
        node.stop();
    }
    for (_, node, _) in &fleet.acceptors {
        node.stop();
    }
    for (_, node, _) in &fleet.learners {
        node.stop();
    }
    log::info!("simulation finished");

    if consensus_reached {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
