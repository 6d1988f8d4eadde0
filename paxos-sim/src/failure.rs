//! Periodic random node failure/recovery, ported from
//! `original_source/network/failures.py`'s `FailureSimulator`: a background
//! loop rolls the dice for every live node on each tick, then separately
//! rolls recovery odds for every currently-failed node.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use paxos::SimTransport;

pub struct FailureInjector<O> {
    transport: Arc<SimTransport<O>>,
    node_ids: Vec<String>,
    failure_probability: f64,
    recovery_probability: f64,
    failed: Mutex<HashSet<String>>,
    stop: Notify,
}

impl<O: paxos::Operation> FailureInjector<O> {
    pub fn new(
        transport: Arc<SimTransport<O>>,
        node_ids: Vec<String>,
        failure_probability: f64,
        recovery_probability: f64,
    ) -> Arc<Self> {
        Arc::new(FailureInjector {
            transport,
            node_ids,
            failure_probability,
            recovery_probability,
            failed: Mutex::new(HashSet::new()),
            stop: Notify::new(),
        })
    }

    /// Spawns the check loop at the given interval. Stop with [`Self::stop`].
    pub fn spawn(self: &Arc<Self>, check_interval: Duration) -> JoinHandle<()> {
        let injector = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = injector.stop.notified() => break,
                    _ = tokio::time::sleep(check_interval) => {
                        injector.check_failures();
                        injector.check_recoveries();
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        self.stop.notify_one();
    }

    fn check_failures(&self) {
        let mut rng = rand::thread_rng();
        let candidates: Vec<String> = {
            let failed = self.failed.lock();
            self.node_ids.iter().filter(|id| !failed.contains(*id)).cloned().collect()
        };
        for node_id in candidates {
            if rng.gen_bool(self.failure_probability) {
                self.fail(&node_id);
            }
        }
    }

    fn check_recoveries(&self) {
        let mut rng = rand::thread_rng();
        let candidates: Vec<String> = self.failed.lock().iter().cloned().collect();
        for node_id in candidates {
            if rng.gen_bool(self.recovery_probability) {
                self.recover(&node_id);
            }
        }
    }

    fn fail(&self, node_id: &str) {
        self.failed.lock().insert(node_id.to_string());
        self.transport.fail(node_id);
        log::info!("simulated failure of node {node_id}");
    }

    fn recover(&self, node_id: &str) {
        self.failed.lock().remove(node_id);
        self.transport.recover(node_id);
        log::info!("simulated recovery of node {node_id}");
    }

    /// Forces a specific node to fail, independent of the random schedule.
    pub fn fail_node(&self, node_id: &str) -> bool {
        if self.failed.lock().contains(node_id) {
            return false;
        }
        self.fail(node_id);
        true
    }

    /// Forces a specific node to recover, independent of the random schedule.
    pub fn recover_node(&self, node_id: &str) -> bool {
        if !self.failed.lock().contains(node_id) {
            return false;
        }
        self.recover(node_id);
        true
    }
}
