//! # Summary
//!
//! Static id -> address configuration, loaded once at startup. Ported from
//! `utils/config_loader.py`: the same shape (`proposers`/`acceptors`/
//! `learners`, each a map from node id to an `{ip, port}` pair), the same
//! validation rule, and the same default-generation sizing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddr {
    pub ip: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// The static node-id -> address mapping every role consults to resolve a
/// send. Roles never discover peers dynamically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub proposers: HashMap<String, NodeAddr>,
    pub acceptors: HashMap<String, NodeAddr>,
    pub learners: HashMap<String, NodeAddr>,
}

impl Roster {
    /// Looks up a node id across all three role maps.
    pub fn resolve(&self, node_id: &str) -> Option<&NodeAddr> {
        self.proposers
            .get(node_id)
            .or_else(|| self.acceptors.get(node_id))
            .or_else(|| self.learners.get(node_id))
    }

    pub fn proposer_ids(&self) -> impl Iterator<Item = &str> {
        self.proposers.keys().map(String::as_str)
    }

    pub fn acceptor_ids(&self) -> impl Iterator<Item = &str> {
        self.acceptors.keys().map(String::as_str)
    }

    pub fn learner_ids(&self) -> impl Iterator<Item = &str> {
        self.learners.keys().map(String::as_str)
    }

    /// Every node id in the roster, role-tagged maps flattened.
    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.proposer_ids().chain(self.acceptor_ids()).chain(self.learner_ids())
    }
}

/// Parses the `<role>_<ordinal>` suffix out of a node id. Falls back to a
/// stable hash of the whole id when the suffix isn't an integer, so a
/// malformed id degrades to "some number" rather than panicking.
pub fn ordinal(node_id: &str) -> u64 {
    node_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or_else(|| {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            node_id.hash(&mut hasher);
            hasher.finish()
        })
}

/// Loads and validates a roster from a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Roster, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let roster: Roster = serde_json::from_str(&raw)?;
    validate_config(&roster)?;
    Ok(roster)
}

/// Writes a roster to a JSON config file, pretty-printed for human editing.
pub fn save_config(roster: &Roster, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let contents = serde_json::to_string_pretty(roster)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Every node entry needs a non-empty `ip` and a nonzero `port`, and every
/// role map needs at least one entry.
fn validate_config(roster: &Roster) -> Result<(), ConfigError> {
    if roster.proposers.is_empty() {
        return Err(ConfigError::Invalid("roster has no proposers".into()));
    }
    if roster.acceptors.is_empty() {
        return Err(ConfigError::Invalid("roster has no acceptors".into()));
    }
    if roster.learners.is_empty() {
        return Err(ConfigError::Invalid("roster has no learners".into()));
    }
    for (id, addr) in roster
        .proposers
        .iter()
        .chain(roster.acceptors.iter())
        .chain(roster.learners.iter())
    {
        if addr.ip.is_empty() {
            return Err(ConfigError::Invalid(format!("node {id:?} has an empty ip")));
        }
        if addr.port == 0 {
            return Err(ConfigError::Invalid(format!("node {id:?} has port 0")));
        }
    }
    Ok(())
}

/// Generates a default roster with the given role counts, bound to
/// loopback with the same port bands the reference implementation uses:
/// proposers from 8000, acceptors from 9000, learners from 10000.
pub fn generate_default_config(num_proposers: usize, num_acceptors: usize, num_learners: usize) -> Roster {
    let mut roster = Roster::default();
    for i in 0..num_proposers {
        roster.proposers.insert(
            format!("proposer_{}", i + 1),
            NodeAddr { ip: "127.0.0.1".into(), port: 8000 + i as u16 },
        );
    }
    for i in 0..num_acceptors {
        roster.acceptors.insert(
            format!("acceptor_{}", i + 1),
            NodeAddr { ip: "127.0.0.1".into(), port: 9000 + i as u16 },
        );
    }
    for i in 0..num_learners {
        roster.learners.insert(
            format!("learner_{}", i + 1),
            NodeAddr { ip: "127.0.0.1".into(), port: 10000 + i as u16 },
        );
    }
    roster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_shape() {
        let roster = generate_default_config(3, 5, 2);
        assert_eq!(roster.proposers.len(), 3);
        assert_eq!(roster.acceptors.len(), 5);
        assert_eq!(roster.learners.len(), 2);
        assert!(validate_config(&roster).is_ok());
    }

    #[test]
    fn ordinal_parses_suffix() {
        assert_eq!(ordinal("proposer_2"), 2);
        assert_eq!(ordinal("acceptor_0"), 0);
    }

    #[test]
    fn ordinal_falls_back_to_hash_for_malformed_id() {
        // Must not panic, and must be stable across calls.
        let a = ordinal("not-a-valid-id");
        let b = ordinal("not-a-valid-id");
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_role_map() {
        let mut roster = generate_default_config(3, 5, 2);
        roster.learners.clear();
        assert!(matches!(validate_config(&roster), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_port() {
        let mut roster = generate_default_config(1, 1, 1);
        roster.proposers.get_mut("proposer_1").unwrap().port = 0;
        assert!(matches!(validate_config(&roster), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("paxos-roster-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let roster = generate_default_config(2, 3, 1);
        save_config(&roster, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(roster, loaded);
        let _ = fs::remove_dir_all(&dir);
    }
}
