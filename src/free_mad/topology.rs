//! Peer-assignment strategies consumed by the Orchestrator's critique
//! rounds. The core assumes returned peer lists never contain a
//! self-reference.

use crate::free_mad::config::TopologyConfig;
use crate::free_mad::error::FreeMadError;
use std::collections::HashMap;

pub trait Topology: Send + Sync {
    /// Assigns, for every agent in `agent_ids` (in the order given), the
    /// list of peer agent ids whose current solutions it should see this
    /// critique round.
    fn assign_peers(&self, agent_ids: &[String]) -> HashMap<String, Vec<String>>;

    fn info(&self) -> serde_json::Value;
}

/// Every other agent is a peer.
pub struct AllToAll;

impl Topology for AllToAll {
    fn assign_peers(&self, agent_ids: &[String]) -> HashMap<String, Vec<String>> {
        agent_ids
            .iter()
            .map(|aid| {
                let peers = agent_ids
                    .iter()
                    .filter(|other| *other != aid)
                    .cloned()
                    .collect();
                (aid.clone(), peers)
            })
            .collect()
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({"type": "all_to_all"})
    }
}

/// The next agent in cyclic order is the sole peer.
pub struct Ring;

impl Topology for Ring {
    fn assign_peers(&self, agent_ids: &[String]) -> HashMap<String, Vec<String>> {
        let n = agent_ids.len();
        if n == 0 {
            return HashMap::new();
        }
        (0..n)
            .map(|i| {
                let next = agent_ids[(i + 1) % n].clone();
                (agent_ids[i].clone(), vec![next])
            })
            .collect()
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({"type": "ring"})
    }
}

/// The hub sees every non-hub agent; every non-hub agent sees only the hub.
pub struct Star {
    pub hub_agent: String,
}

impl Topology for Star {
    fn assign_peers(&self, agent_ids: &[String]) -> HashMap<String, Vec<String>> {
        let non_hub: Vec<String> = agent_ids
            .iter()
            .filter(|aid| **aid != self.hub_agent)
            .cloned()
            .collect();
        let mut map = HashMap::new();
        for aid in agent_ids {
            if *aid == self.hub_agent {
                map.insert(aid.clone(), non_hub.clone());
            } else {
                map.insert(aid.clone(), vec![self.hub_agent.clone()]);
            }
        }
        map
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({"type": "star", "hub_agent": self.hub_agent})
    }
}

/// Each agent gets exactly `k` peers (excluding itself), chosen
/// deterministically from `seed`. Requires `k < agent_count`, enforced at
/// config-validation time rather than here.
pub struct KReviewers {
    pub k: usize,
    pub seed: u64,
}

impl Topology for KReviewers {
    fn assign_peers(&self, agent_ids: &[String]) -> HashMap<String, Vec<String>> {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let mut map = HashMap::new();
        for (idx, aid) in agent_ids.iter().enumerate() {
            let mut others: Vec<String> = agent_ids
                .iter()
                .filter(|other| *other != aid)
                .cloned()
                .collect();
            // Deterministic per-agent shuffle: seed combined with the
            // agent's position so distinct agents get distinct (but
            // reproducible) reviewer sets from the same run seed.
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(idx as u64));
            others.shuffle(&mut rng);
            others.truncate(self.k);
            map.insert(aid.clone(), others);
        }
        map
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({"type": "k_reviewers", "k": self.k, "seed": self.seed})
    }
}

/// Builds the concrete [`Topology`] named by a validated [`TopologyConfig`].
/// Config-layer validation (§4.8) has already rejected unknown kinds, a
/// hub-less star, and an out-of-range `k`, so the only failure mode left
/// here is a config value constructed by hand outside that path.
pub fn build(cfg: &TopologyConfig, agent_count: usize, seed: u64) -> Result<Box<dyn Topology>, FreeMadError> {
    match cfg.kind.as_str() {
        "all_to_all" => Ok(Box::new(AllToAll)),
        "ring" => Ok(Box::new(Ring)),
        "star" => {
            let hub_agent = cfg
                .hub_agent
                .clone()
                .ok_or_else(|| FreeMadError::Config("star topology requires hub_agent".to_string()))?;
            Ok(Box::new(Star { hub_agent }))
        }
        "k_reviewers" => {
            let k = cfg
                .k
                .ok_or_else(|| FreeMadError::Config("k_reviewers topology requires k".to_string()))?;
            if k >= agent_count {
                return Err(FreeMadError::Config(format!(
                    "k_reviewers requires k < agent_count, got k={} with {} agents",
                    k, agent_count
                )));
            }
            Ok(Box::new(KReviewers { k, seed }))
        }
        other => Err(FreeMadError::Config(format!("unrecognized topology type: {}", other))),
    }
}
