//! Incremental, path-dependent scoring with a replayable explanation trail.

use crate::free_mad::types::ScoreAction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Non-negative weights `[w_initial, w_change_loss, w_change_gain, w_keep]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub w_initial: f64,
    pub w_change_loss: f64,
    pub w_change_gain: f64,
    pub w_keep: f64,
}

impl Weights {
    pub fn from_slice(w: &[f64; 4]) -> Self {
        Weights {
            w_initial: w[0],
            w_change_loss: w[1],
            w_change_gain: w[2],
            w_keep: w[3],
        }
    }
}

/// One entry in the replayable scoring history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreExplainerEntry {
    pub round: usize,
    pub agent_id: String,
    pub action: ScoreAction,
    pub deltas: HashMap<String, f64>,
    pub contributor_counts_after: HashMap<String, usize>,
}

/// Round dampening factor `f(r) = 1/(1+r)`.
pub fn dampen(round: usize) -> f64 {
    1.0 / (1.0 + round as f64)
}

/// `raw[answer] → score`, `contributors[answer] → agents currently holding
/// it`, and the ordered history entries that sum to `raw`.
#[derive(Debug, Clone)]
pub struct ScoreTracker {
    weights: Weights,
    raw: HashMap<String, f64>,
    contributors: HashMap<String, HashSet<String>>,
    history: Vec<ScoreExplainerEntry>,
    initial_recorded: HashSet<(String, String)>,
}

impl ScoreTracker {
    pub fn new(weights: Weights) -> Self {
        ScoreTracker {
            weights,
            raw: HashMap::new(),
            contributors: HashMap::new(),
            history: Vec::new(),
            initial_recorded: HashSet::new(),
        }
    }

    fn contributor_counts_for(&self, answers: &[&str]) -> HashMap<String, usize> {
        answers
            .iter()
            .map(|a| {
                (
                    (*a).to_string(),
                    self.contributors.get(*a).map(|s| s.len()).unwrap_or(0),
                )
            })
            .collect()
    }

    /// Idempotent per (agent, answer) pair at round 0.
    pub fn record_initial(&mut self, agent_id: &str, answer_id: &str, round: usize) {
        let key = (agent_id.to_string(), answer_id.to_string());
        if self.initial_recorded.contains(&key) {
            return;
        }
        self.initial_recorded.insert(key);

        *self.raw.entry(answer_id.to_string()).or_insert(0.0) += self.weights.w_initial;
        self.contributors
            .entry(answer_id.to_string())
            .or_default()
            .insert(agent_id.to_string());

        let mut deltas = HashMap::new();
        deltas.insert(answer_id.to_string(), self.weights.w_initial);
        self.history.push(ScoreExplainerEntry {
            round,
            agent_id: agent_id.to_string(),
            action: ScoreAction::Initial,
            deltas,
            contributor_counts_after: self.contributor_counts_for(&[answer_id]),
        });
    }

    pub fn record_keep(&mut self, agent_id: &str, answer_id: &str, round: usize) {
        let delta = self.weights.w_keep * dampen(round);
        *self.raw.entry(answer_id.to_string()).or_insert(0.0) += delta;

        let mut deltas = HashMap::new();
        deltas.insert(answer_id.to_string(), delta);
        self.history.push(ScoreExplainerEntry {
            round,
            agent_id: agent_id.to_string(),
            action: ScoreAction::Keep,
            deltas,
            contributor_counts_after: self.contributor_counts_for(&[answer_id]),
        });
    }

    pub fn record_change(&mut self, agent_id: &str, old_answer_id: &str, new_answer_id: &str, round: usize) {
        let f = dampen(round);
        let loss = self.weights.w_change_loss * f;
        let gain = self.weights.w_change_gain * f;

        *self.raw.entry(old_answer_id.to_string()).or_insert(0.0) -= loss;
        if let Some(set) = self.contributors.get_mut(old_answer_id) {
            set.remove(agent_id);
        }

        *self.raw.entry(new_answer_id.to_string()).or_insert(0.0) += gain;
        self.contributors
            .entry(new_answer_id.to_string())
            .or_default()
            .insert(agent_id.to_string());

        let mut deltas = HashMap::new();
        deltas.insert(old_answer_id.to_string(), -loss);
        *deltas.entry(new_answer_id.to_string()).or_insert(0.0) += gain;
        self.history.push(ScoreExplainerEntry {
            round,
            agent_id: agent_id.to_string(),
            action: ScoreAction::Change,
            deltas,
            contributor_counts_after: self.contributor_counts_for(&[old_answer_id, new_answer_id]),
        });
    }

    pub fn get_raw_scores(&self) -> HashMap<String, f64> {
        self.raw.clone()
    }

    /// `normalized[a] = raw[a] / max(1, |contributors[a]|)`.
    pub fn get_all_scores(&self) -> HashMap<String, f64> {
        self.raw
            .iter()
            .map(|(ans, score)| {
                let count = self.contributors.get(ans).map(|s| s.len()).unwrap_or(0);
                (ans.clone(), score / (count.max(1) as f64))
            })
            .collect()
    }

    /// The subsequence of history entries whose deltas touch `answer_id`.
    pub fn explain_score(&self, answer_id: &str) -> Vec<ScoreExplainerEntry> {
        self.history
            .iter()
            .filter(|e| e.deltas.contains_key(answer_id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> Weights {
        Weights::from_slice(&[20.0, 25.0, 30.0, 20.0])
    }

    #[test]
    fn initial_then_change_matches_s1_scenario() {
        let mut tracker = ScoreTracker::new(weights());
        tracker.record_initial("a1", "ANS_A", 0);
        tracker.record_initial("a2", "ANS_B", 0);
        tracker.record_change("a2", "ANS_B", "ANS_A", 1);

        let raw = tracker.get_raw_scores();
        assert!((raw["ANS_A"] - 35.0).abs() < 1e-9);
        assert!((raw["ANS_B"] - 7.5).abs() < 1e-9);

        let normalized = tracker.get_all_scores();
        assert!((normalized["ANS_A"] - 17.5).abs() < 1e-9);
        assert!((normalized["ANS_B"] - 7.5).abs() < 1e-9);
    }

    #[test]
    fn initial_is_idempotent_per_agent_answer() {
        let mut tracker = ScoreTracker::new(weights());
        tracker.record_initial("a1", "ANS_A", 0);
        tracker.record_initial("a1", "ANS_A", 0);
        assert!((tracker.get_raw_scores()["ANS_A"] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn deltas_sum_to_raw_score() {
        let mut tracker = ScoreTracker::new(weights());
        tracker.record_initial("a1", "X", 0);
        tracker.record_keep("a1", "X", 1);
        tracker.record_change("a1", "X", "Y", 2);
        tracker.record_keep("a1", "Y", 3);

        for answer in ["X", "Y"] {
            let sum: f64 = tracker
                .explain_score(answer)
                .iter()
                .map(|e| e.deltas[answer])
                .sum();
            assert!((sum - tracker.get_raw_scores()[answer]).abs() < 1e-9);
        }
    }

    #[test]
    fn unknown_answer_is_created_on_record() {
        let mut tracker = ScoreTracker::new(weights());
        tracker.record_keep("a1", "NEW", 0);
        assert!(tracker.get_raw_scores().contains_key("NEW"));
    }
}
