//! Shared data model: the small vocabulary every other module speaks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether an agent kept its prior answer or revised it during a critique round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "KEEP")]
    Keep,
    #[serde(rename = "REVISE")]
    Revise,
}

/// Generation is always round 0; critique rounds are 1..=max_rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundType {
    Generation,
    Critique,
}

/// The kind of scoring operation that produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreAction {
    Initial,
    Keep,
    Change,
}

/// How the Answer Selector breaks a tie that survives the confidence step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    Deterministic,
    Random,
}

/// Token counters for a single agent call. Opaque to the core beyond these
/// two fields, which feed the `TokenBudget`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub prompt: u64,
    #[serde(default)]
    pub output: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(default)]
    pub elapsed_ms: f64,
    #[serde(default)]
    pub cached: bool,
}

/// `{tokens, timings, ...}` — additional fields round-trip through `extra`
/// without the core needing to know their shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub tokens: TokenCounts,
    #[serde(default)]
    pub timings: Timings,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Output of `Agent::generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub solution: String,
    pub reasoning: String,
    pub answer_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Output of `Agent::critique_and_refine`.
///
/// Invariant: `decision == Keep` implies `changed == false` and `answer_id`
/// equal to the agent's previous answer id. `decision == Revise` implies a
/// non-empty `solution` whose `answer_id` is `fingerprint(solution)`. The
/// orchestrator does not trust agents to honor this on their own — see
/// `orchestrator::critique_round` for the coercion it applies regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueResponse {
    pub agent_id: String,
    pub decision: Decision,
    pub changed: bool,
    pub solution: String,
    pub reasoning: String,
    pub answer_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// The transcript-facing shape of a single agent's contribution to a round,
/// after the orchestrator has applied its KEEP/REVISE coercion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoundResponse {
    pub agent_id: String,
    pub solution: String,
    pub reasoning: String,
    pub decision: Decision,
    pub changed: bool,
    pub answer_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoundRecord {
    pub response: AgentRoundResponse,
    #[serde(default)]
    pub peers_assigned: Vec<String>,
    #[serde(default)]
    pub peers_seen: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTranscript {
    pub round_index: usize,
    #[serde(rename = "type")]
    pub round_type: RoundType,
    pub agents: HashMap<String, AgentRoundRecord>,
    pub scores: HashMap<String, f64>,
    pub topology_info: serde_json::Value,
    #[serde(default)]
    pub deadline_hit_soft: bool,
    #[serde(default)]
    pub deadline_hit_hard: bool,
}

/// `{passed, confidence, errors}` for one (answer, validator) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub confidence: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Derived, run-level metrics computed once after the round loop finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub num_rounds: f64,
    pub num_agents: f64,
    pub deadline_soft_hits: f64,
    pub deadline_hard_hits: f64,
    pub opinion_changes: f64,
    pub agreement_rate: f64,
    pub score_min: f64,
    pub score_max: f64,
    pub score_mean: f64,
    pub validation_pass_rate: f64,
}

/// The aggregate return value of `Orchestrator::run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub final_answer_id: String,
    pub final_solution: String,
    pub scores: HashMap<String, f64>,
    pub raw_scores: HashMap<String, f64>,
    pub winning_agents: Vec<String>,
    pub origin_agents: Vec<String>,
    pub holders_history: HashMap<usize, Vec<String>>,
    pub early_stop_reason: Option<String>,
    pub transcript: Vec<RoundTranscript>,
    pub validation: HashMap<String, HashMap<String, ValidationResult>>,
    pub validator_confidence: HashMap<String, f64>,
    pub score_explainers: HashMap<String, Vec<crate::free_mad::scoring::ScoreExplainerEntry>>,
    pub metrics: Metrics,
}
