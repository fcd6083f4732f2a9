//! Run configuration: load, default, and validate.
//!
//! A `Config` value fully parameterizes a run — agent roster, topology,
//! scoring weights, deadlines, budgets, size limits, and output settings.
//! Validation happens once at load time and is fatal (`ConfigError`); the
//! core orchestration loop never raises it.

use crate::free_mad::error::FreeMadError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One configured agent slot. `kind` names the out-of-scope adapter type
/// (e.g. a CLI-subprocess flavor); `settings` is an opaque bag of
/// adapter-specific options the core never inspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(rename = "type", default = "default_agent_kind")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

fn default_agent_kind() -> String {
    "mock".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(rename = "type", default = "default_topology_kind")]
    pub kind: String,
    #[serde(default)]
    pub hub_agent: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

fn default_topology_kind() -> String {
    "all_to_all".to_string()
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            kind: default_topology_kind(),
            hub_agent: None,
            k: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_weights")]
    pub weights: Vec<f64>,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_tie_break")]
    pub tie_break: String,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
}

fn default_weights() -> Vec<f64> {
    vec![20.0, 25.0, 30.0, 20.0]
}

fn default_tie_break() -> String {
    "deterministic".to_string()
}

fn default_seed() -> u64 {
    0
}

fn default_true() -> bool {
    true
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            weights: default_weights(),
            normalize: true,
            tie_break: default_tie_break(),
            random_seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlinesConfig {
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,
    #[serde(default = "default_hard_timeout_ms")]
    pub hard_timeout_ms: u64,
    #[serde(default = "default_min_agents")]
    pub min_agents: usize,
}

fn default_soft_timeout_ms() -> u64 {
    8_000
}

fn default_hard_timeout_ms() -> u64 {
    15_000
}

fn default_min_agents() -> usize {
    1
}

impl Default for DeadlinesConfig {
    fn default() -> Self {
        DeadlinesConfig {
            soft_timeout_ms: default_soft_timeout_ms(),
            hard_timeout_ms: default_hard_timeout_ms(),
            min_agents: default_min_agents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_total_time_sec")]
    pub max_total_time_sec: f64,
    #[serde(default = "default_max_round_time_sec")]
    pub max_round_time_sec: f64,
    /// Consumed by the out-of-scope CLI-subprocess adapter as a
    /// per-process timeout hint; distinct from `deadlines.hard_timeout_ms`,
    /// which is what this crate's DeadlineCollector actually reads.
    #[serde(default = "default_max_agent_time_sec")]
    pub max_agent_time_sec: f64,
    /// `0` means "unbounded" (the Orchestrator falls back to the agent
    /// count).
    #[serde(default)]
    pub max_concurrent_agents: usize,
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: u64,
    #[serde(default)]
    pub enforce_total_tokens: bool,
}

fn default_max_total_time_sec() -> f64 {
    120.0
}

fn default_max_round_time_sec() -> f64 {
    60.0
}

fn default_max_agent_time_sec() -> f64 {
    30.0
}

fn default_max_total_tokens() -> u64 {
    100_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        BudgetConfig {
            max_total_time_sec: default_max_total_time_sec(),
            max_round_time_sec: default_max_round_time_sec(),
            max_agent_time_sec: default_max_agent_time_sec(),
            max_concurrent_agents: 0,
            max_total_tokens: default_max_total_tokens(),
            enforce_total_tokens: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_requirement_size")]
    pub max_requirement_size: usize,
    #[serde(default = "default_max_solution_size")]
    pub max_solution_size: usize,
    /// Always rejected at validation time if set to `true` — the
    /// CLI-subprocess adapter process itself is out of scope, but this
    /// safety guard stays in scope as an ambient config invariant.
    #[serde(default)]
    pub cli_use_shell: bool,
}

fn default_max_requirement_size() -> usize {
    20_000
}

fn default_max_solution_size() -> usize {
    20_000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            max_requirement_size: default_max_requirement_size(),
            max_solution_size: default_max_solution_size(),
            cli_use_shell: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_transcript: bool,
    #[serde(default = "default_transcript_dir")]
    pub transcript_dir: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub include_topology_info: bool,
}

fn default_transcript_dir() -> String {
    "transcripts".to_string()
}

fn default_format() -> String {
    "json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            save_transcript: false,
            transcript_dir: default_transcript_dir(),
            format: default_format(),
            verbose: false,
            include_topology_info: true,
        }
    }
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            id: "claude".to_string(),
            kind: "claude_code".to_string(),
            settings: serde_json::Map::new(),
        },
        AgentConfig {
            id: "codex".to_string(),
            kind: "openai_codex".to_string(),
            settings: serde_json::Map::new(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub deadlines: DeadlinesConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agents: default_agents(),
            topology: TopologyConfig::default(),
            scoring: ScoringConfig::default(),
            deadlines: DeadlinesConfig::default(),
            budget: BudgetConfig::default(),
            security: SecurityConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

const KNOWN_TOPOLOGIES: &[&str] = &["all_to_all", "ring", "star", "k_reviewers"];

impl Config {
    /// Validates every rule in §4.8. Called automatically by [`load_config`];
    /// exposed separately so callers constructing a `Config` by hand (e.g.
    /// tests) can validate it too.
    pub fn validate(&self) -> Result<(), FreeMadError> {
        if self.scoring.weights.len() != 4 {
            return Err(FreeMadError::Config(format!(
                "scoring.weights must have exactly 4 entries, got {}",
                self.scoring.weights.len()
            )));
        }
        if self.scoring.weights.iter().any(|w| *w < 0.0) {
            return Err(FreeMadError::Config(
                "scoring.weights must all be non-negative".to_string(),
            ));
        }

        if !KNOWN_TOPOLOGIES.contains(&self.topology.kind.as_str()) {
            return Err(FreeMadError::Config(format!(
                "unrecognized topology type: {}",
                self.topology.kind
            )));
        }

        let mut seen_ids = HashSet::new();
        for agent in &self.agents {
            if !seen_ids.insert(agent.id.as_str()) {
                return Err(FreeMadError::Config(format!("duplicate agent id: {}", agent.id)));
            }
        }

        if self.deadlines.soft_timeout_ms >= self.deadlines.hard_timeout_ms {
            return Err(FreeMadError::Config(
                "deadlines.soft_timeout_ms must be strictly less than hard_timeout_ms".to_string(),
            ));
        }

        if self.topology.kind == "star" && self.topology.hub_agent.is_none() {
            return Err(FreeMadError::Config(
                "star topology requires an explicit hub_agent".to_string(),
            ));
        }
        if self.topology.kind == "star" {
            let hub = self.topology.hub_agent.as_deref().unwrap();
            if !self.agents.iter().any(|a| a.id == hub) {
                return Err(FreeMadError::Config(format!(
                    "star topology hub_agent {} is not a configured agent",
                    hub
                )));
            }
        }

        if self.topology.kind == "k_reviewers" {
            let k = self.topology.k.ok_or_else(|| {
                FreeMadError::Config("k_reviewers topology requires an explicit k".to_string())
            })?;
            if k >= self.agents.len() {
                return Err(FreeMadError::Config(format!(
                    "k_reviewers requires k < agent_count, got k={} with {} agents",
                    k,
                    self.agents.len()
                )));
            }
        }

        if self.security.cli_use_shell {
            return Err(FreeMadError::Config(
                "security.cli_use_shell is never allowed".to_string(),
            ));
        }

        if self.budget.max_total_time_sec <= 0.0 {
            return Err(FreeMadError::Config(
                "budget.max_total_time_sec must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Recursively merges `overlay` onto `base`: matching object keys merge
/// key-by-key (overlay wins on conflicts), everything else is a plain
/// overwrite.
fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Loads a `Config`: starts from defaults, merges in the JSON file at
/// `path` (if given), then merges `overrides` on top (taking precedence
/// key-by-key), validates the result, and creates `output.transcript_dir`
/// on disk if it doesn't already exist.
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<serde_json::Value>,
) -> Result<Config, FreeMadError> {
    let mut merged =
        serde_json::to_value(Config::default()).map_err(|e| FreeMadError::Config(e.to_string()))?;

    if let Some(path) = path {
        let contents = fs::read_to_string(path)
            .map_err(|e| FreeMadError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let file_value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| FreeMadError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        merge_json(&mut merged, file_value);
    }

    if let Some(overrides) = overrides {
        merge_json(&mut merged, overrides);
    }

    let cfg: Config =
        serde_json::from_value(merged).map_err(|e| FreeMadError::Config(e.to_string()))?;
    cfg.validate()?;

    fs::create_dir_all(&cfg.output.transcript_dir)
        .map_err(|e| FreeMadError::Config(format!("failed to create transcript_dir: {}", e)))?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut overrides = serde_json::Map::new();
        overrides.insert(
            "output".to_string(),
            serde_json::json!({"transcript_dir": dir.path().join("t").to_string_lossy()}),
        );
        let cfg = load_config(None, Some(serde_json::Value::Object(overrides))).unwrap();
        assert_eq!(cfg.agents.len(), 2);
        assert_eq!(cfg.agents[0].id, "claude");
        assert_eq!(cfg.agents[1].id, "codex");
        assert_eq!(cfg.topology.kind, "all_to_all");
        assert_eq!(cfg.scoring.weights, vec![20.0, 25.0, 30.0, 20.0]);
        assert!(cfg.scoring.normalize);
        assert_eq!(cfg.scoring.tie_break, "deterministic");
        assert!(Path::new(&cfg.output.transcript_dir).exists());
    }

    #[test]
    fn rejects_invalid_weights_length() {
        let overrides = serde_json::json!({"scoring": {"weights": [1.0, 2.0, 3.0]}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_unknown_topology() {
        let overrides = serde_json::json!({"topology": {"type": "mesh"}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let overrides = serde_json::json!({
            "agents": [
                {"id": "a", "type": "claude_code"},
                {"id": "a", "type": "openai_codex"},
            ]
        });
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_soft_gte_hard_deadline() {
        let overrides = serde_json::json!({"deadlines": {"soft_timeout_ms": 5000, "hard_timeout_ms": 4000}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_star_without_hub() {
        let overrides = serde_json::json!({"topology": {"type": "star"}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_k_reviewers_k_too_large_accepts_valid_k() {
        let overrides = serde_json::json!({"topology": {"type": "k_reviewers", "k": 2}});
        assert!(load_config(None, Some(overrides)).is_err());

        let overrides = serde_json::json!({"topology": {"type": "k_reviewers", "k": 1}});
        let cfg = load_config(None, Some(overrides)).unwrap();
        assert_eq!(cfg.topology.kind, "k_reviewers");
        assert_eq!(cfg.topology.k, Some(1));
    }

    #[test]
    fn rejects_cli_use_shell() {
        let overrides = serde_json::json!({"security": {"cli_use_shell": true}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn rejects_non_positive_total_time_budget() {
        let overrides = serde_json::json!({"budget": {"max_total_time_sec": -1.0}});
        assert!(load_config(None, Some(overrides)).is_err());
    }

    #[test]
    fn loads_from_json_file_and_applies_overrides_on_top() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        let out_dir = dir.path().join("t_out");
        let data = serde_json::json!({
            "output": {
                "save_transcript": true,
                "transcript_dir": out_dir.to_string_lossy(),
                "format": "markdown",
            }
        });
        fs::write(&cfg_path, serde_json::to_string(&data).unwrap()).unwrap();

        let overrides = serde_json::json!({"output": {"verbose": true}});
        let cfg = load_config(Some(&cfg_path), Some(overrides)).unwrap();
        assert_eq!(cfg.output.format, "markdown");
        assert!(cfg.output.verbose);
        assert!(out_dir.exists());
    }
}
