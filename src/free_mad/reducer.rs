//! The Live Snapshot Reducer: a pure fold of the run-event stream into a
//! client-consumable, immutable snapshot.
//!
//! `apply` takes a snapshot and an event by value/reference and returns a
//! new snapshot; it never mutates its input and never reads the clock or
//! any other ambient state, so the same `(snapshot, event)` pair always
//! folds to the same result.

use crate::free_mad::event::{RunEvent, RunEventKind};
use crate::free_mad::types::{Decision, RoundType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mirrors the dashboard's per-agent status vocabulary. `Done` and `Error`
/// are retained for wire/API completeness but unreachable from the event
/// transitions defined below — every agent ends a round back in `Waiting`.
/// See DESIGN.md for why this gap is intentional rather than papered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Waiting,
    Generating,
    Critiquing,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub status: AgentStatus,
    pub current_answer_id: Option<String>,
    pub changes_count: u32,
    pub last_decision: Option<Decision>,
}

impl AgentSnapshot {
    fn new(agent_id: impl Into<String>) -> Self {
        AgentSnapshot {
            agent_id: agent_id.into(),
            status: AgentStatus::Waiting,
            current_answer_id: None,
            changes_count: 0,
            last_decision: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub round_index: Option<usize>,
    pub round_type: Option<RoundType>,
    pub agents: HashMap<String, AgentSnapshot>,
    pub scores: HashMap<String, f64>,
    pub holders: HashMap<String, Vec<String>>,
    pub final_answer_id: Option<String>,
    pub winning_agents: Vec<String>,
    pub completed: bool,
    pub error: Option<String>,
}

pub fn initial_snapshot(run_id: impl Into<String>) -> RunSnapshot {
    RunSnapshot {
        run_id: run_id.into(),
        round_index: None,
        round_type: None,
        agents: HashMap::new(),
        scores: HashMap::new(),
        holders: HashMap::new(),
        final_answer_id: None,
        winning_agents: Vec::new(),
        completed: false,
        error: None,
    }
}

fn update_agent(
    agents: &HashMap<String, AgentSnapshot>,
    agent_id: &str,
    status: Option<AgentStatus>,
    answer_id: Option<&str>,
    decision: Option<Decision>,
    changed: Option<bool>,
) -> HashMap<String, AgentSnapshot> {
    let mut agents = agents.clone();
    let prev = agents
        .remove(agent_id)
        .unwrap_or_else(|| AgentSnapshot::new(agent_id));
    let changes_count = if changed == Some(true) {
        prev.changes_count + 1
    } else {
        prev.changes_count
    };
    agents.insert(
        agent_id.to_string(),
        AgentSnapshot {
            agent_id: agent_id.to_string(),
            status: status.unwrap_or(prev.status),
            current_answer_id: answer_id.map(|a| a.to_string()).or(prev.current_answer_id),
            changes_count,
            last_decision: decision.or(prev.last_decision),
        },
    );
    agents
}

/// Folds one event into `snapshot`, returning the next snapshot. Events
/// carrying a different `run_id` are ignored outright (returned unchanged).
pub fn apply(snapshot: &RunSnapshot, event: &RunEvent) -> RunSnapshot {
    if event.run_id != snapshot.run_id {
        return snapshot.clone();
    }

    let mut next = snapshot.clone();
    match event.kind {
        RunEventKind::RoundStarted => {
            next.round_index = event.round_index;
            next.round_type = event.round_type;
        }
        RunEventKind::AgentGenerateStarted => {
            if let Some(agent_id) = &event.agent_id {
                next.agents = update_agent(&next.agents, agent_id, Some(AgentStatus::Generating), None, None, None);
            }
        }
        RunEventKind::AgentGenerateFinished => {
            if let Some(agent_id) = &event.agent_id {
                next.agents = update_agent(
                    &next.agents,
                    agent_id,
                    Some(AgentStatus::Waiting),
                    event.answer_id.as_deref(),
                    event.decision,
                    None,
                );
            }
        }
        RunEventKind::AgentCritiqueStarted => {
            if let Some(agent_id) = &event.agent_id {
                next.agents = update_agent(&next.agents, agent_id, Some(AgentStatus::Critiquing), None, None, None);
            }
        }
        RunEventKind::AgentCritiqueFinished => {
            if let Some(agent_id) = &event.agent_id {
                next.agents = update_agent(
                    &next.agents,
                    agent_id,
                    Some(AgentStatus::Waiting),
                    event.answer_id.as_deref(),
                    event.decision,
                    event.changed,
                );
            }
        }
        RunEventKind::ScoresUpdated => {
            next.scores = event.scores.clone();
            next.holders = event.holders.clone();
        }
        RunEventKind::FinalAnswerSelected => {
            next.final_answer_id = event.final_answer_id.clone();
            next.winning_agents = event.winning_agents.clone();
        }
        RunEventKind::RunCompleted | RunEventKind::RunFailed | RunEventKind::RunBudgetExceeded => {
            next.completed = true;
            if event.error.is_some() {
                next.error = event.error.clone();
            }
        }
        RunEventKind::RunStarted | RunEventKind::RoundCompleted => {}
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_events_for_a_different_run() {
        let snapshot = initial_snapshot("run-1");
        let event = RunEvent::run_started("run-2", 0);
        let next = apply(&snapshot, &event);
        assert_eq!(next.run_id, "run-1");
        assert!(!next.completed);
    }

    #[test]
    fn round_started_replaces_round_index_and_type() {
        let snapshot = initial_snapshot("run-1");
        let event = RunEvent::round_started("run-1", 0, 2, RoundType::Critique);
        let next = apply(&snapshot, &event);
        assert_eq!(next.round_index, Some(2));
        assert_eq!(next.round_type, Some(RoundType::Critique));
    }

    #[test]
    fn agent_generate_lifecycle_updates_status_and_answer() {
        let snapshot = initial_snapshot("run-1");
        let started = RunEvent::agent_generate_started("run-1", 0, 0, "a1");
        let mid = apply(&snapshot, &started);
        assert_eq!(mid.agents["a1"].status, AgentStatus::Generating);

        let finished = RunEvent::agent_generate_finished("run-1", 1, 0, "a1", "ans1");
        let done = apply(&mid, &finished);
        assert_eq!(done.agents["a1"].status, AgentStatus::Waiting);
        assert_eq!(done.agents["a1"].current_answer_id.as_deref(), Some("ans1"));
        assert_eq!(done.agents["a1"].changes_count, 0);
    }

    #[test]
    fn critique_finish_increments_changes_count_only_when_changed() {
        let snapshot = initial_snapshot("run-1");
        let kept = RunEvent::agent_critique_finished("run-1", 0, 1, "a1", "ans1", Decision::Keep, false);
        let after_keep = apply(&snapshot, &kept);
        assert_eq!(after_keep.agents["a1"].changes_count, 0);

        let revised = RunEvent::agent_critique_finished("run-1", 1, 1, "a1", "ans2", Decision::Revise, true);
        let after_revise = apply(&after_keep, &revised);
        assert_eq!(after_revise.agents["a1"].changes_count, 1);
        assert_eq!(after_revise.agents["a1"].current_answer_id.as_deref(), Some("ans2"));
    }

    #[test]
    fn scores_updated_replaces_scores_and_holders() {
        let snapshot = initial_snapshot("run-1");
        let mut scores = HashMap::new();
        scores.insert("ans1".to_string(), 5.0);
        let mut holders = HashMap::new();
        holders.insert("ans1".to_string(), vec!["a1".to_string()]);
        let event = RunEvent::scores_updated("run-1", 0, 0, RoundType::Generation, scores, holders);
        let next = apply(&snapshot, &event);
        assert_eq!(next.scores["ans1"], 5.0);
        assert_eq!(next.holders["ans1"], vec!["a1".to_string()]);
    }

    #[test]
    fn terminal_events_set_completed_and_preserve_or_set_error() {
        let snapshot = initial_snapshot("run-1");
        let completed = apply(&snapshot, &RunEvent::run_completed("run-1", 0, "ans1"));
        assert!(completed.completed);
        assert!(completed.error.is_none());

        let failed = apply(&snapshot, &RunEvent::run_failed("run-1", 0, "boom"));
        assert!(failed.completed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn apply_is_pure_and_deterministic() {
        let snapshot = initial_snapshot("run-1");
        let e1 = RunEvent::round_started("run-1", 0, 0, RoundType::Generation);
        let e2 = RunEvent::agent_generate_started("run-1", 1, 0, "a1");
        let first = apply(&apply(&snapshot, &e1), &e2);
        let second = apply(&apply(&snapshot, &e1), &e2);
        assert_eq!(first.round_index, second.round_index);
        assert_eq!(first.agents["a1"].status, second.agents["a1"].status);
    }
}
