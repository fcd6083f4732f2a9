//! The run-event stream: a flat, wire-serializable event struct plus the
//! observer capability the Orchestrator emits events through.
//!
//! Events are a single struct with mostly-optional fields (matching the
//! dashboard wire shape in full, §6) rather than a Rust enum-of-variants,
//! because the wire shape itself is flat JSON with unset fields omitted.
//! Construction goes through the `RunEvent::*` associated functions below,
//! one per `RunEventKind`, so call sites can't set an incoherent
//! combination of fields for a given kind.

use crate::free_mad::types::{Decision, RoundType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of event kinds a run can emit (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    RunCompleted,
    RunFailed,
    RunBudgetExceeded,
    RoundStarted,
    RoundCompleted,
    AgentGenerateStarted,
    AgentGenerateFinished,
    AgentCritiqueStarted,
    AgentCritiqueFinished,
    ScoresUpdated,
    FinalAnswerSelected,
}

/// One event on the run's event stream. Optional fields that don't apply
/// to `kind` are omitted from the JSON wire form via `skip_serializing_if`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub run_id: String,
    pub ts_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub round_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub round_type: Option<RoundType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub answer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub changed: Option<bool>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub scores: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub holders: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub winning_agents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_answer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl RunEvent {
    fn bare(kind: RunEventKind, run_id: impl Into<String>, ts_ms: i64) -> Self {
        RunEvent {
            kind,
            run_id: run_id.into(),
            ts_ms,
            round_index: None,
            round_type: None,
            agent_id: None,
            answer_id: None,
            decision: None,
            changed: None,
            scores: HashMap::new(),
            holders: HashMap::new(),
            winning_agents: Vec::new(),
            final_answer_id: None,
            error: None,
        }
    }

    pub fn run_started(run_id: impl Into<String>, ts_ms: i64) -> Self {
        Self::bare(RunEventKind::RunStarted, run_id, ts_ms)
    }

    pub fn run_completed(run_id: impl Into<String>, ts_ms: i64, final_answer_id: impl Into<String>) -> Self {
        let mut e = Self::bare(RunEventKind::RunCompleted, run_id, ts_ms);
        e.final_answer_id = Some(final_answer_id.into());
        e
    }

    pub fn run_failed(run_id: impl Into<String>, ts_ms: i64, error: impl Into<String>) -> Self {
        let mut e = Self::bare(RunEventKind::RunFailed, run_id, ts_ms);
        e.error = Some(error.into());
        e
    }

    pub fn round_started(run_id: impl Into<String>, ts_ms: i64, round_index: usize, round_type: RoundType) -> Self {
        let mut e = Self::bare(RunEventKind::RoundStarted, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(round_type);
        e
    }

    pub fn round_completed(run_id: impl Into<String>, ts_ms: i64, round_index: usize, round_type: RoundType) -> Self {
        let mut e = Self::bare(RunEventKind::RoundCompleted, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(round_type);
        e
    }

    pub fn agent_generate_started(
        run_id: impl Into<String>,
        ts_ms: i64,
        round_index: usize,
        agent_id: impl Into<String>,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::AgentGenerateStarted, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(RoundType::Generation);
        e.agent_id = Some(agent_id.into());
        e
    }

    pub fn agent_generate_finished(
        run_id: impl Into<String>,
        ts_ms: i64,
        round_index: usize,
        agent_id: impl Into<String>,
        answer_id: impl Into<String>,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::AgentGenerateFinished, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(RoundType::Generation);
        e.agent_id = Some(agent_id.into());
        e.answer_id = Some(answer_id.into());
        e.decision = Some(Decision::Keep);
        e.changed = Some(false);
        e
    }

    pub fn agent_critique_started(
        run_id: impl Into<String>,
        ts_ms: i64,
        round_index: usize,
        agent_id: impl Into<String>,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::AgentCritiqueStarted, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(RoundType::Critique);
        e.agent_id = Some(agent_id.into());
        e
    }

    pub fn agent_critique_finished(
        run_id: impl Into<String>,
        ts_ms: i64,
        round_index: usize,
        agent_id: impl Into<String>,
        answer_id: impl Into<String>,
        decision: Decision,
        changed: bool,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::AgentCritiqueFinished, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(RoundType::Critique);
        e.agent_id = Some(agent_id.into());
        e.answer_id = Some(answer_id.into());
        e.decision = Some(decision);
        e.changed = Some(changed);
        e
    }

    pub fn scores_updated(
        run_id: impl Into<String>,
        ts_ms: i64,
        round_index: usize,
        round_type: RoundType,
        scores: HashMap<String, f64>,
        holders: HashMap<String, Vec<String>>,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::ScoresUpdated, run_id, ts_ms);
        e.round_index = Some(round_index);
        e.round_type = Some(round_type);
        e.scores = scores;
        e.holders = holders;
        e
    }

    pub fn final_answer_selected(
        run_id: impl Into<String>,
        ts_ms: i64,
        final_answer_id: impl Into<String>,
        winning_agents: Vec<String>,
        scores: HashMap<String, f64>,
    ) -> Self {
        let mut e = Self::bare(RunEventKind::FinalAnswerSelected, run_id, ts_ms);
        e.final_answer_id = Some(final_answer_id.into());
        e.winning_agents = winning_agents;
        e.scores = scores;
        e
    }
}

/// The observer capability: the Orchestrator's single sink for every event
/// it emits. Implementations run on the Orchestrator's own thread and must
/// not block; an `Err` return is swallowed by the caller (ObserverError,
/// §7), never propagated into the run.
pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent) -> Result<(), String>;
}

/// The default observer: discards every event.
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_event(&self, _event: &RunEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Fans a single event out to a set of observers. Each observer's error is
/// swallowed independently so one misbehaving observer can't stop the
/// others from seeing the event.
pub struct FanOutObserver {
    observers: Vec<Box<dyn RunObserver>>,
}

impl FanOutObserver {
    pub fn new() -> Self {
        FanOutObserver {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Box<dyn RunObserver>) {
        self.observers.push(observer);
    }
}

impl Default for FanOutObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for FanOutObserver {
    fn on_event(&self, event: &RunEvent) -> Result<(), String> {
        for obs in &self.observers {
            if let Err(err) = obs.on_event(event) {
                log::debug!("observer error: {}", err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_started_serializes_without_optional_fields() {
        let event = RunEvent::run_started("run-1", 1000);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "run_started");
        assert!(json.get("round_index").is_none());
        assert!(json.get("scores").is_none());
    }

    #[test]
    fn scores_updated_includes_scores_and_holders() {
        let mut scores = HashMap::new();
        scores.insert("a1".to_string(), 1.5);
        let mut holders = HashMap::new();
        holders.insert("a1".to_string(), vec!["agent1".to_string()]);
        let event = RunEvent::scores_updated("run-1", 1000, 0, RoundType::Generation, scores, holders);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["scores"]["a1"], 1.5);
        assert_eq!(json["holders"]["a1"][0], "agent1");
    }

    #[test]
    fn fan_out_observer_swallows_individual_errors() {
        struct Failing;
        impl RunObserver for Failing {
            fn on_event(&self, _event: &RunEvent) -> Result<(), String> {
                Err("boom".to_string())
            }
        }
        struct Counting(std::sync::atomic::AtomicUsize);
        impl RunObserver for Counting {
            fn on_event(&self, _event: &RunEvent) -> Result<(), String> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }

        let mut fan_out = FanOutObserver::new();
        fan_out.add(Box::new(Failing));
        let counting = Box::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        fan_out.add(counting);

        let result = fan_out.on_event(&RunEvent::run_started("run-1", 0));
        assert!(result.is_ok());
    }
}
