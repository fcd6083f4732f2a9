//! The round loop: fan out generation/critique work to every configured
//! agent, fold results into the Score Tracker, and assemble the transcript
//! the Selector and callers ultimately consume.

use crate::free_mad::agent::Agent;
use crate::free_mad::answer_id::compute_answer_id;
use crate::free_mad::budget::{enforce_size, BudgetGuard, TokenBudget};
use crate::free_mad::config::Config;
use crate::free_mad::deadline;
use crate::free_mad::error::FreeMadError;
use crate::free_mad::event::{NullObserver, RunEvent, RunObserver};
use crate::free_mad::scoring::{ScoreTracker, Weights};
use crate::free_mad::selector::AnswerSelector;
use crate::free_mad::topology::{self, Topology};
use crate::free_mad::types::{
    AgentResponse, AgentRoundRecord, AgentRoundResponse, Decision, Metadata, Metrics, RoundTranscript,
    RoundType, RunResult, TieBreak, ValidationResult,
};
use crate::free_mad::validator::{NullValidationManager, ValidationManager};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_tie_break(s: &str) -> TieBreak {
    if s.eq_ignore_ascii_case("random") {
        TieBreak::Random
    } else {
        TieBreak::Deterministic
    }
}

/// Every agent whose current answer equals `ans`, sorted for reproducible
/// output (a `HashMap`'s own iteration order is not stable run-to-run).
fn holders_for(scores: &HashMap<String, f64>, current_answer_id: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    let mut holders: HashMap<String, Vec<String>> = scores.keys().map(|a| (a.clone(), Vec::new())).collect();
    for (agent, ans) in current_answer_id {
        if let Some(list) = holders.get_mut(ans) {
            list.push(agent.clone());
        }
    }
    for list in holders.values_mut() {
        list.sort();
    }
    holders
}

/// A deadline-aware, round-based concurrent scheduler: fans generation and
/// critique work out to every configured agent, enforces soft/hard
/// per-round deadlines with quorum semantics, and carries answers forward
/// across rounds until the Selector picks a winner.
///
/// All mutable run state (score ledger, current answers, transcript) lives
/// on the stack of a single `run()` call rather than on `self` — per §3,
/// "all state is owned by a single Orchestrator instance for the duration
/// of one run; no cross-run sharing," which a `&self` method with purely
/// local state satisfies without needing a fresh `Orchestrator` per run.
pub struct Orchestrator {
    cfg: Config,
    agents: HashMap<String, Arc<dyn Agent>>,
    agent_order: Vec<String>,
    topology: Box<dyn Topology>,
    observer: Arc<dyn RunObserver>,
    validation_manager: Arc<dyn ValidationManager>,
}

impl Orchestrator {
    pub fn new(cfg: Config, agents: Vec<Arc<dyn Agent>>) -> Result<Self, FreeMadError> {
        let agent_order: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();
        let mut agent_map = HashMap::new();
        for agent in agents {
            agent_map.insert(agent.id().to_string(), agent);
        }
        let topology = topology::build(&cfg.topology, agent_map.len(), cfg.scoring.random_seed)?;
        Ok(Orchestrator {
            cfg,
            agents: agent_map,
            agent_order,
            topology,
            observer: Arc::new(NullObserver),
            validation_manager: Arc::new(NullValidationManager),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_validation_manager(mut self, vm: Arc<dyn ValidationManager>) -> Self {
        self.validation_manager = vm;
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Err(err) = self.observer.on_event(&event) {
            log::debug!("observer error on {:?}: {}", event.kind, err);
        }
    }

    fn pool_size(&self) -> usize {
        let n = self.agents.len().max(1);
        if self.cfg.budget.max_concurrent_agents == 0 {
            n
        } else {
            self.cfg.budget.max_concurrent_agents.min(n)
        }
    }

    /// Runs one full debate: a generation round followed by up to
    /// `max_rounds` critique rounds, then selection. See §4.4.
    pub async fn run(&self, requirement: &str, max_rounds: usize, run_id: Option<String>) -> Result<RunResult, FreeMadError> {
        let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let weights = if self.cfg.scoring.weights.len() == 4 {
            Weights::from_slice(&[
                self.cfg.scoring.weights[0],
                self.cfg.scoring.weights[1],
                self.cfg.scoring.weights[2],
                self.cfg.scoring.weights[3],
            ])
        } else {
            return Err(FreeMadError::Config(
                "scoring.weights must have exactly 4 entries".to_string(),
            ));
        };

        let mut current_solution: HashMap<String, String> = HashMap::new();
        let mut current_answer_id: HashMap<String, String> = HashMap::new();
        let mut answer_text: HashMap<String, String> = HashMap::new();
        let mut transcript: Vec<RoundTranscript> = Vec::new();
        let mut score = ScoreTracker::new(weights);
        let mut token_budget = TokenBudget::new(self.cfg.budget.max_total_tokens, self.cfg.budget.enforce_total_tokens);
        let selector = AnswerSelector::new(parse_tie_break(&self.cfg.scoring.tie_break), self.cfg.scoring.random_seed);
        let guard = BudgetGuard::new(
            Duration::from_secs_f64(self.cfg.budget.max_total_time_sec),
            Duration::from_secs_f64(self.cfg.budget.max_round_time_sec),
        );

        let (requirement_trunc, _) = enforce_size(requirement, self.cfg.security.max_requirement_size, "requirement");

        log::info!("run {} started", run_id);
        self.emit(RunEvent::run_started(run_id.clone(), now_ms()));

        let mut early_stop_reason: Option<String> = None;

        if guard.check_total().is_err() {
            early_stop_reason = Some("total_time_budget_exceeded".to_string());
        } else {
            if let Err(err) = self
                .run_generation_round(&run_id, &requirement_trunc, &mut current_solution, &mut current_answer_id, &mut answer_text, &mut score, &mut token_budget, &mut transcript)
                .await
            {
                self.emit(RunEvent::run_failed(run_id.clone(), now_ms(), err.to_string()));
                return Err(err);
            }

            for r in 1..=max_rounds {
                if guard.check_total().is_err() {
                    early_stop_reason = Some("total_time_budget_exceeded".to_string());
                    log::info!("run {} hit total time budget before round {}", run_id, r);
                    break;
                }
                let rs = guard.round_start();

                if let Err(err) = self
                    .run_critique_round(
                        &run_id,
                        r,
                        &requirement_trunc,
                        &mut current_solution,
                        &mut current_answer_id,
                        &mut answer_text,
                        &mut score,
                        &mut token_budget,
                        &mut transcript,
                    )
                    .await
                {
                    self.emit(RunEvent::run_failed(run_id.clone(), now_ms(), err.to_string()));
                    return Err(err);
                }

                if guard.check_round(&rs).is_err() {
                    early_stop_reason = Some("round_time_budget_exceeded".to_string());
                    log::info!("run {} hit round time budget after round {}", run_id, r);
                    break;
                }
            }
        }

        let all_scores = score.get_all_scores();
        let (vresults, vconf) = self.validation_manager.validate_many(&answer_text);
        let best_ans = selector.select(&all_scores, &vconf, &answer_text);
        let final_solution = answer_text.get(&best_ans).cloned().unwrap_or_default();

        let mut winning_agents: Vec<String> = current_answer_id
            .iter()
            .filter(|(_, ans)| **ans == best_ans)
            .map(|(aid, _)| aid.clone())
            .collect();
        winning_agents.sort();

        let mut origin_agents: Vec<String> = Vec::new();
        for t in &transcript {
            let mut holders: Vec<String> = t
                .agents
                .iter()
                .filter(|(_, rec)| rec.response.answer_id == best_ans)
                .map(|(aid, _)| aid.clone())
                .collect();
            if !holders.is_empty() {
                holders.sort();
                origin_agents = holders;
                break;
            }
        }

        let holders_history: HashMap<usize, Vec<String>> = transcript
            .iter()
            .map(|t| {
                let mut holders: Vec<String> = t
                    .agents
                    .iter()
                    .filter(|(_, rec)| rec.response.answer_id == best_ans)
                    .map(|(aid, _)| aid.clone())
                    .collect();
                holders.sort();
                (t.round_index, holders)
            })
            .collect();

        self.emit(RunEvent::final_answer_selected(
            run_id.clone(),
            now_ms(),
            best_ans.clone(),
            winning_agents.clone(),
            all_scores.clone(),
        ));

        let metrics = compute_metrics(&transcript, &best_ans, &vresults, self.agents.len(), &all_scores);

        let score_explainers = answer_text
            .keys()
            .map(|ans| (ans.clone(), score.explain_score(ans)))
            .collect();

        log::info!("run {} completed", run_id);
        self.emit(RunEvent::run_completed(run_id.clone(), now_ms(), best_ans.clone()));

        Ok(RunResult {
            final_answer_id: best_ans,
            final_solution,
            scores: all_scores,
            raw_scores: score.get_raw_scores(),
            winning_agents,
            origin_agents,
            holders_history,
            early_stop_reason,
            transcript,
            validation: vresults,
            validator_confidence: vconf,
            score_explainers,
            metrics,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_generation_round(
        &self,
        run_id: &str,
        requirement: &str,
        current_solution: &mut HashMap<String, String>,
        current_answer_id: &mut HashMap<String, String>,
        answer_text: &mut HashMap<String, String>,
        score: &mut ScoreTracker,
        token_budget: &mut TokenBudget,
        transcript: &mut Vec<RoundTranscript>,
    ) -> Result<(), FreeMadError> {
        log::info!("round 0 (generation) started");
        self.emit(RunEvent::round_started(run_id, now_ms(), 0, RoundType::Generation));

        let semaphore = Arc::new(Semaphore::new(self.pool_size()));
        let mut set: JoinSet<(String, Result<AgentResponse, String>)> = JoinSet::new();
        for aid in &self.agent_order {
            self.emit(RunEvent::agent_generate_started(run_id, now_ms(), 0, aid.clone()));
            let agent = self.agents[aid].clone();
            let aid_owned = aid.clone();
            let requirement_owned = requirement.to_string();
            let sem = semaphore.clone();
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("generation semaphore closed");
                let result = agent.generate(&requirement_owned).await;
                (aid_owned, result.map_err(|e| e.to_string()))
            });
        }

        let mut gen_agents: HashMap<String, AgentRoundRecord> = HashMap::new();
        while let Some(joined) = set.join_next().await {
            let (aid, result) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    log::error!("generation task panicked: {}", join_err);
                    continue;
                }
            };
            let resp = result.unwrap_or_else(|err_msg| AgentResponse {
                agent_id: aid.clone(),
                solution: String::new(),
                reasoning: err_msg,
                answer_id: compute_answer_id(""),
                metadata: Metadata::default(),
            });

            answer_text.insert(resp.answer_id.clone(), resp.solution.clone());
            current_solution.insert(aid.clone(), resp.solution.clone());
            current_answer_id.insert(aid.clone(), resp.answer_id.clone());
            if !resp.solution.trim().is_empty() {
                score.record_initial(&aid, &resp.answer_id, 0);
            }
            token_budget.add(resp.metadata.tokens.prompt + resp.metadata.tokens.output)?;

            self.emit(RunEvent::agent_generate_finished(run_id, now_ms(), 0, aid.clone(), resp.answer_id.clone()));
            gen_agents.insert(
                aid.clone(),
                AgentRoundRecord {
                    response: AgentRoundResponse {
                        agent_id: aid.clone(),
                        solution: resp.solution,
                        reasoning: resp.reasoning,
                        decision: Decision::Keep,
                        changed: false,
                        answer_id: resp.answer_id,
                        metadata: resp.metadata,
                    },
                    peers_assigned: Vec::new(),
                    peers_seen: Vec::new(),
                },
            );
        }

        let scores_round0 = score.get_all_scores();
        let holders_round0 = holders_for(&scores_round0, current_answer_id);
        transcript.push(RoundTranscript {
            round_index: 0,
            round_type: RoundType::Generation,
            agents: gen_agents,
            scores: scores_round0.clone(),
            topology_info: if self.cfg.output.include_topology_info {
                self.topology.info()
            } else {
                serde_json::json!({})
            },
            deadline_hit_soft: false,
            deadline_hit_hard: false,
        });
        log::info!("round 0 (generation) completed");
        self.emit(RunEvent::scores_updated(run_id, now_ms(), 0, RoundType::Generation, scores_round0, holders_round0));
        self.emit(RunEvent::round_completed(run_id, now_ms(), 0, RoundType::Generation));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_critique_round(
        &self,
        run_id: &str,
        round_index: usize,
        requirement: &str,
        current_solution: &mut HashMap<String, String>,
        current_answer_id: &mut HashMap<String, String>,
        answer_text: &mut HashMap<String, String>,
        score: &mut ScoreTracker,
        token_budget: &mut TokenBudget,
        transcript: &mut Vec<RoundTranscript>,
    ) -> Result<(), FreeMadError> {
        log::info!("round {} (critique) started", round_index);
        self.emit(RunEvent::round_started(run_id, now_ms(), round_index, RoundType::Critique));

        let peers_map = self.topology.assign_peers(&self.agent_order);
        let mut peer_bundles: HashMap<String, Vec<String>> = HashMap::new();
        for aid in &self.agent_order {
            let assigned = peers_map.get(aid).cloned().unwrap_or_default();
            let bundle = assigned
                .iter()
                .filter_map(|p| current_solution.get(p))
                .map(|sol| enforce_size(sol, self.cfg.security.max_solution_size, "peer_solution").0)
                .collect();
            peer_bundles.insert(aid.clone(), bundle);
        }

        let semaphore = Arc::new(Semaphore::new(self.pool_size()));
        let mut set = JoinSet::new();
        let mut id_to_agent: HashMap<tokio::task::Id, String> = HashMap::new();
        for aid in &self.agent_order {
            self.emit(RunEvent::agent_critique_started(run_id, now_ms(), round_index, aid.clone()));
            let agent = self.agents[aid].clone();
            let requirement_owned = requirement.to_string();
            let own_solution = enforce_size(
                current_solution.get(aid).map(|s| s.as_str()).unwrap_or(""),
                self.cfg.security.max_solution_size,
                "own_solution",
            )
            .0;
            let peers = peer_bundles.get(aid).cloned().unwrap_or_default();
            let sem = semaphore.clone();
            let handle = set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("critique semaphore closed");
                agent
                    .critique_and_refine(&requirement_owned, &own_solution, &peers)
                    .await
                    .map_err(|e| e.to_string())
            });
            id_to_agent.insert(handle.id(), aid.clone());
        }

        let soft = Duration::from_millis(self.cfg.deadlines.soft_timeout_ms);
        let hard = Duration::from_millis(self.cfg.deadlines.hard_timeout_ms);
        let outcome = deadline::collect(set, id_to_agent, soft, hard, self.cfg.deadlines.min_agents).await;
        if outcome.deadline_hit_soft {
            log::debug!("round {} hit the soft deadline", round_index);
        }
        if outcome.deadline_hit_hard {
            log::debug!("round {} hit the hard deadline, abandoning: {:?}", round_index, outcome.still_running);
        }

        let mut round_agents: HashMap<String, AgentRoundRecord> = HashMap::new();
        for aid in &self.agent_order {
            let peers_assigned = peers_map.get(aid).cloned().unwrap_or_default();
            let peers_seen = peers_assigned.clone();
            let prior_answer = current_answer_id[aid].clone();

            match outcome.completed.get(aid) {
                None => {
                    // Abandoned at the hard deadline, or still running: carry forward as KEEP.
                    score.record_keep(aid, &prior_answer, round_index);
                    self.emit(RunEvent::agent_critique_finished(
                        run_id,
                        now_ms(),
                        round_index,
                        aid.clone(),
                        prior_answer.clone(),
                        Decision::Keep,
                        false,
                    ));
                    round_agents.insert(
                        aid.clone(),
                        AgentRoundRecord {
                            response: AgentRoundResponse {
                                agent_id: aid.clone(),
                                solution: current_solution[aid].clone(),
                                reasoning: "timeout carry-forward".to_string(),
                                decision: Decision::Keep,
                                changed: false,
                                answer_id: prior_answer,
                                metadata: Metadata::default(),
                            },
                            peers_assigned,
                            peers_seen,
                        },
                    );
                }
                Some(Err(err_msg)) => {
                    score.record_keep(aid, &prior_answer, round_index);
                    self.emit(RunEvent::agent_critique_finished(
                        run_id,
                        now_ms(),
                        round_index,
                        aid.clone(),
                        prior_answer.clone(),
                        Decision::Keep,
                        false,
                    ));
                    round_agents.insert(
                        aid.clone(),
                        AgentRoundRecord {
                            response: AgentRoundResponse {
                                agent_id: aid.clone(),
                                solution: current_solution[aid].clone(),
                                reasoning: err_msg.clone(),
                                decision: Decision::Keep,
                                changed: false,
                                answer_id: prior_answer,
                                metadata: Metadata::default(),
                            },
                            peers_assigned,
                            peers_seen,
                        },
                    );
                }
                Some(Ok(resp)) => {
                    let tokens = resp.metadata.tokens.prompt + resp.metadata.tokens.output;
                    let accepted_revise = resp.decision == Decision::Revise && !resp.solution.trim().is_empty();
                    let (decision, changed, answer_id, solution) = if accepted_revise {
                        current_solution.insert(aid.clone(), resp.solution.clone());
                        current_answer_id.insert(aid.clone(), resp.answer_id.clone());
                        answer_text.insert(resp.answer_id.clone(), resp.solution.clone());
                        score.record_change(aid, &prior_answer, &resp.answer_id, round_index);
                        (Decision::Revise, true, resp.answer_id.clone(), resp.solution.clone())
                    } else {
                        score.record_keep(aid, &prior_answer, round_index);
                        (Decision::Keep, false, prior_answer.clone(), current_solution[aid].clone())
                    };
                    token_budget.add(tokens)?;

                    self.emit(RunEvent::agent_critique_finished(
                        run_id,
                        now_ms(),
                        round_index,
                        aid.clone(),
                        answer_id.clone(),
                        decision,
                        changed,
                    ));
                    round_agents.insert(
                        aid.clone(),
                        AgentRoundRecord {
                            response: AgentRoundResponse {
                                agent_id: aid.clone(),
                                solution,
                                reasoning: resp.reasoning.clone(),
                                decision,
                                changed,
                                answer_id,
                                metadata: resp.metadata.clone(),
                            },
                            peers_assigned,
                            peers_seen,
                        },
                    );
                }
            }
        }

        let scores_round = score.get_all_scores();
        let holders_round = holders_for(&scores_round, current_answer_id);
        transcript.push(RoundTranscript {
            round_index,
            round_type: RoundType::Critique,
            agents: round_agents,
            scores: scores_round.clone(),
            topology_info: if self.cfg.output.include_topology_info {
                self.topology.info()
            } else {
                serde_json::json!({})
            },
            deadline_hit_soft: outcome.deadline_hit_soft,
            deadline_hit_hard: outcome.deadline_hit_hard,
        });
        log::info!("round {} (critique) completed", round_index);
        self.emit(RunEvent::scores_updated(run_id, now_ms(), round_index, RoundType::Critique, scores_round, holders_round));
        self.emit(RunEvent::round_completed(run_id, now_ms(), round_index, RoundType::Critique));
        Ok(())
    }
}

fn compute_metrics(
    transcript: &[RoundTranscript],
    final_id: &str,
    vresults: &HashMap<String, HashMap<String, ValidationResult>>,
    num_agents: usize,
    all_scores: &HashMap<String, f64>,
) -> Metrics {
    let num_rounds = transcript.len().saturating_sub(1) as f64;
    let deadline_soft_hits = transcript.iter().filter(|t| t.deadline_hit_soft).count() as f64;
    let deadline_hard_hits = transcript.iter().filter(|t| t.deadline_hit_hard).count() as f64;

    let mut opinion_changes = 0.0;
    for t in transcript {
        if t.round_type == RoundType::Critique {
            opinion_changes += t.agents.values().filter(|rec| rec.response.changed).count() as f64;
        }
    }

    let agreement_rate = transcript
        .last()
        .map(|last| {
            let matching = last.agents.values().filter(|rec| rec.response.answer_id == final_id).count();
            matching as f64 / (num_agents.max(1) as f64)
        })
        .unwrap_or(0.0);

    let scores: Vec<f64> = all_scores.values().cloned().collect();
    let (score_min, score_max, score_mean) = if scores.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (min, max, mean)
    };

    let (v_pass, v_total) = match vresults.get(final_id) {
        Some(results) => (
            results.values().filter(|v| v.passed).count() as f64,
            (results.len().max(1)) as f64,
        ),
        None => (0.0, 1.0),
    };

    Metrics {
        num_rounds,
        num_agents: num_agents as f64,
        deadline_soft_hits,
        deadline_hard_hits,
        opinion_changes,
        agreement_rate,
        score_min,
        score_max,
        score_mean,
        validation_pass_rate: v_pass / v_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_mad::agent::{MockAgent, MockStep};
    use crate::free_mad::config::Config;
    use std::sync::Mutex;

    fn cfg_with_transcript_dir() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.output.transcript_dir = dir.path().to_string_lossy().to_string();
        std::mem::forget(dir);
        cfg
    }

    struct Capturer(Mutex<Vec<RunEvent>>);
    impl RunObserver for Capturer {
        fn on_event(&self, event: &RunEvent) -> Result<(), String> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn s1_two_agents_one_adopts_peer() {
        let mut cfg = cfg_with_transcript_dir();
        cfg.agents = vec![];
        cfg.deadlines.min_agents = 2;
        cfg.deadlines.soft_timeout_ms = 2000;
        cfg.deadlines.hard_timeout_ms = 4000;

        let a1 = Arc::new(MockAgent::new(
            "a1",
            vec![MockStep::generate("ANS_A"), MockStep::keep()],
        ));
        let a2 = Arc::new(MockAgent::new(
            "a2",
            vec![MockStep::generate("ANS_B"), MockStep::revise("ANS_A")],
        ));

        let orch = Orchestrator::new(cfg, vec![a1, a2]).unwrap();
        let result = orch.run("req", 1, Some("run-s1".to_string())).await.unwrap();

        let id_a = compute_answer_id("ANS_A");
        let id_b = compute_answer_id("ANS_B");
        assert_eq!(result.final_answer_id, id_a);
        let mut winners = result.winning_agents.clone();
        winners.sort();
        assert_eq!(winners, vec!["a1".to_string(), "a2".to_string()]);
        // a1 initial(20) + a1 keep@r1(20*0.5=10) + a2 change-gain@r1(30*0.5=15) = 45.
        assert!((result.raw_scores[&id_a] - 45.0).abs() < 1e-9);
        // a2 initial(20) - change-loss@r1(25*0.5=12.5) = 7.5.
        assert!((result.raw_scores[&id_b] - 7.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn s2_deterministic_tiebreak_picks_lexicographic_min() {
        let cfg = cfg_with_transcript_dir();
        let a1 = Arc::new(MockAgent::new("a1", vec![MockStep::generate("AAA")]));
        let a2 = Arc::new(MockAgent::new("a2", vec![MockStep::generate("BBB")]));
        let orch = Orchestrator::new(cfg, vec![a1, a2]).unwrap();
        let result = orch.run("req", 0, None).await.unwrap();
        assert_eq!(result.final_answer_id, compute_answer_id("AAA"));
    }

    #[tokio::test]
    async fn s3_random_tiebreak_is_seed_reproducible() {
        let mut cfg = cfg_with_transcript_dir();
        cfg.scoring.tie_break = "random".to_string();
        cfg.scoring.random_seed = 999;
        let a1 = Arc::new(MockAgent::new("a1", vec![MockStep::generate("AAA")]));
        let a2 = Arc::new(MockAgent::new("a2", vec![MockStep::generate("BBB")]));
        let orch = Orchestrator::new(cfg.clone(), vec![a1, a2]).unwrap();
        let result1 = orch.run("req", 0, None).await.unwrap();

        let a1b = Arc::new(MockAgent::new("a1", vec![MockStep::generate("AAA")]));
        let a2b = Arc::new(MockAgent::new("a2", vec![MockStep::generate("BBB")]));
        let orch2 = Orchestrator::new(cfg, vec![a1b, a2b]).unwrap();
        let result2 = orch2.run("req", 0, None).await.unwrap();

        assert_eq!(result1.final_answer_id, result2.final_answer_id);
    }

    #[tokio::test]
    async fn s4_soft_deadline_hit_but_not_hard() {
        let mut cfg = cfg_with_transcript_dir();
        cfg.deadlines.soft_timeout_ms = 100;
        cfg.deadlines.hard_timeout_ms = 300;
        cfg.deadlines.min_agents = 2;

        let fast = Arc::new(MockAgent::new(
            "fast",
            vec![
                MockStep::generate("ANS"),
                MockStep::keep().with_delay(Duration::from_millis(20)),
            ],
        ));
        let slow = Arc::new(MockAgent::new(
            "slow",
            vec![
                MockStep::generate("ANS"),
                MockStep::keep().with_delay(Duration::from_millis(150)),
            ],
        ));

        let orch = Orchestrator::new(cfg, vec![fast, slow]).unwrap();
        let result = orch.run("req", 1, None).await.unwrap();

        let round1 = &result.transcript[1];
        assert!(round1.deadline_hit_soft);
        assert!(!round1.deadline_hit_hard);
        assert_eq!(round1.agents.len(), 2);
    }

    #[tokio::test]
    async fn s5_round_time_budget_triggers_early_stop() {
        let mut cfg = cfg_with_transcript_dir();
        cfg.budget.max_round_time_sec = 0.02;
        cfg.deadlines.soft_timeout_ms = 2000;
        cfg.deadlines.hard_timeout_ms = 4000;
        cfg.deadlines.min_agents = 2;

        let a1 = Arc::new(MockAgent::new(
            "a1",
            vec![
                MockStep::generate("ANS"),
                MockStep::keep().with_delay(Duration::from_millis(100)),
            ],
        ));
        let a2 = Arc::new(MockAgent::new(
            "a2",
            vec![
                MockStep::generate("ANS"),
                MockStep::keep().with_delay(Duration::from_millis(100)),
            ],
        ));

        let orch = Orchestrator::new(cfg, vec![a1, a2]).unwrap();
        let result = orch.run("req", 5, None).await.unwrap();

        assert_eq!(result.early_stop_reason.as_deref(), Some("round_time_budget_exceeded"));
        assert_eq!(result.transcript.len(), 2);
    }

    #[tokio::test]
    async fn s6_empty_solution_excluded_from_winning() {
        let cfg = cfg_with_transcript_dir();
        let empty = Arc::new(MockAgent::new("empty", vec![MockStep::generate(""), MockStep::keep()]));
        let real = Arc::new(MockAgent::new("real", vec![MockStep::generate("REAL"), MockStep::keep()]));

        let orch = Orchestrator::new(cfg, vec![empty, real]).unwrap();
        let result = orch.run("req", 1, None).await.unwrap();

        assert!(!result.final_solution.is_empty());
        assert_eq!(result.winning_agents, vec!["real".to_string()]);
        let empty_id = compute_answer_id("");
        if let Some(empty_score) = result.scores.get(&empty_id) {
            let max_score = result.scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(*empty_score < max_score);
        }
    }

    #[tokio::test]
    async fn emits_events_in_required_order() {
        let cfg = cfg_with_transcript_dir();
        let a1 = Arc::new(MockAgent::new("a1", vec![MockStep::generate("AAA")]));
        let capturer = Arc::new(Capturer(Mutex::new(Vec::new())));
        let orch = Orchestrator::new(cfg, vec![a1]).unwrap().with_observer(capturer.clone());
        orch.run("req", 0, Some("run-order".to_string())).await.unwrap();

        let events = capturer.0.lock().unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&crate::free_mad::event::RunEventKind::RunStarted));
        assert_eq!(kinds.last(), Some(&crate::free_mad::event::RunEventKind::RunCompleted));
        let final_idx = kinds.iter().position(|k| *k == crate::free_mad::event::RunEventKind::FinalAnswerSelected).unwrap();
        let completed_idx = kinds.iter().position(|k| *k == crate::free_mad::event::RunEventKind::RunCompleted).unwrap();
        assert!(final_idx < completed_idx);
    }
}
