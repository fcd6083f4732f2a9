//! The agent capability contract the orchestrator consumes, plus an
//! in-process mock implementation for tests and downstream integration use.
//!
//! Subprocess adapters, retry/caching policy, and output parsing all live
//! outside this crate; the orchestrator only ever calls `generate` and
//! `critique_and_refine` and treats the implementation as a black box.

use crate::free_mad::types::{AgentResponse, CritiqueResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub type AgentError = Box<dyn Error + Send + Sync>;

/// A black-box capability providing generation and critique of text
/// solutions. Implementations must be safe to invoke concurrently from
/// parallel workers operating on distinct agents.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, requirement: &str) -> Result<AgentResponse, AgentError>;

    async fn critique_and_refine(
        &self,
        requirement: &str,
        own_solution: &str,
        peer_solutions: &[String],
    ) -> Result<CritiqueResponse, AgentError>;
}

#[derive(Debug)]
pub struct ScriptError(pub String);

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for ScriptError {}

/// One scripted step for [`MockAgent`]: what to return, how long to sleep
/// before returning it, and whether to return an error instead.
pub enum MockStep {
    Generate {
        solution: String,
        reasoning: String,
        delay: Duration,
    },
    Critique {
        decision_revise: bool,
        solution: String,
        reasoning: String,
        delay: Duration,
    },
    Fail {
        message: String,
        delay: Duration,
    },
}

impl MockStep {
    pub fn generate(solution: impl Into<String>) -> Self {
        MockStep::Generate {
            solution: solution.into(),
            reasoning: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn keep() -> Self {
        MockStep::Critique {
            decision_revise: false,
            solution: String::new(),
            reasoning: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn revise(solution: impl Into<String>) -> Self {
        MockStep::Critique {
            decision_revise: true,
            solution: solution.into(),
            reasoning: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        match &mut self {
            MockStep::Generate { delay: d, .. } => *d = delay,
            MockStep::Critique { delay: d, .. } => *d = delay,
            MockStep::Fail { delay: d, .. } => *d = delay,
        }
        self
    }
}

/// A scriptable in-process [`Agent`]: each call to `generate` or
/// `critique_and_refine` pops the next queued [`MockStep`]. Used by this
/// crate's own tests to exercise the Deadline Collector (via `with_delay`)
/// and AgentFailure carry-forward (via `MockStep::Fail`) without a real
/// subprocess.
pub struct MockAgent {
    id: String,
    steps: Mutex<VecDeque<MockStep>>,
}

impl MockAgent {
    pub fn new(id: impl Into<String>, steps: Vec<MockStep>) -> Self {
        MockAgent {
            id: id.into(),
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }

    fn next_step(&self) -> MockStep {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(MockStep::keep)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, _requirement: &str) -> Result<AgentResponse, AgentError> {
        match self.next_step() {
            MockStep::Generate {
                solution,
                reasoning,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let answer_id = crate::free_mad::answer_id::compute_answer_id(&solution);
                Ok(AgentResponse {
                    agent_id: self.id.clone(),
                    solution,
                    reasoning,
                    answer_id,
                    metadata: Default::default(),
                })
            }
            MockStep::Fail { message, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(Box::new(ScriptError(message)))
            }
            MockStep::Critique { .. } => Err(Box::new(ScriptError(
                "MockAgent scripted a critique step where a generation step was expected"
                    .to_string(),
            ))),
        }
    }

    async fn critique_and_refine(
        &self,
        _requirement: &str,
        own_solution: &str,
        _peer_solutions: &[String],
    ) -> Result<CritiqueResponse, AgentError> {
        use crate::free_mad::types::Decision;
        match self.next_step() {
            MockStep::Critique {
                decision_revise,
                solution,
                reasoning,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if decision_revise {
                    let answer_id = crate::free_mad::answer_id::compute_answer_id(&solution);
                    Ok(CritiqueResponse {
                        agent_id: self.id.clone(),
                        decision: Decision::Revise,
                        changed: true,
                        solution,
                        reasoning,
                        answer_id,
                        metadata: Default::default(),
                    })
                } else {
                    let answer_id = crate::free_mad::answer_id::compute_answer_id(own_solution);
                    Ok(CritiqueResponse {
                        agent_id: self.id.clone(),
                        decision: Decision::Keep,
                        changed: false,
                        solution: own_solution.to_string(),
                        reasoning,
                        answer_id,
                        metadata: Default::default(),
                    })
                }
            }
            MockStep::Fail { message, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(Box::new(ScriptError(message)))
            }
            MockStep::Generate { .. } => Err(Box::new(ScriptError(
                "MockAgent scripted a generation step where a critique step was expected"
                    .to_string(),
            ))),
        }
    }
}
