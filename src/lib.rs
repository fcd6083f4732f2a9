// src/lib.rs

//! FREE-MAD orchestrates a small fleet of heterogeneous solver agents that
//! jointly answer a natural-language requirement via a debate protocol: an
//! initial parallel generation round followed by zero or more critique
//! rounds, culminating in a deterministic selection of a single winning
//! answer.
//!
//! See [`free_mad::orchestrator`] for the round loop, [`free_mad::scoring`]
//! for the incremental scoring engine, and [`free_mad::event`] for the
//! live event stream consumed by dashboards.

pub mod free_mad;

pub use free_mad::agent::{Agent, AgentError, MockAgent};
pub use free_mad::config::{load_config, Config};
pub use free_mad::error::FreeMadError;
pub use free_mad::event::{RunEvent, RunEventKind, RunObserver};
pub use free_mad::orchestrator::Orchestrator;
pub use free_mad::run_manager::RunManager;
pub use free_mad::types::{AgentResponse, CritiqueResponse, Decision, RoundType, RunResult};
