//! Core error kinds.
//!
//! FREE-MAD never aborts a run over an individual agent misbehaving; the
//! variants below are the closed set of ways a run can end early or a
//! caller-facing operation can fail outright.

use std::error::Error;
use std::fmt;

/// Errors raised directly by the orchestration core.
///
/// `ConfigError` is fatal and only ever raised at config-load time, never
/// from within a running orchestrator. `BudgetExceeded` surfaces a token
/// budget breach (wall-clock breaches are handled internally and recorded
/// as `early_stop_reason` instead of raised). `Observer` wraps an error an
/// observer callback raised; it is always swallowed by the orchestrator
/// and never returned to a caller, but is a distinct variant so it can be
/// logged with its own message.
#[derive(Debug)]
pub enum FreeMadError {
    Config(String),
    BudgetExceeded(String),
    Observer(String),
}

impl fmt::Display for FreeMadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeMadError::Config(msg) => write!(f, "configuration error: {}", msg),
            FreeMadError::BudgetExceeded(msg) => write!(f, "budget exceeded: {}", msg),
            FreeMadError::Observer(msg) => write!(f, "observer error: {}", msg),
        }
    }
}

impl Error for FreeMadError {}
