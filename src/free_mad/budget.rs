//! Wall-clock and token budgets.

use crate::free_mad::error::FreeMadError;
use std::time::{Duration, Instant};

/// Tracks elapsed time since construction (the total-run budget) and since
/// the start of the current round (the per-round budget).
pub struct BudgetGuard {
    start: Instant,
    max_total: Duration,
    max_round: Duration,
}

/// A handle returned by `round_start`, measuring elapsed time for one round.
pub struct RoundStart(Instant);

impl BudgetGuard {
    pub fn new(max_total: Duration, max_round: Duration) -> Self {
        BudgetGuard {
            start: Instant::now(),
            max_total,
            max_round,
        }
    }

    pub fn check_total(&self) -> Result<(), FreeMadError> {
        if self.start.elapsed() > self.max_total {
            return Err(FreeMadError::BudgetExceeded(
                "total time budget exceeded".to_string(),
            ));
        }
        Ok(())
    }

    pub fn round_start(&self) -> RoundStart {
        RoundStart(Instant::now())
    }

    pub fn check_round(&self, rs: &RoundStart) -> Result<(), FreeMadError> {
        if rs.0.elapsed() > self.max_round {
            return Err(FreeMadError::BudgetExceeded(
                "round time budget exceeded".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accumulates token usage; rejects additions that would breach `cap` when
/// `enforce` is set.
pub struct TokenBudget {
    cap: u64,
    enforce: bool,
    used: u64,
}

impl TokenBudget {
    pub fn new(cap: u64, enforce: bool) -> Self {
        TokenBudget {
            cap,
            enforce,
            used: 0,
        }
    }

    /// Check-before-commit: on success `used` is incremented by `n`; on
    /// failure `used` is left unchanged.
    pub fn add(&mut self, n: u64) -> Result<(), FreeMadError> {
        if self.enforce && self.used.saturating_add(n) > self.cap {
            return Err(FreeMadError::BudgetExceeded(format!(
                "token budget exceeded: {} + {} > {}",
                self.used, n, self.cap
            )));
        }
        self.used = self.used.saturating_add(n);
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

/// Truncates `text` to `max_size` characters, appending a marker ending in
/// `...{label}]` when truncation occurred. Returns `(text, truncated)`.
pub fn enforce_size(text: &str, max_size: usize, label: &str) -> (String, bool) {
    let char_count = text.chars().count();
    if char_count <= max_size {
        return (text.to_string(), false);
    }
    let truncated: String = text.chars().take(max_size).collect();
    (format!("{}[...truncated...{}]", truncated, label), true)
}
