// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff schedule for reconnect attempts.

use std::time::Duration;

/// Doubling backoff with a capped attempt budget.
///
/// Once the budget is spent `next_delay` returns `None`; the caller restarts
/// its probe cycle and calls [`Backoff::reset`]. There is no permanent
/// give-up state.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    attempt: u32,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, attempt: 0, max_attempts }
    }

    /// The delay before the next attempt, doubling each call, or `None` when
    /// the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.base * 2u32.saturating_pow(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Reset the attempt counter (successful connect, or probe cycle restart).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
