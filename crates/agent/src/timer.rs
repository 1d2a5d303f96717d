//! Timer-driven generations.
//!
//! A persona with a timer cycle speaks on its own every `cycle` minutes: a
//! `SystemNotice` carrying the timer message is appended and a generation is
//! triggered. Consecutive timer generations without a user message are
//! capped, and a failed generation stops the timer until the user speaks
//! again.

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    /// Unix seconds of the last generation (timer or user)
    pub last_generated: i64,
    /// Timer generations since the last user message
    pub consecutive: u32,
}

impl TimerState {
    pub fn new(now: i64) -> Self {
        Self {
            last_generated: now,
            consecutive: 0,
        }
    }

    /// Decide whether a timer generation is due at `now`, and record it if so.
    pub fn poll(&mut self, now: i64, cycle_minutes: u64, limit: u32, generating: bool) -> bool {
        if cycle_minutes == 0 {
            return false;
        }
        let cycle_secs = i64::try_from(cycle_minutes.saturating_mul(60)).unwrap_or(i64::MAX);
        if now < self.last_generated.saturating_add(cycle_secs) {
            return false;
        }
        if self.consecutive >= limit {
            debug!(limit, "Timer generation limit reached, skipping");
            return false;
        }
        if generating {
            debug!("Generation in progress, skipping timer");
            return false;
        }

        self.last_generated = now;
        self.consecutive += 1;
        true
    }

    /// A user message restarts the cycle and the consecutive count.
    pub fn reset(&mut self, now: i64) {
        self.last_generated = now;
        self.consecutive = 0;
    }

    /// Stop timer generations until the next [`TimerState::reset`].
    pub fn halt(&mut self) {
        self.consecutive = u32::MAX;
    }
}

/// Text of the notice appended before a timer generation.
pub fn timer_notice(message: &str) -> String {
    format!("<system>{message}</system>")
}
