//! Cycle-level circuit breaker.
//!
//! Counts consecutive failed cycles. Once the limit is hit the breaker opens
//! for a fixed number of cycles, during which no new risk is taken; after
//! that a single half-open cycle decides whether it closes again.

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    Closed { failures: u32 },
    Open { remaining: u32 },
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CycleBreaker {
    state: BreakerState,
    max_failures: u32,
    cooldown_cycles: u32,
}

impl CycleBreaker {
    pub fn new(max_failures: u32, cooldown_cycles: u32) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            max_failures: max_failures.max(1),
            cooldown_cycles,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open { .. })
    }

    pub fn allows_trading(&self) -> bool {
        !self.is_open()
    }

    /// Advance the open countdown. Call once at the top of every cycle.
    pub fn begin_cycle(&mut self) {
        if let BreakerState::Open { remaining } = self.state {
            if remaining <= 1 {
                info!("Circuit breaker half-open, probing");
                self.state = BreakerState::HalfOpen;
            } else {
                self.state = BreakerState::Open { remaining: remaining - 1 };
            }
        }
    }

    pub fn record_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { failures: 0 }) {
            if self.state == BreakerState::HalfOpen {
                info!("Circuit breaker closed");
            }
            self.state = BreakerState::Closed { failures: 0 };
        }
    }

    /// Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.max_failures {
                    self.trip(failures);
                    true
                } else {
                    self.state = BreakerState::Closed { failures };
                    false
                }
            }
            BreakerState::HalfOpen => {
                self.trip(self.max_failures);
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    fn trip(&mut self, failures: u32) {
        warn!(failures, cooldown_cycles = self.cooldown_cycles, "Circuit breaker opened");
        self.state = BreakerState::Open {
            remaining: self.cooldown_cycles.max(1),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_consecutive_failures() {
        let mut breaker = CycleBreaker::new(3, 2);
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        breaker.record_success();
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(breaker.record_failure());
        assert!(!breaker.allows_trading());
    }

    #[test]
    fn test_half_open_trial_cycle() {
        let mut breaker = CycleBreaker::new(1, 2);
        assert!(breaker.record_failure());

        breaker.begin_cycle();
        assert_eq!(breaker.state(), BreakerState::Open { remaining: 1 });
        breaker.begin_cycle();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allows_trading());

        // a failed trial cycle reopens immediately
        assert!(breaker.record_failure());
        assert!(breaker.is_open());

        breaker.begin_cycle();
        breaker.begin_cycle();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed { failures: 0 });
    }
}
