// Circuit breaker in front of the ledger store.
// After repeated storage failures the store is left alone for a while and
// requests fail fast instead of piling retries onto it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_duration: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_duration: Duration::from_millis(config.reset_timeout_ms),
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    // An open breaker lets a probe through once the reset timeout has elapsed
    pub fn should_allow_call(&self) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Closed { .. } | State::HalfOpen { .. } => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.open_duration {
                    *state = State::HalfOpen { successes: 0 };
                    info!("ledger breaker half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn success(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => *failures = 0,
            State::HalfOpen { successes } => {
                *successes += 1;
                if *successes >= self.success_threshold {
                    *state = State::Closed { failures: 0 };
                    info!("ledger breaker closed");
                }
            }
            State::Open { .. } => {}
        }
    }

    pub fn fail(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    warn!(failures = *failures, "ledger breaker opened");
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            State::HalfOpen { .. } => {
                warn!("ledger probe failed, breaker re-opened");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }
}
