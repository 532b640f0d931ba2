//! Readiness polling
//!
//! Samples a status accessor at a fixed interval until it reports the target
//! value or the attempt budget is spent. Running out of attempts is a normal
//! outcome, not an error; callers decide what it means.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Budget for one readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status samples. Zero means no samples at all.
    pub max_attempts: u32,

    /// Sleep between two consecutive samples
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Total sleep a wait under this policy can add; there is no sleep
    /// after the last attempt
    pub fn worst_case(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(30),
        }
    }
}

/// Result of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Target observed on sample number `attempts`
    Reached { attempts: u32 },
    /// Budget spent after `attempts` samples without seeing the target
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, PollOutcome::Reached { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Reached { attempts } | PollOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

/// Blocking sleep used between samples
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps without blocking
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sleeps.lock().len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Bounded fixed-interval poller
pub struct ReadinessPoller<'a> {
    sleeper: &'a dyn Sleeper,
}

impl Default for ReadinessPoller<'static> {
    fn default() -> Self {
        Self {
            sleeper: &ThreadSleeper,
        }
    }
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(sleeper: &'a dyn Sleeper) -> Self {
        Self { sleeper }
    }

    /// Sample `accessor` until it returns `target` or the budget runs out.
    ///
    /// An `Err` sample counts as an attempt that did not match. No sleep
    /// happens after the matching sample or after the last attempt.
    pub fn wait_for<S, E, F>(&self, mut accessor: F, target: &S, policy: PollPolicy) -> PollOutcome
    where
        S: PartialEq + Debug,
        E: Display,
        F: FnMut() -> Result<S, E>,
    {
        info!(
            "Waiting for status {:?} (up to {} attempts, {:?} apart, at most {:?} asleep)",
            target,
            policy.max_attempts,
            policy.interval,
            policy.worst_case()
        );

        for attempt in 1..=policy.max_attempts {
            match accessor() {
                Ok(status) if status == *target => {
                    info!("Reached {:?} after {} attempt(s)", target, attempt);
                    return PollOutcome::Reached { attempts: attempt };
                }
                Ok(status) => {
                    debug!(
                        "Attempt {}/{}: status {:?}",
                        attempt, policy.max_attempts, status
                    );
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: status unavailable: {}",
                        attempt, policy.max_attempts, e
                    );
                }
            }

            if attempt < policy.max_attempts {
                self.sleeper.sleep(policy.interval);
            }
        }

        warn!(
            "Gave up waiting for {:?} after {} attempt(s)",
            target, policy.max_attempts
        );
        PollOutcome::Exhausted {
            attempts: policy.max_attempts,
        }
    }
}
