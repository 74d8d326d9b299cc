//! Consecutive-failure and staleness tracking

use std::time::Duration;
use tokio::time::Instant;

use super::probe::ProbeResult;
use super::types::{RestartPolicy, RestartReason};

/// Failure state mutated by every probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureWindow {
    pub consecutive_failures: u32,
    pub last_success: Instant,
}

/// Restart decision over a [`FailureWindow`]
#[derive(Debug, Clone)]
pub struct FailureCounter {
    window: FailureWindow,
    failure_threshold: u32,
    stale_data_threshold: Option<Duration>,
}

impl FailureCounter {
    pub fn new(failure_threshold: u32, stale_data_threshold: Option<Duration>, now: Instant) -> Self {
        Self {
            window: FailureWindow {
                consecutive_failures: 0,
                last_success: now,
            },
            failure_threshold,
            stale_data_threshold,
        }
    }

    pub fn from_policy(policy: &RestartPolicy, now: Instant) -> Self {
        Self::new(policy.failure_threshold, policy.stale_data_threshold, now)
    }

    pub fn window(&self) -> FailureWindow {
        self.window
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.window.consecutive_failures
    }

    /// Fold one probe outcome into the window.
    ///
    /// Any alive status clears the failure streak, but only a reported flag
    /// moves the success clock; a fail-open default does not.
    pub fn record(&mut self, result: &ProbeResult, now: Instant) {
        if result.status.is_alive() {
            self.window.consecutive_failures = 0;
            if result.is_reported_success() {
                self.window.last_success = now;
            }
        } else {
            self.window.consecutive_failures = self.window.consecutive_failures.saturating_add(1);
        }
    }

    /// Rule that currently demands a restart, if any
    pub fn escalation(&self, now: Instant) -> Option<RestartReason> {
        if self.window.consecutive_failures >= self.failure_threshold {
            return Some(RestartReason::FailureThreshold {
                failures: self.window.consecutive_failures,
            });
        }

        let stale_after = self.stale_data_threshold?;
        let since_success = now.saturating_duration_since(self.window.last_success);
        if since_success >= stale_after {
            Some(RestartReason::StaleData { since_success })
        } else {
            None
        }
    }

    pub fn should_restart(&self, now: Instant) -> bool {
        self.escalation(now).is_some()
    }

    /// Start a fresh window, used on every (re)start
    pub fn reset(&mut self, now: Instant) {
        self.window = FailureWindow {
            consecutive_failures: 0,
            last_success: now,
        };
    }
}
