//! Poll-until-target waiter
//!
//! [`StateChangeConf`] repeatedly calls a refresh function until the
//! reported status enters the target set, leaves the pending set, or the
//! timeout elapses.
//!
//! ## Refresh Contract
//!
//! A refresh returns `(object, status)`:
//! - `(None, status)` with `status` not in `target`: not found yet
//!   (eventual consistency); counted against `not_found_checks`, or
//!   treated as success when `target` is empty
//! - `(_, status)` with `status` in `target`: done
//! - `(_, status)` with `status` in `pending`: keep polling
//! - anything else: [`Error::UnexpectedState`]
//!
//! A refresh error stops the wait immediately.
//!
//! ## Backoff
//!
//! Without a fixed `poll_interval`, the interval starts at 100ms and doubles
//! up to 10s, never going below `min_timeout`.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::WaitConfig;
use crate::error::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Settings for one wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// Statuses that mean "keep waiting"
    pub pending: Vec<String>,
    /// Statuses that mean "done"
    pub target: Vec<String>,
    /// Overall time budget
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Smallest backoff interval
    pub min_timeout: Duration,
    /// Fixed interval between refreshes, overriding backoff
    pub poll_interval: Option<Duration>,
    /// Consecutive not-found results tolerated
    pub not_found_checks: usize,
    /// Consecutive target observations required
    pub continuous_target_occurence: usize,
}

impl StateChangeConf {
    /// Create a waiter with default polling settings
    pub fn new<P, T>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator,
        P::Item: ToString,
        T: IntoIterator,
        T::Item: ToString,
    {
        Self {
            pending: pending.into_iter().map(|s| s.to_string()).collect(),
            target: target.into_iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            not_found_checks: 20,
            continuous_target_occurence: 1,
        }
    }

    /// Apply shared polling settings
    pub fn with_wait_config(mut self, wait: &WaitConfig) -> Self {
        self.delay = Duration::from_millis(wait.delay_ms);
        self.min_timeout = Duration::from_millis(wait.min_timeout_ms);
        self.poll_interval = wait.poll_interval_ms.map(Duration::from_millis);
        self.not_found_checks = wait.not_found_checks;
        self
    }

    fn expected(&self) -> String {
        self.target.join(", ")
    }

    fn next_interval(&self, previous: Duration) -> Duration {
        if let Some(interval) = self.poll_interval {
            return interval;
        }

        let doubled = if previous.is_zero() {
            INITIAL_BACKOFF
        } else {
            (previous * 2).min(MAX_BACKOFF)
        };
        doubled.max(self.min_timeout)
    }

    /// Poll `refresh` until a target status is reached
    ///
    /// Returns the object reported alongside the final status, which is
    /// `None` when success was "not found" (empty target set).
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(Option<T>, String)>>,
    {
        let deadline = Instant::now() + self.timeout;
        let timeout_error = |last_state: &str| Error::Timeout {
            last_state: last_state.to_string(),
            expected: self.expected(),
            timeout: self.timeout,
        };

        debug!(
            "Waiting for state to become: [{}] (pending: [{}], timeout: {:?})",
            self.expected(),
            self.pending.join(", "),
            self.timeout
        );

        if !self.delay.is_zero() {
            if Instant::now() + self.delay >= deadline {
                return Err(timeout_error(""));
            }
            tokio::time::sleep(self.delay).await;
        }

        let mut last_state = String::new();
        let mut not_found_ticks = 0usize;
        let mut target_occurence = 0usize;
        let mut interval = Duration::ZERO;

        loop {
            let (object, state) = match tokio::time::timeout_at(deadline, refresh()).await {
                Ok(result) => result?,
                Err(_) => return Err(timeout_error(&last_state)),
            };

            let in_target = self.target.iter().any(|t| *t == state);

            if object.is_none() && !in_target {
                target_occurence = 0;
                if self.target.is_empty() {
                    debug!("Resource is gone, which is the target");
                    return Ok(None);
                }

                not_found_ticks += 1;
                trace!("Resource not found ({}/{})", not_found_ticks, self.not_found_checks);
                if not_found_ticks > self.not_found_checks {
                    return Err(Error::not_found(format!(
                        "couldn't find resource ({} retries)",
                        self.not_found_checks
                    )));
                }
            } else {
                not_found_ticks = 0;
                last_state = state;
                trace!("Observed state: {}", last_state);

                if in_target {
                    target_occurence += 1;
                    if target_occurence >= self.continuous_target_occurence {
                        debug!("Reached target state: {}", last_state);
                        return Ok(object);
                    }
                } else if self.pending.iter().any(|p| *p == last_state) {
                    target_occurence = 0;
                } else {
                    return Err(Error::UnexpectedState {
                        state: last_state,
                        expected: self.expected(),
                    });
                }
            }

            interval = self.next_interval(interval);
            let now = Instant::now();
            if now >= deadline {
                return Err(timeout_error(&last_state));
            }
            let sleep_for = interval.min(deadline - now);
            tokio::time::sleep(sleep_for).await;
        }
    }
}
