//! Exponential-backoff retry.
//!
//! # Invariants
//! - At most `max_retries + 1` attempts run.
//! - Only errors accepted by the policy's filter are retried; others are
//!   returned immediately.
//! - After the last attempt the final error is returned unchanged.
//! - Backoff sleeps block the calling thread.

use super::command::{CallContext, Command};
use super::error::{ReliabilityError, ReliabilityResult};
use log::{error, warn};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

type RetryFilter = Arc<dyn Fn(&ReliabilityError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    retryable: RetryFilter,
}

impl Default for RetryPolicy {
    /// Three retries starting at 1s, doubling, retrying every error.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            retryable: Arc::new(|_| true),
        }
    }
}

impl Debug for RetryPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_factor", &self.backoff_factor)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Retries only SQLite busy/locked failures.
    pub fn busy_only(mut self) -> Self {
        self.retryable = Arc::new(ReliabilityError::is_busy);
        self
    }

    /// Retries only errors accepted by `filter`.
    pub fn retry_if<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ReliabilityError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(filter);
        self
    }

    pub fn is_retryable(&self, err: &ReliabilityError) -> bool {
        (self.retryable)(err)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(0.0).powi(retry.min(30) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX)
    }

    /// Runs `attempt` under this policy. `name` only feeds log lines.
    pub(crate) fn run<T, F>(&self, name: &str, mut attempt: F) -> ReliabilityResult<T>
    where
        F: FnMut() -> ReliabilityResult<T>,
    {
        let total = self.max_retries.saturating_add(1);
        let mut retry = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.max_retries && self.is_retryable(&err) => {
                    let delay = self.delay_for(retry);
                    warn!(
                        "event=retry module=reliability status=retry operation={} attempt={}/{} delay_ms={} error={}",
                        name,
                        retry + 1,
                        total,
                        delay.as_millis(),
                        err
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
                Err(err) => {
                    if self.is_retryable(&err) {
                        error!(
                            "event=retry module=reliability status=error operation={} attempts={} error={}",
                            name,
                            retry + 1,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Re-invokes the inner command with backoff.
#[derive(Debug)]
pub struct Retry<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retry<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<C: Command> Command for Retry<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        let inner = &mut self.inner;
        self.policy.run(&ctx.operation, || inner.execute(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use crate::reliability::command::{command_fn, CallContext, Command, CommandExt};
    use crate::reliability::error::ReliabilityError;
    use std::time::Duration;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), 2.0)
    }

    #[test]
    fn delay_grows_by_backoff_factor() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn retries_until_success_within_budget() {
        let mut calls = 0;
        let mut command = command_fn(|_ctx: &CallContext| {
            calls += 1;
            if calls < 3 {
                Err(ReliabilityError::operation("flaky"))
            } else {
                Ok(calls)
            }
        })
        .retry(fast(3));

        assert_eq!(command.execute(&CallContext::new("flaky_op")).unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_retries_plus_one_attempts() {
        let mut calls = 0;
        let result = command_fn(|_ctx: &CallContext| -> Result<(), _> {
            calls += 1;
            Err(ReliabilityError::operation(format!("boom {calls}")))
        })
        .retry(fast(2))
        .execute(&CallContext::new("always_fails"));

        assert_eq!(calls, 3);
        assert!(matches!(result, Err(ReliabilityError::Operation(message)) if message == "boom 3"));
    }

    #[test]
    fn non_retryable_errors_propagate_immediately() {
        let mut calls = 0;
        let result = command_fn(|_ctx: &CallContext| -> Result<(), _> {
            calls += 1;
            Err(ReliabilityError::operation("fatal"))
        })
        .retry(fast(5).busy_only())
        .execute(&CallContext::new("fatal_op"));

        assert_eq!(calls, 1);
        assert!(result.is_err());
    }
}
