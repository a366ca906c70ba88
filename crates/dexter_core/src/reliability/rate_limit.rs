//! Sliding-window rate limiting.
//!
//! # Invariants
//! - A key admits at most `max_calls` calls in any trailing `window`.
//! - Expired timestamps are pruned on each check; there is no sweeper.
//! - A rejected call records nothing, so rejections do not extend the
//!   lockout.
//! - Limiters are explicit values shared through `Arc`; there is no global.

use super::command::{CallContext, Command};
use super::error::{ReliabilityError, ReliabilityResult};
use log::warn;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// 100 store writes per minute.
    pub fn db_writes() -> Self {
        Self::new(100, MINUTE)
    }

    /// 50 external API calls per minute.
    pub fn api_calls() -> Self {
        Self::new(50, MINUTE)
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits one call under `key` or fails with `RateLimitExceeded`.
    pub fn check_limit(&self, key: &str) -> ReliabilityResult<()> {
        self.check_limit_at(key, Instant::now())
    }

    pub(crate) fn check_limit_at(&self, key: &str, now: Instant) -> ReliabilityResult<()> {
        let mut calls = self.calls.lock();
        let history = calls.entry(key.to_string()).or_default();

        while history
            .front()
            .is_some_and(|call| now.saturating_duration_since(*call) >= self.window)
        {
            history.pop_front();
        }

        if history.len() >= self.max_calls {
            warn!(
                "event=rate_limit module=reliability status=rejected key={} max_calls={} window_s={}",
                key,
                self.max_calls,
                self.window.as_secs()
            );
            return Err(ReliabilityError::RateLimitExceeded {
                key: key.to_string(),
                max_calls: self.max_calls,
                window: self.window,
            });
        }

        history.push_back(now);
        Ok(())
    }

    /// Calls currently counted against `key`.
    pub fn in_window(&self, key: &str) -> usize {
        let now = Instant::now();
        self.calls.lock().get(key).map_or(0, |history| {
            history
                .iter()
                .filter(|call| now.saturating_duration_since(**call) < self.window)
                .count()
        })
    }
}

/// Rejects the inner command once its key is over the limit.
#[derive(Debug)]
pub struct RateLimited<C> {
    inner: C,
    limiter: Arc<RateLimiter>,
    key: String,
}

impl<C> RateLimited<C> {
    pub fn new(inner: C, limiter: Arc<RateLimiter>, key: impl Into<String>) -> Self {
        Self {
            inner,
            limiter,
            key: key.into(),
        }
    }
}

impl<C: Command> Command for RateLimited<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        self.limiter.check_limit(&self.key)?;
        self.inner.execute(ctx)
    }
}
