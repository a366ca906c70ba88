//! Reliability wrappers for store operations.
//!
//! # Responsibility
//! - Wrap any [`Command`] with retry, rate limiting, safety gating,
//!   validation, audit logging, result checks, recovery and timing.
//! - Provide [`Guards`], a composition root that stacks the wrappers in
//!   one fixed order.
//!
//! # Invariants
//! - Order from inside out: timing, retry, validation, safety, rate limit,
//!   verification. The audit wrapper therefore observes the final outcome
//!   of everything beneath it, including exhausted retries and policy
//!   rejections.
//! - Hand-built stacks through [`CommandExt`] wrap innermost-first.

pub mod audit;
pub mod command;
pub mod error;
pub mod rate_limit;
pub mod recovery;
pub mod retry;
pub mod safety;
pub mod timing;

pub use audit::{ResultVerified, Verified};
pub use command::{command_fn, BoxCommand, CallContext, Command, CommandExt, FnCommand};
pub use error::{ReliabilityError, ReliabilityResult};
pub use rate_limit::{RateLimited, RateLimiter};
pub use recovery::{Recovering, RecoveryStrategy};
pub use retry::{Retry, RetryPolicy};
pub use safety::{is_destructive, SafetyCheck, SafetyChecked, Validated, DESTRUCTIVE_KEYWORDS};
pub use timing::Timed;

use crate::service::action_verifier::ActionVerifier;
use crate::validation::ValidationError;
use std::sync::Arc;

type ValidatorFn = Arc<dyn Fn(&CallContext) -> Result<(), ValidationError> + Send + Sync>;

/// Shared wrapper configuration applied by [`Guards::wrap`].
#[derive(Clone, Default)]
pub struct Guards {
    retry: Option<RetryPolicy>,
    validator: Option<ValidatorFn>,
    safety: Option<SafetyCheck>,
    rate_limit: Option<(Arc<RateLimiter>, String)>,
    verifier: Option<ActionVerifier>,
}

impl Guards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&CallContext) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_safety(mut self, check: SafetyCheck) -> Self {
        self.safety = Some(check);
        self
    }

    pub fn with_rate_limit(mut self, limiter: Arc<RateLimiter>, key: impl Into<String>) -> Self {
        self.rate_limit = Some((limiter, key.into()));
        self
    }

    pub fn with_verification(mut self, verifier: ActionVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Stacks every configured wrapper around `command`.
    pub fn wrap<'a, C>(&self, command: C) -> BoxCommand<'a, C::Output>
    where
        C: Command + 'a,
        C::Output: 'a,
    {
        let mut stacked = command.timed().boxed();
        if let Some(policy) = &self.retry {
            stacked = stacked.retry(policy.clone()).boxed();
        }
        if let Some(validator) = &self.validator {
            let validator = Arc::clone(validator);
            stacked = stacked
                .validated(move |ctx: &CallContext| validator(ctx))
                .boxed();
        }
        if let Some(check) = &self.safety {
            stacked = stacked.safety_checked(check.clone()).boxed();
        }
        if let Some((limiter, key)) = &self.rate_limit {
            stacked = stacked
                .rate_limited(Arc::clone(limiter), key.as_str())
                .boxed();
        }
        if let Some(verifier) = &self.verifier {
            stacked = stacked.verified(verifier.clone()).boxed();
        }
        stacked
    }

    /// Wraps `command` and executes it once under `ctx`.
    pub fn run<C: Command>(&self, ctx: &CallContext, command: C) -> ReliabilityResult<C::Output> {
        self.wrap(command).execute(ctx)
    }
}

impl std::fmt::Debug for Guards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guards")
            .field("retry", &self.retry)
            .field("validator", &self.validator.is_some())
            .field("safety", &self.safety)
            .field("rate_limit", &self.rate_limit.as_ref().map(|(_, key)| key))
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{command_fn, CallContext, Guards, RateLimiter, ReliabilityError, RetryPolicy, SafetyCheck};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn empty_guards_only_time_the_call() {
        let result = Guards::new().run(&CallContext::new("noop"), command_fn(|_ctx: &CallContext| Ok(5)));
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn safety_runs_before_retry_so_rejections_are_not_retried() {
        let mut calls = 0;
        let guards = Guards::new()
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), 1.0))
            .with_safety(SafetyCheck::RequireConfirm);

        let result = guards.run(
            &CallContext::new("delete_workspace"),
            command_fn(|_ctx: &CallContext| {
                calls += 1;
                Ok(())
            }),
        );

        assert!(matches!(result, Err(ReliabilityError::SafetyCheckFailed(_))));
        assert_eq!(calls, 0);
    }

    #[test]
    fn rate_limit_counts_one_slot_per_call_even_when_retried() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let guards = Guards::new()
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), 1.0))
            .with_rate_limit(Arc::clone(&limiter), "writes");

        let mut attempts = 0;
        let first = guards.run(
            &CallContext::new("set_context"),
            command_fn(|_ctx: &CallContext| {
                attempts += 1;
                if attempts < 2 {
                    Err(ReliabilityError::operation("transient"))
                } else {
                    Ok(attempts)
                }
            }),
        );
        assert_eq!(first.unwrap(), 2);
        assert_eq!(limiter.in_window("writes"), 1);

        let second = guards.run(
            &CallContext::new("set_context"),
            command_fn(|_ctx: &CallContext| Ok(0)),
        );
        assert!(matches!(second, Err(ReliabilityError::RateLimitExceeded { .. })));
    }

    #[test]
    fn validator_rejects_before_the_command_runs() {
        let guards = Guards::new().with_validator(|ctx: &CallContext| {
            crate::validation::validate_workspace_id(ctx.workspace_id.unwrap_or(0)).map(|_| ())
        });

        let rejected = guards.run(
            &CallContext::new("set_context"),
            command_fn(|_ctx: &CallContext| Ok(())),
        );
        assert!(matches!(rejected, Err(ReliabilityError::Validation(_))));

        let accepted = guards.run(
            &CallContext::new("set_context").in_workspace(4),
            command_fn(|_ctx: &CallContext| Ok(())),
        );
        assert!(accepted.is_ok());
    }
}
