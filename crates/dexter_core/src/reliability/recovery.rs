//! Pluggable error recovery.
//!
//! # Invariants
//! - Recovery never invents a success: `Skip` yields `None`, every other
//!   strategy either succeeds through the inner command or re-raises.
//! - `Rollback` re-raises the original error whatever the rollback outcome.

use super::command::{CallContext, Command};
use super::error::{ReliabilityError, ReliabilityResult};
use super::retry::RetryPolicy;
use crate::service::action_verifier::ActionVerifier;
use log::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub enum RecoveryStrategy {
    /// Backoff retry on every error; the policy's filter is ignored.
    Retry(RetryPolicy),
    /// Marks `ctx.action_id` rolled back, then re-raises.
    Rollback(ActionVerifier),
    /// Swallows the error and yields `None`.
    Skip,
    /// Logs and re-raises.
    #[default]
    Fail,
}

impl RecoveryStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Retry(_) => "retry",
            Self::Rollback(_) => "rollback",
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }
}

#[derive(Debug)]
pub struct Recovering<C> {
    inner: C,
    strategy: RecoveryStrategy,
}

impl<C> Recovering<C> {
    pub fn new(inner: C, strategy: RecoveryStrategy) -> Self {
        Self { inner, strategy }
    }
}

impl<C: Command> Command for Recovering<C> {
    type Output = Option<C::Output>;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<Option<C::Output>> {
        let err = match &self.strategy {
            RecoveryStrategy::Retry(policy) => {
                let policy = policy.clone().retry_if(|_| true);
                let inner = &mut self.inner;
                return policy.run(&ctx.operation, || inner.execute(ctx)).map(Some);
            }
            _ => match self.inner.execute(ctx) {
                Ok(output) => return Ok(Some(output)),
                Err(err) => err,
            },
        };

        warn!(
            "event=recovery module=reliability status=start strategy={} operation={} error={}",
            self.strategy.name(),
            ctx.operation,
            err
        );
        match &self.strategy {
            RecoveryStrategy::Skip => {
                info!(
                    "event=recovery module=reliability status=ok strategy=skip operation={}",
                    ctx.operation
                );
                Ok(None)
            }
            RecoveryStrategy::Rollback(verifier) => {
                rollback(verifier, ctx, &err);
                Err(err)
            }
            RecoveryStrategy::Fail | RecoveryStrategy::Retry(_) => {
                error!(
                    "event=recovery module=reliability status=error strategy=fail operation={} error={}",
                    ctx.operation, err
                );
                Err(err)
            }
        }
    }
}

fn rollback(verifier: &ActionVerifier, ctx: &CallContext, err: &ReliabilityError) {
    let Some(action_id) = ctx.action_id else {
        warn!(
            "event=recovery module=reliability status=error strategy=rollback reason=no_action_id operation={}",
            ctx.operation
        );
        return;
    };

    match verifier.rollback_action(action_id, &format!("Error recovery rollback: {err}")) {
        Ok(true) => info!(
            "event=recovery module=reliability status=ok strategy=rollback action_id={action_id}"
        ),
        Ok(false) => warn!(
            "event=recovery module=reliability status=error strategy=rollback reason=not_rolled_back action_id={action_id}"
        ),
        Err(rollback_err) => error!(
            "event=recovery module=reliability status=error strategy=rollback action_id={} error={}",
            action_id, rollback_err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::RecoveryStrategy;
    use crate::reliability::command::{command_fn, CallContext, Command, CommandExt};
    use crate::reliability::error::ReliabilityError;
    use crate::reliability::retry::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn skip_turns_error_into_none() {
        let mut command = command_fn(|_ctx: &CallContext| -> Result<i32, _> {
            Err(ReliabilityError::operation("boom"))
        })
        .recover(RecoveryStrategy::Skip);

        assert_eq!(command.execute(&CallContext::new("optional")).unwrap(), None);
    }

    #[test]
    fn fail_reraises_and_success_is_wrapped() {
        let mut failing = command_fn(|_ctx: &CallContext| -> Result<i32, _> {
            Err(ReliabilityError::operation("boom"))
        })
        .recover(RecoveryStrategy::default());
        assert!(matches!(
            failing.execute(&CallContext::new("strict")),
            Err(ReliabilityError::Operation(_))
        ));

        let mut ok = command_fn(|_ctx: &CallContext| Ok(7)).recover(RecoveryStrategy::Skip);
        assert_eq!(ok.execute(&CallContext::new("strict")).unwrap(), Some(7));
    }

    #[test]
    fn retry_strategy_catches_every_error() {
        let mut calls = 0;
        let policy = RetryPolicy::new(2, Duration::from_millis(1), 1.0).busy_only();
        let mut command = command_fn(|_ctx: &CallContext| {
            calls += 1;
            if calls < 3 {
                Err(ReliabilityError::operation("not busy"))
            } else {
                Ok(calls)
            }
        })
        .recover(RecoveryStrategy::Retry(policy));

        assert_eq!(command.execute(&CallContext::new("flaky")).unwrap(), Some(3));
    }
}
