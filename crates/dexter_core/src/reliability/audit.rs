//! Audit-trail and result-verification wrappers.
//!
//! # Responsibility
//! - `Verified` is the only writer of action rows for guarded calls.
//! - `ResultVerified` rejects results a predicate does not accept.
//!
//! # Invariants
//! - A guarded call that succeeds moves its row
//!   `pending -> in_progress -> completed` exactly once.
//! - A guarded call that fails leaves its row `failed` with the error text,
//!   and so does a success whose completion cannot be recorded.
//! - Failure to record a failure is logged and never replaces the
//!   original error.

use super::command::{CallContext, Command};
use super::error::{ReliabilityError, ReliabilityResult};
use crate::model::action::{ActionId, ActionStatus, NewAction};
use crate::service::action_verifier::ActionVerifier;
use log::{error, info, warn};

#[derive(Debug)]
pub struct Verified<C> {
    inner: C,
    verifier: ActionVerifier,
}

impl<C> Verified<C> {
    pub fn new(inner: C, verifier: ActionVerifier) -> Self {
        Self { inner, verifier }
    }

    fn open_action(&self, ctx: &CallContext) -> ReliabilityResult<ActionId> {
        let mut action = NewAction::pending(ctx.workspace_id, ctx.operation.as_str());
        if let Some(target) = &ctx.target {
            action = action.with_target(target.as_str());
        }
        let action_id = self.verifier.log_action(&action)?;
        self.verifier.mark_in_progress(action_id)?;
        Ok(action_id)
    }

    /// Completes the row; if that fails the row is closed as failed instead.
    fn close_success(&self, action_id: ActionId) -> ReliabilityResult<()> {
        let result = self.complete(action_id);
        if let Err(err) = &result {
            self.close_failure(action_id, err);
        }
        result
    }

    fn complete(&self, action_id: ActionId) -> ReliabilityResult<()> {
        let observed = self
            .verifier
            .get_action(action_id)?
            .map(|action| action.status);
        if observed != Some(ActionStatus::InProgress) {
            warn!(
                "event=action_verify module=audit status=error action_id={} observed={:?}",
                action_id, observed
            );
        }

        if !self.verifier.mark_completed(action_id)? {
            return Err(ReliabilityError::ResultVerificationFailed(format!(
                "action {action_id} could not move to completed"
            )));
        }
        if !self.verifier.verify_action_completion(action_id)? {
            return Err(ReliabilityError::ResultVerificationFailed(format!(
                "action {action_id} did not reach completed"
            )));
        }
        info!("event=action_verify module=audit status=ok action_id={action_id}");
        Ok(())
    }

    fn close_failure(&self, action_id: ActionId, err: &ReliabilityError) {
        if let Err(audit_err) = self.verifier.mark_failed(action_id, &err.to_string()) {
            error!(
                "event=action_verify module=audit status=error reason=mark_failed action_id={} error={}",
                action_id, audit_err
            );
        }
    }
}

impl<C: Command> Command for Verified<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        let action_id = self.open_action(ctx)?;
        let tracked = ctx.clone().with_action_id(action_id);

        match self.inner.execute(&tracked) {
            Ok(output) => {
                self.close_success(action_id)?;
                Ok(output)
            }
            Err(err) => {
                self.close_failure(action_id, &err);
                Err(err)
            }
        }
    }
}

/// Fails with `ResultVerificationFailed` when `predicate` rejects the output.
pub struct ResultVerified<C, P> {
    inner: C,
    predicate: P,
}

impl<C, P> ResultVerified<C, P> {
    pub fn new(inner: C, predicate: P) -> Self {
        Self { inner, predicate }
    }
}

impl<C, P> Command for ResultVerified<C, P>
where
    C: Command,
    P: Fn(&C::Output) -> bool,
{
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        let output = self.inner.execute(ctx)?;
        if (self.predicate)(&output) {
            return Ok(output);
        }
        warn!(
            "event=result_verify module=reliability status=rejected operation={}",
            ctx.operation
        );
        Err(ReliabilityError::ResultVerificationFailed(format!(
            "result of `{}` failed verification",
            ctx.operation
        )))
    }
}
