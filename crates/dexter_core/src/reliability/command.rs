//! Command interface every reliability wrapper composes around.
//!
//! # Invariants
//! - The call context is explicit; wrappers never infer workspace or
//!   confirmation from the shape of the wrapped call.
//! - Wrappers forward `ctx` unchanged, except `Verified`, which stamps
//!   the action id it created.

use super::audit::{ResultVerified, Verified};
use super::error::ReliabilityResult;
use super::rate_limit::{RateLimited, RateLimiter};
use super::recovery::{Recovering, RecoveryStrategy};
use super::retry::{Retry, RetryPolicy};
use super::safety::{SafetyCheck, SafetyChecked, Validated};
use super::timing::Timed;
use crate::model::action::ActionId;
use crate::model::workspace::WorkspaceId;
use crate::service::action_verifier::ActionVerifier;
use crate::validation::ValidationError;
use std::sync::Arc;

/// Identity of one guarded call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Operation name; matched for destructive intent and logged.
    pub operation: String,
    pub workspace_id: Option<WorkspaceId>,
    pub target: Option<String>,
    /// Explicit caller confirmation for destructive operations.
    pub confirm: bool,
    /// Audit row tracking this call, if any.
    pub action_id: Option<ActionId>,
}

impl CallContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn in_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }

    pub fn with_action_id(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }
}

/// A unit of work that can be re-invoked by wrappers.
pub trait Command {
    type Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<Self::Output>;
}

impl<C: Command + ?Sized> Command for Box<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<Self::Output> {
        (**self).execute(ctx)
    }
}

/// Type-erased command, as produced by [`super::Guards::wrap`].
pub type BoxCommand<'a, T> = Box<dyn Command<Output = T> + 'a>;

/// Adapts a closure into a [`Command`].
#[derive(Debug, Clone)]
pub struct FnCommand<F> {
    f: F,
}

pub fn command_fn<T, F>(f: F) -> FnCommand<F>
where
    F: FnMut(&CallContext) -> ReliabilityResult<T>,
{
    FnCommand { f }
}

impl<T, F> Command for FnCommand<F>
where
    F: FnMut(&CallContext) -> ReliabilityResult<T>,
{
    type Output = T;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<T> {
        (self.f)(ctx)
    }
}

/// Builder methods for stacking wrappers by hand.
///
/// Each call wraps the current command, so the first call is innermost.
pub trait CommandExt: Command + Sized {
    fn timed(self) -> Timed<Self> {
        Timed::new(self)
    }

    fn retry(self, policy: RetryPolicy) -> Retry<Self> {
        Retry::new(self, policy)
    }

    fn validated<V>(self, check: V) -> Validated<Self, V>
    where
        V: Fn(&CallContext) -> Result<(), ValidationError>,
    {
        Validated::new(self, check)
    }

    fn safety_checked(self, check: SafetyCheck) -> SafetyChecked<Self> {
        SafetyChecked::new(self, check)
    }

    fn rate_limited(self, limiter: Arc<RateLimiter>, key: impl Into<String>) -> RateLimited<Self> {
        RateLimited::new(self, limiter, key)
    }

    fn verified(self, verifier: ActionVerifier) -> Verified<Self> {
        Verified::new(self, verifier)
    }

    fn verify_result<P>(self, predicate: P) -> ResultVerified<Self, P>
    where
        P: Fn(&Self::Output) -> bool,
    {
        ResultVerified::new(self, predicate)
    }

    fn recover(self, strategy: RecoveryStrategy) -> Recovering<Self> {
        Recovering::new(self, strategy)
    }

    fn boxed<'a>(self) -> BoxCommand<'a, Self::Output>
    where
        Self: 'a,
    {
        Box::new(self)
    }
}

impl<C: Command> CommandExt for C {}
