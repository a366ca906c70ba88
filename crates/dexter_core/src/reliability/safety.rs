//! Pre-execution gates: destructive-operation safety and input validation.
//!
//! # Invariants
//! - A rejected call never reaches the inner command.
//! - Only operations whose name carries destructive intent are gated.

use super::command::{CallContext, Command};
use super::error::{ReliabilityError, ReliabilityResult};
use crate::validation::ValidationError;
use log::warn;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Substrings marking an operation name as destructive.
pub const DESTRUCTIVE_KEYWORDS: &[&str] = &["delete", "remove", "drop", "truncate", "clear"];

type CheckFn = Arc<dyn Fn(&CallContext) -> bool + Send + Sync>;

pub fn is_destructive(operation: &str) -> bool {
    let operation = operation.to_ascii_lowercase();
    DESTRUCTIVE_KEYWORDS
        .iter()
        .any(|keyword| operation.contains(keyword))
}

/// How a destructive call is approved.
#[derive(Clone, Default)]
pub enum SafetyCheck {
    /// Requires `ctx.confirm`.
    #[default]
    RequireConfirm,
    /// Approves when the function returns `true`.
    Custom(CheckFn),
}

impl SafetyCheck {
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&CallContext) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(check))
    }

    pub fn evaluate(&self, ctx: &CallContext) -> ReliabilityResult<()> {
        if !is_destructive(&ctx.operation) {
            return Ok(());
        }

        let (approved, reason) = match self {
            Self::RequireConfirm => (ctx.confirm, "requires explicit confirmation"),
            Self::Custom(check) => (check(ctx), "blocked by safety check"),
        };
        if approved {
            return Ok(());
        }

        warn!(
            "event=safety_check module=reliability status=rejected operation={} workspace_id={:?}",
            ctx.operation, ctx.workspace_id
        );
        Err(ReliabilityError::SafetyCheckFailed(format!(
            "destructive operation `{}` {reason}",
            ctx.operation
        )))
    }
}

impl Debug for SafetyCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequireConfirm => f.write_str("RequireConfirm"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug)]
pub struct SafetyChecked<C> {
    inner: C,
    check: SafetyCheck,
}

impl<C> SafetyChecked<C> {
    pub fn new(inner: C, check: SafetyCheck) -> Self {
        Self { inner, check }
    }
}

impl<C: Command> Command for SafetyChecked<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        self.check.evaluate(ctx)?;
        self.inner.execute(ctx)
    }
}

/// Runs a validation closure before the inner command.
pub struct Validated<C, V> {
    inner: C,
    check: V,
}

impl<C, V> Validated<C, V> {
    pub fn new(inner: C, check: V) -> Self {
        Self { inner, check }
    }
}

impl<C, V> Command for Validated<C, V>
where
    C: Command,
    V: Fn(&CallContext) -> Result<(), ValidationError>,
{
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        if let Err(err) = (self.check)(ctx) {
            warn!(
                "event=validation module=reliability status=rejected operation={} error={}",
                ctx.operation, err
            );
            return Err(err.into());
        }
        self.inner.execute(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::{is_destructive, SafetyCheck};
    use crate::reliability::command::{command_fn, CallContext, Command, CommandExt};
    use crate::reliability::error::ReliabilityError;
    use crate::validation::{validate_workspace_id, ValidationError};

    #[test]
    fn destructive_names_are_detected_case_insensitively() {
        assert!(is_destructive("delete_workspace"));
        assert!(is_destructive("ClearCache"));
        assert!(is_destructive("drop_index"));
        assert!(!is_destructive("create_workspace"));
    }

    #[test]
    fn destructive_call_without_confirm_is_rejected() {
        let mut ran = false;
        let result = command_fn(|_ctx: &CallContext| {
            ran = true;
            Ok(())
        })
        .safety_checked(SafetyCheck::RequireConfirm)
        .execute(&CallContext::new("delete_rule"));

        assert!(matches!(result, Err(ReliabilityError::SafetyCheckFailed(_))));
        assert!(!ran);
    }

    #[test]
    fn confirm_or_custom_check_lets_destructive_calls_through() {
        let mut command = command_fn(|_ctx: &CallContext| Ok(1))
            .safety_checked(SafetyCheck::RequireConfirm);
        assert_eq!(
            command
                .execute(&CallContext::new("remove_context").confirmed())
                .unwrap(),
            1
        );
        assert_eq!(command.execute(&CallContext::new("get_rules")).unwrap(), 1);

        let mut custom = command_fn(|_ctx: &CallContext| Ok(2))
            .safety_checked(SafetyCheck::custom(|ctx| ctx.target.is_some()));
        assert!(custom.execute(&CallContext::new("truncate_log")).is_err());
        assert_eq!(
            custom
                .execute(&CallContext::new("truncate_log").with_target("action_log"))
                .unwrap(),
            2
        );
    }

    #[test]
    fn validation_failure_short_circuits() {
        let mut ran = false;
        let result = command_fn(|_ctx: &CallContext| {
            ran = true;
            Ok(())
        })
        .validated(|ctx: &CallContext| -> Result<(), ValidationError> {
            validate_workspace_id(ctx.workspace_id.unwrap_or(0)).map(|_| ())
        })
        .execute(&CallContext::new("set_context"));

        assert!(matches!(result, Err(ReliabilityError::Validation(_))));
        assert!(!ran);
    }
}
