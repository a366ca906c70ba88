//! Execution-time logging.

use super::command::{CallContext, Command};
use super::error::ReliabilityResult;
use log::{debug, error};
use std::time::Instant;

/// Logs wall-clock duration on both exits; never alters the result.
#[derive(Debug)]
pub struct Timed<C> {
    inner: C,
}

impl<C> Timed<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Command> Command for Timed<C> {
    type Output = C::Output;

    fn execute(&mut self, ctx: &CallContext) -> ReliabilityResult<C::Output> {
        let started_at = Instant::now();
        let result = self.inner.execute(ctx);
        let duration_ms = started_at.elapsed().as_millis();

        match &result {
            Ok(_) => debug!(
                "event=execution_time module=reliability status=ok operation={} duration_ms={}",
                ctx.operation, duration_ms
            ),
            Err(err) => error!(
                "event=execution_time module=reliability status=error operation={} duration_ms={} error={}",
                ctx.operation, duration_ms, err
            ),
        }
        result
    }
}
