//! Structured error handling around nested blocks.

use std::sync::Arc;

use sluice_types::Result;

use crate::context::PipelineContext;
use crate::pipeline::Pipeline;
use crate::valve::{invoke_block, invoke_block_with, Valve};

pub const DEFAULT_EXCEPTION_NAME: &str = "exception";

/// Runs an optional try block, an optional catch block for errors escaping it,
/// and an optional finally block that always runs.
///
/// The caught error is exposed to the catch block as a JSON object
/// (`kind`, `message`, `description`) under the exception name. An error
/// raised by the finally block replaces any pending one.
pub struct TryCatchFinallyValve {
    try_block: Option<Arc<Pipeline>>,
    catch_block: Option<Arc<Pipeline>>,
    finally_block: Option<Arc<Pipeline>>,
    exception_name: String,
}

#[derive(Default)]
pub struct TryCatchFinallyValveBuilder {
    try_block: Option<Arc<Pipeline>>,
    catch_block: Option<Arc<Pipeline>>,
    finally_block: Option<Arc<Pipeline>>,
    exception_name: Option<String>,
}

impl TryCatchFinallyValveBuilder {
    pub fn try_block(mut self, block: impl Into<Arc<Pipeline>>) -> Self {
        self.try_block = Some(block.into());
        self
    }

    pub fn catch_block(mut self, block: impl Into<Arc<Pipeline>>) -> Self {
        self.catch_block = Some(block.into());
        self
    }

    pub fn finally_block(mut self, block: impl Into<Arc<Pipeline>>) -> Self {
        self.finally_block = Some(block.into());
        self
    }

    /// Attribute name the catch block finds the error under. Trimmed; blank
    /// falls back to [`DEFAULT_EXCEPTION_NAME`].
    pub fn exception_name(mut self, name: impl Into<String>) -> Self {
        self.exception_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<TryCatchFinallyValve> {
        let exception_name = self
            .exception_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_EXCEPTION_NAME)
            .to_string();
        Ok(TryCatchFinallyValve {
            try_block: self.try_block,
            catch_block: self.catch_block,
            finally_block: self.finally_block,
            exception_name,
        })
    }
}

impl TryCatchFinallyValve {
    pub fn builder() -> TryCatchFinallyValveBuilder {
        TryCatchFinallyValveBuilder::default()
    }

    pub fn exception_name(&self) -> &str {
        &self.exception_name
    }

    fn run_try_catch(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        let Some(try_block) = &self.try_block else {
            return Ok(());
        };
        let err = match invoke_block(ctx, try_block) {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        let Some(catch_block) = &self.catch_block else {
            return Err(err);
        };

        tracing::debug!(
            level = ctx.level(),
            error = %err,
            exception = %self.exception_name,
            "Caught error from try block"
        );
        let caught = err.to_value();
        invoke_block_with(ctx, catch_block, |handle| {
            handle.set_attribute(&self.exception_name, caught);
        })
        .map(|_| ())
    }

    fn run_finally(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        match &self.finally_block {
            Some(block) => invoke_block(ctx, block).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Valve for TryCatchFinallyValve {
    fn name(&self) -> &str {
        "TryCatchFinallyValve"
    }

    fn describe(&self) -> String {
        let parts: Vec<&str> = [
            self.try_block.as_ref().map(|_| "try"),
            self.catch_block.as_ref().map(|_| "catch"),
            self.finally_block.as_ref().map(|_| "finally"),
        ]
        .into_iter()
        .flatten()
        .collect();
        format!("TryCatchFinallyValve[{}]", parts.join(", "))
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        let pending = self.run_try_catch(ctx);
        let finally = self.run_finally(ctx);

        match (pending, finally) {
            (_, Err(replacement)) => Err(replacement),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Ok(())) => ctx.invoke_next(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{log_pipeline, log_valve, ExecutionLog};
    use crate::valve::FnValve;
    use crate::valves::BreakValve;
    use serde_json::Value;
    use sluice_types::{Flow, PipelineError};
    use std::sync::Mutex;

    fn failing(message: &'static str) -> Pipeline {
        Pipeline::builder()
            .valve(FnValve::new("FailValve", move |_ctx| {
                Err(PipelineError::Other(message.into()))
            }))
            .build()
    }

    /// A catch block storing whatever it finds under `name`.
    fn capturing(name: &'static str, seen: &Arc<Mutex<Option<Value>>>) -> Pipeline {
        let seen = seen.clone();
        Pipeline::builder()
            .valve(FnValve::new("CaptureValve", move |ctx| {
                *seen.lock().unwrap() = ctx.attribute(name).cloned();
                Ok(())
            }))
            .build()
    }

    fn around(log: &ExecutionLog, valve: TryCatchFinallyValve) -> Pipeline {
        Pipeline::builder()
            .shared_valve(log_valve(log))
            .valve(valve)
            .shared_valve(log_valve(log))
            .build()
    }

    #[test]
    fn exception_name_defaults_and_trims() {
        let valve = TryCatchFinallyValve::builder().build().unwrap();
        assert_eq!(valve.exception_name(), "exception");

        let valve = TryCatchFinallyValve::builder()
            .exception_name("  ")
            .build()
            .unwrap();
        assert_eq!(valve.exception_name(), "exception");

        let valve = TryCatchFinallyValve::builder()
            .exception_name(" err ")
            .build()
            .unwrap();
        assert_eq!(valve.exception_name(), "err");
    }

    #[test]
    fn describe_lists_configured_blocks() {
        let valve = TryCatchFinallyValve::builder()
            .try_block(Pipeline::default())
            .finally_block(Pipeline::default())
            .build()
            .unwrap();
        assert_eq!(valve.describe(), "TryCatchFinallyValve[try, finally]");
    }

    #[test]
    fn empty_valve_just_continues() {
        let log = ExecutionLog::new();
        let pipeline = around(&log, TryCatchFinallyValve::builder().build().unwrap());

        assert_eq!(pipeline.new_invocation().invoke().unwrap(), Flow::Completed);
        assert_eq!(log.take(), vec!["1-1", "1-3"]);
    }

    #[test]
    fn successful_try_skips_catch_and_runs_finally() {
        let log = ExecutionLog::new();
        let valve = TryCatchFinallyValve::builder()
            .try_block(log_pipeline(&log, 2))
            .catch_block(failing("catch must not run"))
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        assert_eq!(pipeline.new_invocation().invoke().unwrap(), Flow::Completed);
        assert_eq!(log.take(), vec!["1-1", "2-1", "2-2", "2-1", "1-3"]);
    }

    #[test]
    fn catch_receives_error_and_finally_runs() {
        let log = ExecutionLog::new();
        let seen = Arc::new(Mutex::new(None));
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .catch_block(capturing("exception", &seen))
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        assert_eq!(pipeline.new_invocation().invoke().unwrap(), Flow::Completed);

        let exception = seen.lock().unwrap().clone().unwrap();
        assert_eq!(exception["message"], "x");
        assert_eq!(exception["kind"], "other");
        assert_eq!(
            exception["description"],
            "Failed to invoke Valve[#1/1, level 2]: FailValve"
        );
        assert_eq!(log.take(), vec!["1-1", "2-1", "1-3"]);
    }

    #[test]
    fn catch_uses_custom_exception_name() {
        let seen = Arc::new(Mutex::new(None));
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("boom"))
            .catch_block(capturing("problem", &seen))
            .exception_name("problem")
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().valve(valve).build();

        assert_eq!(pipeline.new_invocation().invoke().unwrap(), Flow::Completed);
        let exception = seen.lock().unwrap().clone().unwrap();
        assert_eq!(exception["message"], "boom");
    }

    #[test]
    fn exception_is_not_visible_after_catch() {
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .catch_block(Pipeline::default())
            .build()
            .unwrap();
        let checker = FnValve::new("CheckValve", |ctx| {
            assert_eq!(ctx.attribute("exception"), None);
            Ok(())
        });
        let pipeline = Pipeline::builder().valve(valve).valve(checker).build();

        assert_eq!(pipeline.new_invocation().invoke().unwrap(), Flow::Completed);
    }

    #[test]
    fn error_without_catch_is_reraised_after_finally() {
        let log = ExecutionLog::new();
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        let err = pipeline.new_invocation().invoke().unwrap_err();
        assert_eq!(err.to_string(), "Failed to invoke Valve[#1/1, level 2]: FailValve");
        assert_eq!(err.root_cause().to_string(), "x");
        assert_eq!(log.take(), vec!["1-1", "2-1"]);
    }

    #[test]
    fn error_in_catch_propagates_after_finally() {
        let log = ExecutionLog::new();
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .catch_block(failing("y"))
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        let err = pipeline.new_invocation().invoke().unwrap_err();
        assert_eq!(err.root_cause().to_string(), "y");
        assert_eq!(log.take(), vec!["1-1", "2-1"]);
    }

    #[test]
    fn finally_error_replaces_pending_error() {
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .finally_block(failing("z"))
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().valve(valve).build();

        let err = pipeline.new_invocation().invoke().unwrap_err();
        assert_eq!(err.root_cause().to_string(), "z");
    }

    #[test]
    fn finally_runs_when_try_breaks_outward() {
        let log = ExecutionLog::new();
        let try_block = Pipeline::builder()
            .shared_valve(log_valve(&log))
            .valve(FnValve::new("BreakingValve", |ctx| ctx.break_pipeline(1)))
            .shared_valve(log_valve(&log))
            .build();
        let valve = TryCatchFinallyValve::builder()
            .try_block(try_block)
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        let mut handle = pipeline.new_invocation();
        assert_eq!(handle.invoke().unwrap(), Flow::Broken { remaining: 0 });
        assert_eq!(log.take(), vec!["1-1", "2-1", "2-1"]);
    }

    #[test]
    fn break_before_failure_in_try_survives_catch() {
        let log = ExecutionLog::new();
        let try_block = Pipeline::builder()
            .valve(FnValve::returning("BreakThenFailValve", |ctx| {
                ctx.break_pipeline(1)?;
                Err(PipelineError::Other("x".into()))
            }))
            .build();
        let valve = TryCatchFinallyValve::builder()
            .try_block(try_block)
            .catch_block(Pipeline::default())
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        let mut handle = pipeline.new_invocation();
        assert_eq!(handle.invoke().unwrap(), Flow::Broken { remaining: 0 });
        assert_eq!(log.take(), vec!["1-1"]);
    }

    #[test]
    fn break_inside_catch_skips_rest_and_runs_finally() {
        let log = ExecutionLog::new();
        let catch_block = Pipeline::builder()
            .valve(BreakValve::builder().levels(1).build().unwrap())
            .shared_valve(log_valve(&log))
            .build();
        let valve = TryCatchFinallyValve::builder()
            .try_block(failing("x"))
            .catch_block(catch_block)
            .finally_block(log_pipeline(&log, 1))
            .build()
            .unwrap();
        let pipeline = around(&log, valve);

        let mut handle = pipeline.new_invocation();
        assert_eq!(handle.invoke().unwrap(), Flow::Broken { remaining: 0 });
        assert_eq!(log.take(), vec!["1-1", "2-1"]);
    }
}
