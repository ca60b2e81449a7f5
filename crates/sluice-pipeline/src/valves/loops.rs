//! Bounded loops: `LoopValve` and `WhileLoopValve`.
//!
//! Both run their body repeatedly on a single nested invocation, exposing an
//! iteration counter as an attribute of that invocation. The body ends the loop
//! by breaking; the guard fails the loop once the counter reaches its maximum.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_types::{PipelineError, Result};

use crate::condition::{Condition, SharedCondition};
use crate::context::PipelineContext;
use crate::invocation::PipelineInvocationHandle;
use crate::pipeline::Pipeline;
use crate::valve::Valve;

pub const DEFAULT_MAX_LOOP_COUNT: i64 = 10;
pub const DEFAULT_LOOP_COUNTER_NAME: &str = "loopCount";

// ---------------------------------------------------------------------------
// LoopSettings
// ---------------------------------------------------------------------------

/// Loop limits as loaded from host configuration.
///
/// ```json
/// { "maxLoopCount": 20, "loopCounterName": "count" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopSettings {
    /// Zero or negative means unlimited.
    pub max_loop_count: i64,
    pub loop_counter_name: String,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_loop_count: DEFAULT_MAX_LOOP_COUNT,
            loop_counter_name: DEFAULT_LOOP_COUNTER_NAME.to_string(),
        }
    }
}

impl LoopSettings {
    /// The bound actually enforced; 0 when unlimited.
    pub fn effective_max_loop_count(&self) -> u64 {
        u64::try_from(self.max_loop_count).unwrap_or(0)
    }

    /// The trimmed counter name, or the default when blank.
    pub fn effective_counter_name(&self) -> &str {
        match self.loop_counter_name.trim() {
            "" => DEFAULT_LOOP_COUNTER_NAME,
            name => name,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared loop driver
// ---------------------------------------------------------------------------

struct LoopBody {
    body: Arc<Pipeline>,
    max_loop_count: u64,
    counter_name: String,
}

impl LoopBody {
    fn new(body: Option<Arc<Pipeline>>, settings: &LoopSettings) -> Result<Self> {
        let body = body.ok_or_else(|| PipelineError::ConfigError("no loop body".into()))?;
        Ok(Self {
            body,
            max_loop_count: settings.effective_max_loop_count(),
            counter_name: settings.effective_counter_name().to_string(),
        })
    }

    fn counter(&self, handle: &PipelineInvocationHandle<'_>) -> Result<u64> {
        handle
            .attribute(&self.counter_name)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| PipelineError::InvalidLoopCounter {
                name: self.counter_name.clone(),
            })
    }

    /// Iterate until the body breaks or `condition` stops holding, then hand
    /// control to the valve after the loop.
    fn run(&self, ctx: &mut dyn PipelineContext, condition: Option<&dyn Condition>) -> Result<()> {
        let (outcome, flow) = {
            let mut handle = self.body.new_invocation_within(&*ctx);
            handle.set_attribute(&self.counter_name, serde_json::json!(0));
            let outcome = self.iterate(&mut handle, condition);

            tracing::debug!(
                invocation = %handle.id(),
                iterations = self.counter(&handle).unwrap_or_default(),
                broken = handle.is_broken(),
                failed = outcome.is_err(),
                "Loop finished"
            );
            (outcome, handle.flow())
        };

        // A break requested before the body failed still reaches the caller.
        ctx.absorb(flow)?;
        outcome?;
        ctx.invoke_next()
    }

    fn iterate(
        &self,
        handle: &mut PipelineInvocationHandle<'_>,
        condition: Option<&dyn Condition>,
    ) -> Result<()> {
        while !handle.is_broken() {
            if let Some(condition) = condition {
                if !condition.is_satisfied(&*handle)? {
                    break;
                }
            }

            let count = self.counter(handle)?;
            if self.max_loop_count > 0 && count >= self.max_loop_count {
                tracing::warn!(
                    invocation = %handle.id(),
                    max = self.max_loop_count,
                    "Loop guard tripped"
                );
                return Err(PipelineError::TooManyLoops {
                    max: self.max_loop_count,
                });
            }

            // Break state is read back from the handle.
            let _ = handle.invoke()?;
            // The body may have rewritten the counter.
            let count = self.counter(handle)?;
            handle.set_attribute(&self.counter_name, serde_json::json!(count + 1));
        }
        Ok(())
    }

    fn describe_limit(&self) -> String {
        match self.max_loop_count {
            0 => "unlimited".to_string(),
            max => format!("max={max}"),
        }
    }
}

// ---------------------------------------------------------------------------
// LoopValve
// ---------------------------------------------------------------------------

/// Runs its body until the body breaks.
pub struct LoopValve {
    inner: LoopBody,
}

#[derive(Default)]
pub struct LoopValveBuilder {
    body: Option<Arc<Pipeline>>,
    settings: LoopSettings,
}

impl LoopValveBuilder {
    pub fn body(mut self, body: impl Into<Arc<Pipeline>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn max_loop_count(mut self, max: i64) -> Self {
        self.settings.max_loop_count = max;
        self
    }

    pub fn loop_counter_name(mut self, name: impl Into<String>) -> Self {
        self.settings.loop_counter_name = name.into();
        self
    }

    pub fn settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<LoopValve> {
        Ok(LoopValve {
            inner: LoopBody::new(self.body, &self.settings)?,
        })
    }
}

impl LoopValve {
    pub fn builder() -> LoopValveBuilder {
        LoopValveBuilder::default()
    }

    pub fn body(&self) -> &Pipeline {
        &self.inner.body
    }

    pub fn max_loop_count(&self) -> u64 {
        self.inner.max_loop_count
    }

    pub fn loop_counter_name(&self) -> &str {
        &self.inner.counter_name
    }
}

impl Valve for LoopValve {
    fn name(&self) -> &str {
        "LoopValve"
    }

    fn describe(&self) -> String {
        format!("LoopValve[{}]", self.inner.describe_limit())
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        self.inner.run(ctx, None)
    }
}

// ---------------------------------------------------------------------------
// WhileLoopValve
// ---------------------------------------------------------------------------

/// Runs its body while the condition holds, checked before every iteration
/// against the loop's own invocation.
pub struct WhileLoopValve {
    inner: LoopBody,
    condition: SharedCondition,
}

#[derive(Default)]
pub struct WhileLoopValveBuilder {
    body: Option<Arc<Pipeline>>,
    condition: Option<SharedCondition>,
    settings: LoopSettings,
}

impl WhileLoopValveBuilder {
    pub fn body(mut self, body: impl Into<Arc<Pipeline>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn condition(mut self, condition: SharedCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn max_loop_count(mut self, max: i64) -> Self {
        self.settings.max_loop_count = max;
        self
    }

    pub fn loop_counter_name(mut self, name: impl Into<String>) -> Self {
        self.settings.loop_counter_name = name.into();
        self
    }

    pub fn settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<WhileLoopValve> {
        let inner = LoopBody::new(self.body, &self.settings)?;
        let condition = self
            .condition
            .ok_or_else(|| PipelineError::ConfigError("no condition".into()))?;
        Ok(WhileLoopValve { inner, condition })
    }
}

impl WhileLoopValve {
    pub fn builder() -> WhileLoopValveBuilder {
        WhileLoopValveBuilder::default()
    }

    pub fn body(&self) -> &Pipeline {
        &self.inner.body
    }

    pub fn max_loop_count(&self) -> u64 {
        self.inner.max_loop_count
    }

    pub fn loop_counter_name(&self) -> &str {
        &self.inner.counter_name
    }
}

impl Valve for WhileLoopValve {
    fn name(&self) -> &str {
        "WhileLoopValve"
    }

    fn describe(&self) -> String {
        format!(
            "WhileLoopValve[{}, {}]",
            self.condition.describe(),
            self.inner.describe_limit()
        )
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        self.inner.run(ctx, Some(&*self.condition))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
