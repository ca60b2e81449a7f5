//! Valves that request a break: unconditional, conditional, and exit.

use sluice_types::{BreakTarget, PipelineError, Result, TOP_LABEL};

use crate::condition::SharedCondition;
use crate::context::PipelineContext;
use crate::valve::Valve;

/// Collects a break target from builder input: levels or a label, never both.
#[derive(Debug, Default)]
struct TargetInput {
    levels: Option<usize>,
    label: Option<String>,
}

impl TargetInput {
    fn build(self) -> Result<BreakTarget> {
        match (self.levels, self.label) {
            (Some(_), Some(_)) => Err(PipelineError::ConfigError(
                "break levels and label are mutually exclusive".into(),
            )),
            (_, Some(label)) => match label.trim() {
                "" => Err(PipelineError::ConfigError("no label".into())),
                TOP_LABEL => Ok(BreakTarget::Top),
                label => Ok(BreakTarget::Label(label.to_string())),
            },
            (levels, None) => Ok(BreakTarget::Levels(levels.unwrap_or(0))),
        }
    }
}

fn request_break(ctx: &mut dyn PipelineContext, target: &BreakTarget) -> Result<()> {
    match target {
        BreakTarget::Levels(levels) => ctx.break_pipeline(*levels),
        BreakTarget::Label(label) => ctx.break_to_label(label),
        BreakTarget::Top => ctx.break_to_label(TOP_LABEL),
    }
}

// ---------------------------------------------------------------------------
// BreakValve
// ---------------------------------------------------------------------------

/// Breaks the current invocation, plus enclosing ones as configured.
#[derive(Debug)]
pub struct BreakValve {
    target: BreakTarget,
}

#[derive(Debug, Default)]
pub struct BreakValveBuilder {
    target: TargetInput,
}

impl BreakValveBuilder {
    pub fn levels(mut self, levels: usize) -> Self {
        self.target.levels = Some(levels);
        self
    }

    pub fn to_label(mut self, label: impl Into<String>) -> Self {
        self.target.label = Some(label.into());
        self
    }

    pub fn build(self) -> Result<BreakValve> {
        Ok(BreakValve {
            target: self.target.build()?,
        })
    }
}

impl BreakValve {
    pub fn builder() -> BreakValveBuilder {
        BreakValveBuilder::default()
    }

    pub fn target(&self) -> &BreakTarget {
        &self.target
    }
}

impl Valve for BreakValve {
    fn name(&self) -> &str {
        "BreakValve"
    }

    fn describe(&self) -> String {
        format!("BreakValve[{}]", self.target)
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        request_break(ctx, &self.target)?;
        ctx.invoke_next()
    }
}

// ---------------------------------------------------------------------------
// BreakIfValve / BreakUnlessValve
// ---------------------------------------------------------------------------

/// Breaks when the condition holds.
pub struct BreakIfValve {
    condition: SharedCondition,
    target: BreakTarget,
}

/// Breaks when the condition does not hold.
pub struct BreakUnlessValve {
    condition: SharedCondition,
    target: BreakTarget,
}

/// Builder shared by the conditional break valves.
pub struct ConditionalBreakBuilder<V> {
    condition: Option<SharedCondition>,
    target: TargetInput,
    make: fn(SharedCondition, BreakTarget) -> V,
}

impl<V> ConditionalBreakBuilder<V> {
    fn with(make: fn(SharedCondition, BreakTarget) -> V) -> Self {
        Self {
            condition: None,
            target: TargetInput::default(),
            make,
        }
    }

    pub fn condition(mut self, condition: SharedCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn levels(mut self, levels: usize) -> Self {
        self.target.levels = Some(levels);
        self
    }

    pub fn to_label(mut self, label: impl Into<String>) -> Self {
        self.target.label = Some(label.into());
        self
    }

    pub fn build(self) -> Result<V> {
        let condition = self
            .condition
            .ok_or_else(|| PipelineError::ConfigError("no condition".into()))?;
        let target = self.target.build()?;
        Ok((self.make)(condition, target))
    }
}

impl BreakIfValve {
    pub fn builder() -> ConditionalBreakBuilder<Self> {
        ConditionalBreakBuilder::with(|condition, target| Self { condition, target })
    }

    pub fn target(&self) -> &BreakTarget {
        &self.target
    }
}

impl BreakUnlessValve {
    pub fn builder() -> ConditionalBreakBuilder<Self> {
        ConditionalBreakBuilder::with(|condition, target| Self { condition, target })
    }

    pub fn target(&self) -> &BreakTarget {
        &self.target
    }
}

impl Valve for BreakIfValve {
    fn name(&self) -> &str {
        "BreakIfValve"
    }

    fn describe(&self) -> String {
        format!(
            "BreakIfValve[{}, {}]",
            self.condition.describe(),
            self.target
        )
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        if self.condition.is_satisfied(&*ctx)? {
            request_break(ctx, &self.target)?;
        }
        ctx.invoke_next()
    }
}

impl Valve for BreakUnlessValve {
    fn name(&self) -> &str {
        "BreakUnlessValve"
    }

    fn describe(&self) -> String {
        format!(
            "BreakUnlessValve[{}, {}]",
            self.condition.describe(),
            self.target
        )
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        if !self.condition.is_satisfied(&*ctx)? {
            request_break(ctx, &self.target)?;
        }
        ctx.invoke_next()
    }
}

// ---------------------------------------------------------------------------
// ExitValve
// ---------------------------------------------------------------------------

/// Ends the whole top-level invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitValve;

impl Valve for ExitValve {
    fn name(&self) -> &str {
        "ExitValve"
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        request_break(ctx, &BreakTarget::Top)?;
        ctx.invoke_next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
