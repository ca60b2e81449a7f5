//! Branch selection: `IfValve` and `ChooseValve`.

use std::sync::Arc;

use sluice_types::{PipelineError, Result};

use crate::condition::SharedCondition;
use crate::context::PipelineContext;
use crate::pipeline::Pipeline;
use crate::valve::{invoke_block, Valve};

// ---------------------------------------------------------------------------
// IfValve
// ---------------------------------------------------------------------------

/// Runs its block when the condition holds, then continues with the next valve.
pub struct IfValve {
    condition: SharedCondition,
    block: Arc<Pipeline>,
}

#[derive(Default)]
pub struct IfValveBuilder {
    condition: Option<SharedCondition>,
    block: Option<Arc<Pipeline>>,
}

impl IfValveBuilder {
    pub fn condition(mut self, condition: SharedCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn block(mut self, block: impl Into<Arc<Pipeline>>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub fn build(self) -> Result<IfValve> {
        let condition = self
            .condition
            .ok_or_else(|| PipelineError::ConfigError("no condition".into()))?;
        let block = self
            .block
            .ok_or_else(|| PipelineError::ConfigError("no if-block".into()))?;
        Ok(IfValve { condition, block })
    }
}

impl IfValve {
    pub fn builder() -> IfValveBuilder {
        IfValveBuilder::default()
    }

    pub fn block(&self) -> &Pipeline {
        &self.block
    }
}

impl Valve for IfValve {
    fn name(&self) -> &str {
        "IfValve"
    }

    fn describe(&self) -> String {
        format!("IfValve[{}]", self.condition.describe())
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        if self.condition.is_satisfied(&*ctx)? {
            invoke_block(ctx, &self.block).map(|_| ())?;
        }
        ctx.invoke_next()
    }
}

// ---------------------------------------------------------------------------
// ChooseValve
// ---------------------------------------------------------------------------

/// Runs the block of the first satisfied when-condition, or the otherwise-block
/// when none holds.
pub struct ChooseValve {
    when: Vec<(SharedCondition, Arc<Pipeline>)>,
    otherwise: Option<Arc<Pipeline>>,
}

#[derive(Default)]
pub struct ChooseValveBuilder {
    conditions: Vec<SharedCondition>,
    blocks: Vec<Arc<Pipeline>>,
    otherwise: Option<Arc<Pipeline>>,
}

impl ChooseValveBuilder {
    /// Append one when-branch.
    pub fn when(mut self, condition: SharedCondition, block: impl Into<Arc<Pipeline>>) -> Self {
        self.conditions.push(condition);
        self.blocks.push(block.into());
        self
    }

    /// Replace the when-conditions with a parallel list. Must match the
    /// when-blocks one to one.
    pub fn when_conditions(mut self, conditions: Vec<SharedCondition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn when_blocks(mut self, blocks: Vec<Arc<Pipeline>>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn otherwise(mut self, block: impl Into<Arc<Pipeline>>) -> Self {
        self.otherwise = Some(block.into());
        self
    }

    pub fn build(self) -> Result<ChooseValve> {
        if self.conditions.len() != self.blocks.len() {
            return Err(PipelineError::ConfigError(format!(
                "conditions and blocks not match: {} conditions and {} blocks",
                self.conditions.len(),
                self.blocks.len()
            )));
        }
        Ok(ChooseValve {
            when: self.conditions.into_iter().zip(self.blocks).collect(),
            otherwise: self.otherwise,
        })
    }
}

impl ChooseValve {
    pub fn builder() -> ChooseValveBuilder {
        ChooseValveBuilder::default()
    }

    /// Number of when-branches.
    pub fn branches(&self) -> usize {
        self.when.len()
    }
}

impl Valve for ChooseValve {
    fn name(&self) -> &str {
        "ChooseValve"
    }

    fn describe(&self) -> String {
        let conditions: Vec<String> = self.when.iter().map(|(c, _)| c.describe()).collect();
        match self.otherwise {
            Some(_) => format!("ChooseValve[{}; otherwise]", conditions.join(", ")),
            None => format!("ChooseValve[{}]", conditions.join(", ")),
        }
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        let mut chosen = None;
        for (i, (condition, block)) in self.when.iter().enumerate() {
            if condition.is_satisfied(&*ctx)? {
                tracing::trace!(branch = i, "Choose branch satisfied");
                chosen = Some(block);
                break;
            }
        }

        if let Some(block) = chosen.or(self.otherwise.as_ref()) {
            invoke_block(ctx, block).map(|_| ())?;
        }
        ctx.invoke_next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
