//! Per-invocation runtime state of one pipeline execution.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use sluice_types::{Flow, PipelineError, Result};
use uuid::Uuid;

use crate::context::{resolve_label, PipelineContext};
use crate::pipeline::Pipeline;

/// Mutable state of one [`Pipeline`] invocation.
///
/// A handle is created fresh for every call, including nested and re-entrant
/// invocations of the same pipeline, so the pipeline itself never changes while
/// it runs. It borrows its pipeline and its enclosing context and cannot leave
/// the thread that created it.
pub struct PipelineInvocationHandle<'a> {
    id: Uuid,
    pipeline: &'a Pipeline,
    parent: Option<&'a dyn PipelineContext>,
    level: usize,
    /// 1-based number of the valve currently executing.
    cursor: usize,
    /// How many positions (valves plus the end of the pipeline) have been entered.
    entered: usize,
    broken: bool,
    /// Enclosing invocations still to unwind once this one returns.
    unwind: usize,
    attributes: HashMap<String, Value>,
}

impl<'a> PipelineInvocationHandle<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, parent: Option<&'a dyn PipelineContext>) -> Self {
        let level = parent.map_or(1, |p| p.level() + 1);
        Self {
            id: parent.map_or_else(Uuid::new_v4, |p| p.invocation_id()),
            pipeline,
            parent,
            level,
            cursor: 0,
            entered: 0,
            broken: false,
            unwind: 0,
            attributes: HashMap::new(),
        }
    }

    /// Identifier attached to this invocation's log events. Nested invocations
    /// reuse the id of the top-level one; `level` tells them apart.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pipeline(&self) -> &'a Pipeline {
        self.pipeline
    }

    /// Run the pipeline from its first valve.
    ///
    /// A handle may be invoked again after it returns, keeping its attributes,
    /// unless it was broken.
    pub fn invoke(&mut self) -> Result<Flow> {
        if self.broken {
            return Err(PipelineError::BrokenPipeline);
        }
        self.cursor = 0;
        self.entered = 0;
        self.invoke_next()?;
        Ok(self.flow())
    }

    /// Outcome of the most recent [`invoke`](Self::invoke).
    pub fn flow(&self) -> Flow {
        if self.broken {
            Flow::Broken {
                remaining: self.unwind,
            }
        } else if self.is_finished() {
            Flow::Completed
        } else {
            Flow::Returned
        }
    }

    /// `true` once every valve was reached without a break.
    pub fn is_finished(&self) -> bool {
        !self.broken && self.entered > self.pipeline.len()
    }

    fn position(&self) -> String {
        format!(
            "Valve[#{}/{}, level {}]",
            self.cursor,
            self.pipeline.len(),
            self.level
        )
    }

    fn valve_description(&self, idx: usize) -> String {
        self.pipeline
            .valves()
            .get(idx)
            .map(|v| v.describe())
            .unwrap_or_else(|| "<end of pipeline>".to_string())
    }

    fn step(&mut self, idx: usize) -> Result<()> {
        if idx < self.entered {
            return Err(PipelineError::AlreadyInvoked {
                position: self.position(),
                valve: self.valve_description(idx),
            });
        }
        self.entered += 1;

        let pipeline = self.pipeline;
        let Some(valve) = pipeline.valves().get(idx) else {
            tracing::trace!(invocation = %self.id, level = self.level, "Pipeline reached its end");
            return Ok(());
        };

        tracing::trace!(invocation = %self.id, position = %self.position(), valve = valve.name(), "Entering valve");
        let result = valve.invoke(self);
        tracing::trace!(invocation = %self.id, position = %self.position(), valve = valve.name(), "Exited valve");

        match result {
            Ok(()) => {
                if self.entered == idx + 1 && !self.broken {
                    tracing::trace!(
                        invocation = %self.id,
                        position = %self.position(),
                        "Pipeline returned early"
                    );
                }
                Ok(())
            }
            Err(e) if e.passes_through_frames() => Err(e),
            Err(e) => Err(PipelineError::ValveFailed {
                position: self.position(),
                valve: valve.describe(),
                source: Box::new(e),
            }),
        }
    }
}

impl PipelineContext for PipelineInvocationHandle<'_> {
    fn invoke_next(&mut self) -> Result<()> {
        if self.broken {
            return Ok(());
        }
        let idx = self.cursor;
        self.cursor += 1;
        let result = self.step(idx);
        self.cursor -= 1;
        result
    }

    fn break_pipeline(&mut self, levels: usize) -> Result<()> {
        if levels >= self.level {
            return Err(PipelineError::InvalidBreakLevels {
                levels,
                level: self.level,
            });
        }
        tracing::debug!(invocation = %self.id, level = self.level, levels, "Pipeline break requested");
        self.broken = true;
        self.unwind = self.unwind.max(levels);
        Ok(())
    }

    fn find_label(&self, label: &str) -> Result<usize> {
        resolve_label(self, label)
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn invocation_id(&self) -> Uuid {
        self.id
    }

    fn level(&self) -> usize {
        self.level
    }

    fn index(&self) -> usize {
        self.cursor
    }

    fn label(&self) -> Option<&str> {
        self.pipeline.label()
    }

    fn parent(&self) -> Option<&dyn PipelineContext> {
        self.parent
    }

    fn attribute(&self, key: &str) -> Option<&Value> {
        match self.attributes.get(key) {
            Some(Value::Null) => None,
            Some(value) => Some(value),
            None => self.parent.and_then(|p| p.attribute(key)),
        }
    }

    fn set_attribute(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }
}

impl fmt::Display for PipelineInvocationHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executing Pipeline {}", self.position())
    }
}

impl fmt::Debug for PipelineInvocationHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInvocationHandle")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("cursor", &self.cursor)
            .field("broken", &self.broken)
            .field("unwind", &self.unwind)
            .field("attributes", &self.attributes)
            .finish()
    }
}
