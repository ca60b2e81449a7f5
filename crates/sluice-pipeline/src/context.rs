//! The control-flow view a valve receives while it runs.

use serde_json::Value;
use sluice_types::{Flow, PipelineError, Result, TOP_LABEL};
use uuid::Uuid;

/// Control-flow API exposed to a [`Valve`](crate::Valve) during `invoke`.
///
/// Implemented by [`PipelineInvocationHandle`](crate::PipelineInvocationHandle);
/// valves only ever see it as `&mut dyn PipelineContext`.
pub trait PipelineContext {
    /// Hand control to the next valve of the current pipeline.
    ///
    /// Returns immediately without advancing once this invocation is broken.
    fn invoke_next(&mut self) -> Result<()>;

    /// Break the current invocation plus `levels` enclosing ones.
    ///
    /// `levels` must be less than [`level`](PipelineContext::level).
    fn break_pipeline(&mut self, levels: usize) -> Result<()>;

    /// Break up to and including the invocation whose pipeline carries `label`.
    /// [`TOP_LABEL`] names the outermost invocation.
    fn break_to_label(&mut self, label: &str) -> Result<()> {
        let levels = self.find_label(label)?;
        self.break_pipeline(levels)
    }

    /// Number of enclosing invocations between this one and the one labeled `label`.
    fn find_label(&self, label: &str) -> Result<usize>;

    /// Apply the outcome of a nested invocation started from this context.
    fn absorb(&mut self, flow: Flow) -> Result<()> {
        match flow.parent_break_levels() {
            Some(levels) => self.break_pipeline(levels),
            None => Ok(()),
        }
    }

    fn is_broken(&self) -> bool;

    /// Identifier shared by a top-level invocation and everything nested in it.
    fn invocation_id(&self) -> Uuid;

    /// Nesting depth; a top-level invocation is level 1.
    fn level(&self) -> usize;

    /// 1-based number of the valve currently executing, 0 when idle.
    fn index(&self) -> usize;

    /// Label of the pipeline this invocation runs.
    fn label(&self) -> Option<&str>;

    fn parent(&self) -> Option<&dyn PipelineContext>;

    /// Look an attribute up here, then in enclosing invocations.
    fn attribute(&self, key: &str) -> Option<&Value>;

    /// Store an attribute on this invocation only. A JSON `null` hides any
    /// value an enclosing invocation holds under the same key.
    fn set_attribute(&mut self, key: &str, value: Value);
}

/// Walk outward from `context` until a pipeline carrying `label` is found.
pub(crate) fn resolve_label(context: &dyn PipelineContext, label: &str) -> Result<usize> {
    let label = label.trim();
    if label.is_empty() {
        return Err(PipelineError::MissingLabel);
    }
    let is_top = label == TOP_LABEL;

    let mut current = context;
    let mut distance = 0;
    loop {
        let parent = current.parent();
        if (is_top && parent.is_none()) || current.label() == Some(label) {
            tracing::debug!(label, distance, "Resolved break label");
            return Ok(distance);
        }
        match parent {
            Some(outer) => {
                current = outer;
                distance += 1;
            }
            None => {
                return Err(PipelineError::LabelNotDefined {
                    label: label.to_string(),
                })
            }
        }
    }
}
