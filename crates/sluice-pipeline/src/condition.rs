//! Boolean predicates evaluated against a pipeline context.
//!
//! The engine only ever asks a condition whether it holds. Hosts supply the
//! actual predicates, either as types implementing [`Condition`] or as plain
//! closures.

use std::fmt;
use std::sync::Arc;

use sluice_types::Result;

use crate::context::PipelineContext;

/// A predicate consulted by branch, loop, and conditional-break valves.
pub trait Condition: Send + Sync {
    fn is_satisfied(&self, ctx: &dyn PipelineContext) -> Result<bool>;

    /// Human-readable form used in valve descriptions.
    fn describe(&self) -> String {
        "Condition".to_string()
    }
}

impl<F> Condition for F
where
    F: Fn(&dyn PipelineContext) -> bool + Send + Sync,
{
    fn is_satisfied(&self, ctx: &dyn PipelineContext) -> Result<bool> {
        Ok(self(ctx))
    }
}

/// Shared handle to a condition, as stored by valves.
pub type SharedCondition = Arc<dyn Condition>;

/// A closure condition carrying a description, e.g. the expression it was
/// compiled from.
pub struct DescribedCondition<F> {
    description: String,
    predicate: F,
}

impl<F> Condition for DescribedCondition<F>
where
    F: Fn(&dyn PipelineContext) -> bool + Send + Sync,
{
    fn is_satisfied(&self, ctx: &dyn PipelineContext) -> Result<bool> {
        Ok((self.predicate)(ctx))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl<F> fmt::Debug for DescribedCondition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DescribedCondition")
            .field(&self.description)
            .finish()
    }
}

/// Wrap a closure as a shared condition with a description.
pub fn condition_fn<F>(description: impl Into<String>, predicate: F) -> SharedCondition
where
    F: Fn(&dyn PipelineContext) -> bool + Send + Sync + 'static,
{
    Arc::new(DescribedCondition {
        description: description.into(),
        predicate,
    })
}
