//! Sluice pipeline engine.
//!
//! A [`Pipeline`] is an immutable, ordered list of [`Valve`]s. Each call runs on
//! a fresh [`PipelineInvocationHandle`], which valves drive through the
//! [`PipelineContext`] trait: hand control on, break out of one or more
//! enclosing invocations, or read and write attributes. Control-flow valves
//! (branches, loops, breaks, try/catch/finally) live in [`valves`].

pub mod condition;
pub mod context;
pub mod invocation;
pub mod pipeline;
pub mod valve;
pub mod valves;

#[cfg(test)]
mod test_support;

pub use condition::{condition_fn, Condition, DescribedCondition, SharedCondition};
pub use context::PipelineContext;
pub use invocation::PipelineInvocationHandle;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use valve::{invoke_block, invoke_block_with, FnValve, PassthroughValve, Valve};
pub use valves::{
    BreakIfValve, BreakUnlessValve, BreakValve, ChooseValve, ExitValve, IfValve, LoopSettings,
    LoopValve, TryCatchFinallyValve, WhileLoopValve, DEFAULT_EXCEPTION_NAME,
    DEFAULT_LOOP_COUNTER_NAME, DEFAULT_MAX_LOOP_COUNT,
};

pub use sluice_types::{BreakTarget, Flow, PipelineError, Result, TOP_LABEL};
