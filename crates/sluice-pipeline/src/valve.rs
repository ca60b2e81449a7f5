//! Valve trait, closure-backed valves, and nested-block dispatch.

use std::fmt;
use std::sync::Arc;

use sluice_types::{Flow, Result};

use crate::context::PipelineContext;
use crate::pipeline::Pipeline;

// ---------------------------------------------------------------------------
// Valve trait
// ---------------------------------------------------------------------------

/// One configured unit of work within a [`Pipeline`].
///
/// A valve holds only configuration fixed when it was built. Everything that
/// changes during a call belongs in the context it is handed. Implementations
/// are expected to finish by calling `ctx.invoke_next()`, even after requesting
/// a break; the context ignores the call once it is broken.
pub trait Valve: Send + Sync {
    /// The valve type identifier (e.g. "IfValve", "LoopValve").
    fn name(&self) -> &str;

    /// One-line description used in pipeline listings and error positions.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()>;
}

/// Run `block` as a nested invocation of `ctx` and propagate its break, if any.
pub fn invoke_block(ctx: &mut dyn PipelineContext, block: &Pipeline) -> Result<Flow> {
    invoke_block_with(ctx, block, |_| {})
}

/// Like [`invoke_block`], letting `prepare` seed the nested invocation first.
///
/// A break requested inside the block reaches `ctx` even when the block then
/// fails, so catching the error cannot undo the break.
pub fn invoke_block_with<F>(
    ctx: &mut dyn PipelineContext,
    block: &Pipeline,
    prepare: F,
) -> Result<Flow>
where
    F: FnOnce(&mut dyn PipelineContext),
{
    let (result, flow) = {
        let mut handle = block.new_invocation_within(&*ctx);
        prepare(&mut handle);
        let result = handle.invoke();
        (result, handle.flow())
    };
    ctx.absorb(flow)?;
    result
}

// ---------------------------------------------------------------------------
// Built-in simple valves
// ---------------------------------------------------------------------------

/// Does nothing but hand control to the next valve.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughValve;

impl Valve for PassthroughValve {
    fn name(&self) -> &str {
        "PassthroughValve"
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        ctx.invoke_next()
    }
}

type ValveFn = dyn Fn(&mut dyn PipelineContext) -> Result<()> + Send + Sync;

/// A valve backed by a closure.
pub struct FnValve {
    name: String,
    action: Arc<ValveFn>,
    chain: bool,
}

impl FnValve {
    /// Run `action`, then hand control to the next valve.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut dyn PipelineContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Arc::new(action),
            chain: true,
        }
    }

    /// Run `action` only. The closure decides whether to call `invoke_next`.
    pub fn returning<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut dyn PipelineContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            chain: false,
            ..Self::new(name, action)
        }
    }
}

impl Valve for FnValve {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, ctx: &mut dyn PipelineContext) -> Result<()> {
        (self.action)(ctx)?;
        if self.chain {
            ctx.invoke_next()?;
        }
        Ok(())
    }
}

impl fmt::Debug for FnValve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValve")
            .field("name", &self.name)
            .field("chain", &self.chain)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
