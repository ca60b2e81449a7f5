//! Recording helpers shared by the unit tests.

use std::sync::{Arc, Mutex};

use crate::context::PipelineContext;
use crate::pipeline::Pipeline;
use crate::valve::{FnValve, Valve};

/// Shared, ordered record of which valve positions ran.
#[derive(Clone)]
pub(crate) struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
    counter_name: Arc<str>,
}

impl ExecutionLog {
    pub(crate) fn new() -> Self {
        Self::with_counter("loopCount")
    }

    pub(crate) fn with_counter(counter_name: &str) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            counter_name: counter_name.into(),
        }
    }

    /// Append `"{level}-{index}"`, suffixed with `-loop-{n}` when a loop
    /// counter is visible from `ctx`.
    pub(crate) fn record(&self, ctx: &dyn PipelineContext) {
        let mut entry = format!("{}-{}", ctx.level(), ctx.index());
        if let Some(count) = ctx.attribute(&self.counter_name).and_then(|v| v.as_i64()) {
            entry.push_str(&format!("-loop-{count}"));
        }
        self.entries.lock().unwrap().push(entry);
    }

    /// Drain everything recorded so far.
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}

/// A valve that records its position, then hands control on.
pub(crate) fn log_valve(log: &ExecutionLog) -> Arc<dyn Valve> {
    let log = log.clone();
    Arc::new(FnValve::new("LogValve", move |ctx| {
        log.record(ctx);
        Ok(())
    }))
}

/// A pipeline of `count` log valves.
pub(crate) fn log_pipeline(log: &ExecutionLog, count: usize) -> Pipeline {
    Pipeline::builder()
        .valves((0..count).map(|_| log_valve(log)))
        .build()
}
