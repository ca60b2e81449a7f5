use std::fmt;
use std::sync::Arc;

use crate::context::PipelineContext;
use crate::invocation::PipelineInvocationHandle;
use crate::valve::Valve;

/// An ordered, immutable sequence of valves, optionally labeled.
///
/// Built once through [`Pipeline::builder`] and then invoked any number of
/// times, from any number of threads. All per-call state lives in the
/// [`PipelineInvocationHandle`] returned by [`new_invocation`](Pipeline::new_invocation).
#[derive(Clone, Default)]
pub struct Pipeline {
    valves: Vec<Arc<dyn Valve>>,
    label: Option<String>,
}

#[derive(Default)]
pub struct PipelineBuilder {
    valves: Vec<Arc<dyn Valve>>,
    label: Option<String>,
}

impl PipelineBuilder {
    /// Blank labels are treated as no label; others are trimmed.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        let trimmed = label.trim();
        self.label = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn valve(mut self, valve: impl Valve + 'static) -> Self {
        self.valves.push(Arc::new(valve));
        self
    }

    pub fn shared_valve(mut self, valve: Arc<dyn Valve>) -> Self {
        self.valves.push(valve);
        self
    }

    pub fn valves(mut self, valves: impl IntoIterator<Item = Arc<dyn Valve>>) -> Self {
        self.valves.extend(valves);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            valves: self.valves,
            label: self.label,
        }
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn valves(&self) -> &[Arc<dyn Valve>] {
        &self.valves
    }

    pub fn len(&self) -> usize {
        self.valves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valves.is_empty()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Start a top-level invocation.
    pub fn new_invocation(&self) -> PipelineInvocationHandle<'_> {
        PipelineInvocationHandle::new(self, None)
    }

    /// Start an invocation nested inside `parent`. The new invocation inherits
    /// `parent`'s attributes, can break to its labels, and sits one level deeper.
    pub fn new_invocation_within<'a>(
        &'a self,
        parent: &'a dyn PipelineContext,
    ) -> PipelineInvocationHandle<'a> {
        PipelineInvocationHandle::new(self, Some(parent))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valves.is_empty() {
            return f.write_str("Pipeline[]");
        }
        match &self.label {
            Some(label) => writeln!(f, "Pipeline({label}) [")?,
            None => writeln!(f, "Pipeline [")?,
        }
        let total = self.valves.len();
        for (i, valve) in self.valves.iter().enumerate() {
            writeln!(f, "  [{}/{}] {}", i + 1, total, valve.describe())?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("label", &self.label)
            .field(
                "valves",
                &self.valves.iter().map(|v| v.describe()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
