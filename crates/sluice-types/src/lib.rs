//! Shared types and errors for the Sluice valve engine.
//!
//! This crate provides the foundational types used by the pipeline crate and by
//! hosts that implement their own valves:
//! - `PipelineError`: unified error taxonomy
//! - `Flow`: explicit outcome of one pipeline invocation
//! - `BreakTarget`: where a break request unwinds to

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved label naming the outermost active pipeline invocation.
pub const TOP_LABEL: &str = "#TOP";

/// Unified error type for pipeline configuration and invocation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // === Configuration Errors ===
    #[error("Invalid valve configuration: {0}")]
    ConfigError(String),

    // === Invocation Errors ===
    #[error("Failed to invoke {position}: {valve}")]
    ValveFailed {
        position: String,
        valve: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("{position} has already been invoked: {valve}")]
    AlreadyInvoked { position: String, valve: String },

    #[error("cannot reinvoke a broken pipeline")]
    BrokenPipeline,

    #[error("invalid break levels: {levels}, should be in range of [0, {level})")]
    InvalidBreakLevels { levels: usize, level: usize },

    #[error("no label")]
    MissingLabel,

    #[error(
        "Could not find pipeline or sub-pipeline with label \"{label}\" in the pipeline invocation stack"
    )]
    LabelNotDefined { label: String },

    // === Loop Errors ===
    #[error("Too many loops: exceeds the maximum count: {max}")]
    TooManyLoops { max: u64 },

    #[error("Loop counter '{name}' does not hold a non-negative integer")]
    InvalidLoopCounter { name: String },

    // === Generic ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Returns `true` for errors that an enclosing pipeline frame forwards as-is
    /// instead of wrapping them in [`PipelineError::ValveFailed`].
    pub fn passes_through_frames(&self) -> bool {
        matches!(
            self,
            PipelineError::ValveFailed { .. }
                | PipelineError::TooManyLoops { .. }
                | PipelineError::LabelNotDefined { .. }
        )
    }

    /// Returns `true` if the error was raised while building a pipeline or valve.
    pub fn is_config_error(&self) -> bool {
        matches!(self, PipelineError::ConfigError(_))
    }

    /// Follow `ValveFailed` wrappers down to the error that was originally raised.
    pub fn root_cause(&self) -> &PipelineError {
        let mut current = self;
        while let PipelineError::ValveFailed { source, .. } = current {
            current = &**source;
        }
        current
    }

    /// Short snake_case tag identifying the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigError(_) => "config_error",
            PipelineError::ValveFailed { .. } => "valve_failed",
            PipelineError::AlreadyInvoked { .. } => "already_invoked",
            PipelineError::BrokenPipeline => "broken_pipeline",
            PipelineError::InvalidBreakLevels { .. } => "invalid_break_levels",
            PipelineError::MissingLabel => "missing_label",
            PipelineError::LabelNotDefined { .. } => "label_not_defined",
            PipelineError::TooManyLoops { .. } => "too_many_loops",
            PipelineError::InvalidLoopCounter { .. } => "invalid_loop_counter",
            PipelineError::Json(_) => "json",
            PipelineError::Other(_) => "other",
        }
    }

    /// Encode the error as a JSON object so it can be stored as a pipeline attribute.
    ///
    /// `kind` and `message` describe the root cause; `description` is the full
    /// display text of the outermost error.
    pub fn to_value(&self) -> serde_json::Value {
        let root = self.root_cause();
        serde_json::json!({
            "kind": root.kind(),
            "message": root.to_string(),
            "description": self.to_string(),
        })
    }
}

/// A convenience alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// Flow: outcome of one pipeline invocation
// ---------------------------------------------------------------------------

/// How a pipeline invocation ended.
#[must_use = "a broken flow has to be absorbed by the enclosing context"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "flow")]
pub enum Flow {
    /// Every valve was reached.
    Completed,
    /// A valve returned without handing control to the next one.
    Returned,
    /// The invocation was broken; `remaining` enclosing invocations must unwind too.
    Broken { remaining: usize },
}

impl Flow {
    pub fn is_broken(&self) -> bool {
        matches!(self, Flow::Broken { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Flow::Completed)
    }

    /// The break level an enclosing invocation has to apply to itself, if any.
    pub fn parent_break_levels(&self) -> Option<usize> {
        match self {
            Flow::Broken { remaining } if *remaining > 0 => Some(remaining - 1),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BreakTarget: where a break unwinds to
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakTarget {
    /// Unwind the current invocation plus this many enclosing ones.
    Levels(usize),
    /// Unwind up to and including the invocation whose pipeline carries the label.
    Label(String),
    /// Unwind the whole top-level invocation.
    Top,
}

impl Default for BreakTarget {
    fn default() -> Self {
        BreakTarget::Levels(0)
    }
}

impl fmt::Display for BreakTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakTarget::Levels(n) => write!(f, "levels={n}"),
            BreakTarget::Label(label) => write!(f, "label={label}"),
            BreakTarget::Top => f.write_str(TOP_LABEL),
        }
    }
}
