//! Built-in control-flow valves.

pub mod branch;
pub mod breaks;
pub mod loops;
pub mod try_catch;

pub use branch::{ChooseValve, ChooseValveBuilder, IfValve, IfValveBuilder};
pub use breaks::{
    BreakIfValve, BreakUnlessValve, BreakValve, BreakValveBuilder, ConditionalBreakBuilder,
    ExitValve,
};
pub use loops::{
    LoopSettings, LoopValve, LoopValveBuilder, WhileLoopValve, WhileLoopValveBuilder,
    DEFAULT_LOOP_COUNTER_NAME, DEFAULT_MAX_LOOP_COUNT,
};
pub use try_catch::{TryCatchFinallyValve, TryCatchFinallyValveBuilder, DEFAULT_EXCEPTION_NAME};
