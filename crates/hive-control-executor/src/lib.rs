//! Script step execution for the hive control plane.
//!
//! Provides:
//! - Step request and result types
//! - Invocation wrapping for chained steps
//! - `StepExecutor` - Fail-fast sequential runner with per-step timeouts

pub mod runner;
pub mod script;
pub mod step;

pub use runner::{
    DEFAULT_TOTAL_TIMEOUT, ExecutorError, MIN_STEP_TIMEOUT, StepExecutor, per_step_timeout,
};
pub use script::{InvocationBuilder, ScriptBuildError};
pub use step::{StepOutcome, StepResult, StepSpec};
