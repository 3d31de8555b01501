//! Fail-fast sequential step runner.

use std::{sync::Arc, time::Duration};

use hive_control_core::{ContextHost, HostError};
use hive_control_router::ContextRouter;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    script::InvocationBuilder,
    step::{StepResult, StepSpec},
};

/// Total budget used when a request does not set one.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Lower bound for every step's share of the budget.
pub const MIN_STEP_TIMEOUT: Duration = Duration::from_millis(5_000);

const TIMEOUT_MESSAGE: &str = "execution timed out";

/// Whole-request executor error. Step failures are not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Per-step timeout: an even share of the total budget, never below
/// [`MIN_STEP_TIMEOUT`].
#[must_use]
pub fn per_step_timeout(total: Duration, steps: usize) -> Duration {
    let steps = u32::try_from(steps.max(1)).unwrap_or(u32::MAX);
    (total / steps).max(MIN_STEP_TIMEOUT)
}

/// Runs script steps inside a context, one at a time.
pub struct StepExecutor {
    host: Arc<dyn ContextHost>,
    router: Arc<ContextRouter>,
}

impl StepExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(host: Arc<dyn ContextHost>, router: Arc<ContextRouter>) -> Self {
        Self { host, router }
    }

    /// Execute `steps` in order inside `context_id`.
    ///
    /// Stops at the first failed or timed-out step; steps after it are not
    /// attempted and have no result. A timed-out step is abandoned, not
    /// cancelled: the host may still finish running it.
    ///
    /// # Errors
    /// Returns error if `steps` is empty or the context is not attached.
    pub async fn run(
        &self,
        context_id: &str,
        steps: &[StepSpec],
        total_timeout: Duration,
    ) -> Result<Vec<StepResult>, ExecutorError> {
        if steps.is_empty() {
            return Err(ExecutorError::InvalidRequest(
                "steps must be a non-empty array".to_string(),
            ));
        }
        if self.router.get_handle(context_id).is_none() {
            return Err(ExecutorError::ContextNotFound(context_id.to_string()));
        }

        let step_timeout = per_step_timeout(total_timeout, steps.len());
        tracing::debug!(
            context_id,
            steps = steps.len(),
            step_timeout_ms = u64::try_from(step_timeout.as_millis()).unwrap_or(u64::MAX),
            "running steps"
        );

        let mut results = Vec::with_capacity(steps.len());
        let mut previous: Option<Value> = None;

        for (index, step) in steps.iter().enumerate() {
            let injected = if step.use_previous { previous.take() } else { None };
            let result = self
                .run_step(context_id, index, step, injected, step_timeout)
                .await;

            let succeeded = result.success;
            previous = result.result().cloned();
            results.push(result);

            if !succeeded {
                tracing::info!(context_id, step = index, "step failed, stopping");
                break;
            }
            if let Some(delay) = step.post_delay() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(results)
    }

    async fn run_step(
        &self,
        context_id: &str,
        index: usize,
        step: &StepSpec,
        previous: Option<Value>,
        step_timeout: Duration,
    ) -> StepResult {
        let mut builder = InvocationBuilder::new(step.code.as_str());
        if let Some(previous) = previous {
            builder = builder.previous(previous);
        }
        let code = match builder.build() {
            Ok(code) => code,
            Err(e) => return StepResult::failed(index, e.to_string()),
        };

        let deadline = Instant::now() + step_timeout;
        let execution = self.host.execute_script(context_id, &code, deadline);

        match tokio::time::timeout_at(deadline, execution).await {
            Ok(Ok(value)) => StepResult::ok(index, value),
            Ok(Err(HostError::ScriptFailed(message))) => StepResult::failed(index, message),
            Ok(Err(e)) => StepResult::failed(index, e.to_string()),
            Err(_) => {
                tracing::warn!(context_id, step = index, "step timed out");
                StepResult::failed(index, TIMEOUT_MESSAGE)
            }
        }
    }
}
