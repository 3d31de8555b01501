//! Step request and result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delay used when a step's post-delay cannot be parsed.
const FALLBACK_POST_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for a step's post-delay.
const MAX_POST_DELAY: Duration = Duration::from_millis(60_000);

/// One unit of script code within an execution request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub code: String,
    /// Pass the previous step's result as the sole argument.
    #[serde(default)]
    pub use_previous: bool,
    /// Settle time after a successful step. Kept raw so a bad value
    /// degrades to the fallback delay instead of rejecting the request.
    #[serde(default)]
    pub post_delay_ms: Option<Value>,
}

impl StepSpec {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Mark the step as consuming the previous result.
    #[must_use]
    pub const fn chained(mut self) -> Self {
        self.use_previous = true;
        self
    }

    /// Set a post-delay in milliseconds.
    #[must_use]
    pub fn with_post_delay(mut self, millis: u64) -> Self {
        self.post_delay_ms = Some(Value::from(millis));
        self
    }

    /// How long to wait after this step succeeds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn post_delay(&self) -> Option<Duration> {
        let raw = match self.post_delay_ms.as_ref()? {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        let delay = match raw {
            // Non-negative and finite, so the cast only drops the fraction.
            Some(ms) if ms.is_finite() && ms >= 0.0 => Duration::from_millis(ms as u64),
            _ => FALLBACK_POST_DELAY,
        };
        Some(delay.min(MAX_POST_DELAY))
    }
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutcome {
    Value { result: Value },
    Error { error: String },
}

/// Result of one attempted step, as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based step index.
    pub step: usize,
    pub success: bool,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepResult {
    #[must_use]
    pub const fn ok(step: usize, result: Value) -> Self {
        Self {
            step,
            success: true,
            outcome: StepOutcome::Value { result },
        }
    }

    #[must_use]
    pub fn failed(step: usize, error: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            outcome: StepOutcome::Error {
                error: error.into(),
            },
        }
    }

    /// The step's value, if it succeeded.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            StepOutcome::Value { result } => Some(result),
            StepOutcome::Error { .. } => None,
        }
    }

    /// The step's error message, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Value { .. } => None,
            StepOutcome::Error { error } => Some(error),
        }
    }
}
