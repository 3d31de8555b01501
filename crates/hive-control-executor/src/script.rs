//! Invocation wrapping for step code.

use serde_json::Value;
use thiserror::Error;

/// Script build error.
#[derive(Debug, Error)]
pub enum ScriptBuildError {
    #[error("Step code is empty")]
    EmptyCode,
    #[error("Previous result cannot be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Builder for the code sent to the context host.
///
/// Step code is either a function expression, which is called, or any
/// other expression, whose value is returned as-is. A previous result is
/// passed by value: it is serialized to JSON here and re-parsed inside the
/// context, so only JSON-representable values survive.
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    /// Step source code.
    pub code: String,
    /// Result of the previous step to pass as the sole argument.
    pub previous: Option<Value>,
}

impl InvocationBuilder {
    /// Create a builder for step code.
    #[must_use]
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self {
            code: code.into(),
            previous: None,
        }
    }

    /// Inject a previous result.
    #[must_use]
    pub fn previous(mut self, value: Value) -> Self {
        self.previous = Some(value);
        self
    }

    /// Build the invocation.
    ///
    /// # Errors
    /// Returns error if the code is blank.
    pub fn build(&self) -> Result<String, ScriptBuildError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(ScriptBuildError::EmptyCode);
        }

        // The newline keeps a trailing line comment from swallowing the paren.
        let script = match &self.previous {
            None => format!(
                "(async () => {{\n\
                 const __step = ({code}\n);\n\
                 return typeof __step === 'function' ? await __step() : __step;\n\
                 }})()"
            ),
            Some(previous) => {
                let literal = serde_json::to_string(&serde_json::to_string(previous)?)?;
                format!(
                    "(async () => {{\n\
                     const __prev = JSON.parse({literal});\n\
                     const __step = ({code}\n);\n\
                     return typeof __step === 'function' ? await __step(__prev) : __step;\n\
                     }})()"
                )
            }
        };
        Ok(script)
    }
}
