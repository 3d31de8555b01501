//! Collaborator traits for the context host and directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::{ContextDescriptor, ContextHandle, NetworkEvent};

/// Callback invoked for every network event emitted by a source.
pub type EventListener = Arc<dyn Fn(NetworkEvent) + Send + Sync>;

/// Source of network events for one browsing context.
///
/// Every registered listener is invoked for every event, so registering the
/// same listener twice doubles delivery.
pub trait NetworkEventSource: Send + Sync {
    /// Register a listener for completed requests.
    fn on_completed(&self, listener: EventListener);

    /// Register a listener for requests that failed at the transport level.
    fn on_error(&self, listener: EventListener);
}

/// Context host error.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("Script failed: {0}")]
    ScriptFailed(String),
    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// The process that owns the browsing contexts.
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// Execute script code inside a context and return its JSON result.
    ///
    /// `deadline` is the point after which the caller stops waiting. Hosts
    /// that can abort in-flight execution should do so once it passes;
    /// the caller does not rely on it.
    async fn execute_script(
        &self,
        context_id: &str,
        code: &str,
        deadline: Instant,
    ) -> Result<Value, HostError>;

    /// Get the current handle for a context, if the host has one.
    fn context_handle(&self, context_id: &str) -> Option<ContextHandle>;
}

/// Directory error.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Enumerates the contexts known to the running UI process.
#[async_trait]
pub trait ContextDirectory: Send + Sync {
    /// List all declared contexts.
    async fn list_contexts(&self) -> Result<Vec<ContextDescriptor>, DirectoryError>;
}
