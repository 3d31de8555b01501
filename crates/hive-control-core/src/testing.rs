//! In-memory collaborators for tests (feature `testing`).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    ContextDescriptor, ContextDirectory, ContextHandle, ContextHost, EventListener, NetworkEvent,
    NetworkEventSource,
    traits::{DirectoryError, HostError},
};

/// Event source that fans each emitted event out to every registered listener.
#[derive(Default)]
pub struct MockEventSource {
    completed: Mutex<Vec<EventListener>>,
    errored: Mutex<Vec<EventListener>>,
}

impl MockEventSource {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver an event to every completion listener.
    pub fn emit_completed(&self, event: &NetworkEvent) {
        let listeners = self.completed.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Deliver an event to every error listener.
    pub fn emit_error(&self, event: &NetworkEvent) {
        let listeners = self.errored.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Number of registered completion listeners.
    #[must_use]
    pub fn completed_listeners(&self) -> usize {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl NetworkEventSource for MockEventSource {
    fn on_completed(&self, listener: EventListener) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn on_error(&self, listener: EventListener) {
        self.errored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

/// Scripted reply from [`MockHost`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Resolve immediately with a value.
    Value(Value),
    /// Reject immediately with a message.
    Fail(String),
    /// Resolve with a value after a delay.
    Delayed(Duration, Value),
    /// Never settle.
    Never,
}

type Responder = Arc<dyn Fn(&str) -> MockReply + Send + Sync>;

/// Context host whose script results come from a responder function.
pub struct MockHost {
    handles: Mutex<HashMap<String, ContextHandle>>,
    executed: Mutex<Vec<String>>,
    responder: Responder,
}

impl MockHost {
    /// Create a host that answers every script with `responder(code)`.
    pub fn new(responder: impl Fn(&str) -> MockReply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            responder: Arc::new(responder),
        })
    }

    /// Register a context backed by a fresh event source and return the source.
    pub fn add_context(&self, context_id: &str, event_source_id: &str) -> Arc<MockEventSource> {
        let source = MockEventSource::new();
        let handle = ContextHandle::new(event_source_id, Arc::clone(&source) as Arc<dyn NetworkEventSource>);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context_id.to_string(), handle);
        source
    }

    /// Forget a context, as if its webview was destroyed.
    pub fn remove_context(&self, context_id: &str) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context_id);
    }

    /// Every piece of code passed to `execute_script`, in call order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContextHost for MockHost {
    async fn execute_script(
        &self,
        context_id: &str,
        code: &str,
        _deadline: Instant,
    ) -> Result<Value, HostError> {
        if self.context_handle(context_id).is_none() {
            return Err(HostError::ContextNotFound(context_id.to_string()));
        }
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code.to_string());

        match (self.responder)(code) {
            MockReply::Value(v) => Ok(v),
            MockReply::Fail(msg) => Err(HostError::ScriptFailed(msg)),
            MockReply::Delayed(delay, v) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
            MockReply::Never => std::future::pending::<Result<Value, HostError>>().await,
        }
    }

    fn context_handle(&self, context_id: &str) -> Option<ContextHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context_id)
            .cloned()
    }
}

/// Directory backed by a fixed list.
#[derive(Debug, Default)]
pub struct MockDirectory {
    contexts: Vec<ContextDescriptor>,
    unavailable: bool,
}

impl MockDirectory {
    #[must_use]
    pub fn new(contexts: Vec<ContextDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            contexts,
            unavailable: false,
        })
    }

    /// Create a directory whose UI process is not running.
    #[must_use]
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            contexts: Vec::new(),
            unavailable: true,
        })
    }
}

#[async_trait]
impl ContextDirectory for MockDirectory {
    async fn list_contexts(&self) -> Result<Vec<ContextDescriptor>, DirectoryError> {
        if self.unavailable {
            return Err(DirectoryError::Unavailable("UI process not running".to_string()));
        }
        Ok(self.contexts.clone())
    }
}
