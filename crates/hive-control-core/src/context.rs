//! Browsing context identity and handles.

use std::{fmt, sync::Arc};

use serde::Deserialize;

use crate::traits::NetworkEventSource;

/// Logical context identifier, assigned externally and stable across reattachment.
pub type ContextId = String;

/// Live handle to a browsing context owned by the context host.
///
/// The event source id is the host runtime's own identifier for the
/// context's content process. It may change when the host recreates the
/// underlying webview, which is why routing goes through it rather than
/// through the logical id.
#[derive(Clone)]
pub struct ContextHandle {
    /// Host-assigned id of the underlying event source.
    pub event_source_id: String,
    pub events: Arc<dyn NetworkEventSource>,
}

impl ContextHandle {
    #[must_use]
    pub fn new(event_source_id: impl Into<String>, events: Arc<dyn NetworkEventSource>) -> Self {
        Self {
            event_source_id: event_source_id.into(),
            events,
        }
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("event_source_id", &self.event_source_id)
            .finish_non_exhaustive()
    }
}

/// A context as declared by the context directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContextDescriptor {
    pub id: ContextId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl ContextDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
        }
    }
}
