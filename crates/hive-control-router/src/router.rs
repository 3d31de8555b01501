//! Routing table from event sources to logical contexts.

use std::{
    collections::{HashMap, HashSet},
    sync::{PoisonError, RwLock},
};

use hive_control_core::{ContextHandle, ContextId};

/// Router error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Event source {source_id} already belongs to context {owner}")]
    SourceInUse { source_id: String, owner: ContextId },
}

/// Result of an attach call.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// The context was registered by this call.
    New(ContextHandle),
    /// The context was already attached; the existing registration is kept.
    Existing(ContextHandle),
}

impl Attachment {
    /// The registered handle.
    #[must_use]
    pub const fn handle(&self) -> &ContextHandle {
        match self {
            Self::New(h) | Self::Existing(h) => h,
        }
    }

    /// Whether this call created the registration.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

#[derive(Default)]
struct Tables {
    /// event source id -> context id
    sources: HashMap<String, ContextId>,
    /// context id -> current handle
    contexts: HashMap<ContextId, ContextHandle>,
}

/// Many-to-one map from event sources to contexts, one-to-one from contexts to handles.
///
/// Both tables sit behind one lock and every operation completes inside a
/// single critical section, so readers never see them out of sync.
#[derive(Default)]
pub struct ContextRouter {
    tables: RwLock<Tables>,
}

impl ContextRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context under its handle's event source.
    ///
    /// Attaching a context that is already attached is a no-op returning
    /// the existing registration.
    ///
    /// # Errors
    /// Returns error if the event source is routed to a different context.
    pub fn attach(
        &self,
        context_id: &str,
        handle: ContextHandle,
    ) -> Result<Attachment, RouterError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = tables.contexts.get(context_id) {
            return Ok(Attachment::Existing(existing.clone()));
        }

        if let Some(owner) = tables.sources.get(&handle.event_source_id) {
            return Err(RouterError::SourceInUse {
                source_id: handle.event_source_id.clone(),
                owner: owner.clone(),
            });
        }

        tables
            .sources
            .insert(handle.event_source_id.clone(), context_id.to_string());
        tables
            .contexts
            .insert(context_id.to_string(), handle.clone());

        tracing::info!(
            context_id,
            event_source_id = %handle.event_source_id,
            "context attached"
        );
        Ok(Attachment::New(handle))
    }

    /// Resolve the context owning an event source.
    #[must_use]
    pub fn resolve_context(&self, event_source_id: &str) -> Option<ContextId> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sources
            .get(event_source_id)
            .cloned()
    }

    /// Get the current handle for a context.
    #[must_use]
    pub fn get_handle(&self, context_id: &str) -> Option<ContextHandle> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contexts
            .get(context_id)
            .cloned()
    }

    /// Remove every routing entry for a context.
    ///
    /// Returns the handle that was registered, if any.
    pub fn detach(&self, context_id: &str) -> Option<ContextHandle> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let handle = tables.contexts.remove(context_id)?;
        tables.sources.retain(|_, owner| owner != context_id);
        drop(tables);

        tracing::info!(context_id, "context detached");
        Some(handle)
    }

    /// Whether a context is currently attached.
    #[must_use]
    pub fn is_attached(&self, context_id: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contexts
            .contains_key(context_id)
    }

    /// Ids of all attached contexts.
    #[must_use]
    pub fn attached_ids(&self) -> HashSet<ContextId> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contexts
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hive_control_core::{NetworkEventSource, testing::MockEventSource};

    use super::*;

    fn handle(source_id: &str) -> ContextHandle {
        ContextHandle::new(source_id, MockEventSource::new() as Arc<dyn NetworkEventSource>)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let router = ContextRouter::new();

        let first = router.attach("c1", handle("11")).unwrap();
        assert!(first.is_new());

        // Second attach with a different handle keeps the original.
        let second = router.attach("c1", handle("12")).unwrap();
        assert!(!second.is_new());
        assert_eq!(second.handle().event_source_id, "11");

        assert_eq!(router.resolve_context("11").as_deref(), Some("c1"));
        assert_eq!(router.resolve_context("12"), None);
    }

    #[test]
    fn test_source_cannot_route_to_two_contexts() {
        let router = ContextRouter::new();
        router.attach("c1", handle("11")).unwrap();

        let err = router.attach("c2", handle("11")).unwrap_err();
        assert_eq!(
            err,
            RouterError::SourceInUse {
                source_id: "11".to_string(),
                owner: "c1".to_string(),
            }
        );
        assert!(!router.is_attached("c2"));
    }

    #[test]
    fn test_detach_removes_all_entries() {
        let router = ContextRouter::new();
        router.attach("c1", handle("11")).unwrap();
        router.attach("c2", handle("21")).unwrap();

        let removed = router.detach("c1").unwrap();
        assert_eq!(removed.event_source_id, "11");
        assert_eq!(router.resolve_context("11"), None);
        assert!(router.get_handle("c1").is_none());
        assert_eq!(router.attached_ids(), HashSet::from(["c2".to_string()]));

        assert!(router.detach("c1").is_none());

        // A new event source may be attached after destruction.
        assert!(router.attach("c1", handle("13")).unwrap().is_new());
        assert_eq!(router.resolve_context("13").as_deref(), Some("c1"));
    }
}
