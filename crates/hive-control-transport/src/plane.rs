//! Control plane service object.
//!
//! Owns the router, hook store, traffic interceptor and step executor for
//! one UI process and is shared by every request handler.

use std::{sync::Arc, time::Duration};

use hive_control_capture::{
    CaptureError, ForwardCounts, ForwardError, HookConfigStore, HookConfigUpdate, HttpHookSink,
    TrafficInterceptor,
};
use hive_control_core::{ContextDirectory, ContextHost, DirectoryError, TrafficRecord};
use hive_control_executor::{ExecutorError, StepExecutor, StepResult, StepSpec};
use hive_control_router::{Attachment, ContextRouter, RouterError};
use thiserror::Error;

use crate::protocol::WorkspaceEntry;

/// Control plane error.
#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

/// Builder for [`ControlPlane`].
pub struct ControlPlaneBuilder {
    host: Arc<dyn ContextHost>,
    directory: Arc<dyn ContextDirectory>,
    capture: bool,
    hooks: HookConfigUpdate,
}

impl ControlPlaneBuilder {
    /// Run without traffic capture. `/traffic` then reports 503.
    #[must_use]
    pub const fn without_capture(mut self) -> Self {
        self.capture = false;
        self
    }

    /// Initial hook settings.
    #[must_use]
    pub fn hooks(mut self, update: HookConfigUpdate) -> Self {
        self.hooks = update;
        self
    }

    /// Build the control plane. Must be called inside a tokio runtime when
    /// capture is enabled, so hook deliveries have somewhere to run.
    ///
    /// # Errors
    /// Returns error if the default HTTP hook sink cannot be created.
    pub fn build(self) -> Result<ControlPlane, PlaneError> {
        let router = Arc::new(ContextRouter::new());
        let hooks = Arc::new(HookConfigStore::new());
        if !self.hooks.is_empty() {
            hooks.configure(self.hooks);
        }

        let interceptor = if self.capture {
            Some(TrafficInterceptor::new(
                Arc::clone(&router),
                Arc::clone(&hooks),
                Arc::new(HttpHookSink::new()?),
            ))
        } else {
            None
        };

        let executor = StepExecutor::new(Arc::clone(&self.host), Arc::clone(&router));

        Ok(ControlPlane {
            host: self.host,
            directory: self.directory,
            router,
            hooks,
            interceptor,
            executor,
        })
    }
}

/// The local control plane of one UI process.
pub struct ControlPlane {
    host: Arc<dyn ContextHost>,
    directory: Arc<dyn ContextDirectory>,
    router: Arc<ContextRouter>,
    hooks: Arc<HookConfigStore>,
    interceptor: Option<Arc<TrafficInterceptor>>,
    executor: StepExecutor,
}

impl ControlPlane {
    /// Start building a control plane over a host and its directory.
    #[must_use]
    pub fn builder(
        host: Arc<dyn ContextHost>,
        directory: Arc<dyn ContextDirectory>,
    ) -> ControlPlaneBuilder {
        ControlPlaneBuilder {
            host,
            directory,
            capture: true,
            hooks: HookConfigUpdate::default(),
        }
    }

    /// Attach a context the host has just made live, and start capturing
    /// its traffic. Safe to call again for an attached context.
    ///
    /// # Errors
    /// Returns error if the host has no such context or its event source is
    /// already routed elsewhere.
    pub fn attach(&self, context_id: &str) -> Result<Attachment, PlaneError> {
        let handle = self
            .host
            .context_handle(context_id)
            .ok_or_else(|| PlaneError::ContextNotFound(context_id.to_string()))?;

        let attachment = self.router.attach(context_id, handle)?;
        if let Some(interceptor) = &self.interceptor {
            interceptor.start_capturing(context_id)?;
        }
        Ok(attachment)
    }

    /// Forget a destroyed context. Its buffered traffic is dropped.
    pub fn context_destroyed(&self, context_id: &str) {
        if self.router.detach(context_id).is_none() {
            return;
        }
        if let Some(interceptor) = &self.interceptor {
            interceptor.release(context_id);
        }
        tracing::info!(context_id, "context destroyed");
    }

    /// Apply a partial hook configuration update.
    pub fn configure_hooks(&self, update: HookConfigUpdate) {
        self.hooks.configure(update);
    }

    /// Declared contexts, each marked with whether it is attached.
    ///
    /// # Errors
    /// Returns error if the directory cannot be read.
    pub async fn workspaces(&self) -> Result<Vec<WorkspaceEntry>, DirectoryError> {
        let contexts = self.directory.list_contexts().await?;
        let attached = self.router.attached_ids();
        Ok(contexts
            .into_iter()
            .map(|descriptor| {
                let accessible = attached.contains(&descriptor.id);
                WorkspaceEntry::new(descriptor, accessible)
            })
            .collect())
    }

    /// Run steps inside a context.
    ///
    /// # Errors
    /// Returns error if `steps` is empty or the context is not attached.
    pub async fn execute(
        &self,
        context_id: &str,
        steps: &[StepSpec],
        total_timeout: Duration,
    ) -> Result<Vec<StepResult>, ExecutorError> {
        self.executor.run(context_id, steps, total_timeout).await
    }

    /// Captured traffic for a context, or `None` when capture is disabled.
    #[must_use]
    pub fn traffic(&self, context_id: &str, since: i64, limit: usize) -> Option<Vec<TrafficRecord>> {
        self.interceptor
            .as_ref()
            .map(|interceptor| interceptor.get_traffic(context_id, since, limit))
    }

    /// Hook delivery counters, or `None` when capture is disabled.
    #[must_use]
    pub fn forward_counts(&self) -> Option<ForwardCounts> {
        self.interceptor.as_ref().map(|i| i.forward_counts())
    }

    #[must_use]
    pub const fn router(&self) -> &Arc<ContextRouter> {
        &self.router
    }

    #[must_use]
    pub const fn hooks(&self) -> &Arc<HookConfigStore> {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use hive_control_core::{
        ContextDescriptor, NetworkEvent,
        testing::{MockDirectory, MockHost, MockReply},
    };
    use serde_json::json;

    use super::*;

    fn plane(host: &Arc<MockHost>) -> ControlPlane {
        let directory = MockDirectory::new(vec![
            ContextDescriptor::new("c1", "https://a.test", "A"),
            ContextDescriptor::new("c2", "https://b.test", "B"),
        ]);
        ControlPlane::builder(Arc::clone(host) as Arc<dyn ContextHost>, directory)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_marks_workspace_accessible() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        host.add_context("c1", "11");
        let plane = plane(&host);

        assert!(plane.attach("c1").unwrap().is_new());
        assert!(!plane.attach("c1").unwrap().is_new());

        let workspaces = plane.workspaces().await.unwrap();
        assert_eq!(workspaces.len(), 2);
        assert!(workspaces[0].is_accessible);
        assert!(!workspaces[1].is_accessible);
    }

    #[tokio::test]
    async fn test_attach_unknown_context() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        let plane = plane(&host);

        assert!(matches!(
            plane.attach("c2"),
            Err(PlaneError::ContextNotFound(id)) if id == "c2"
        ));
    }

    #[tokio::test]
    async fn test_attach_captures_traffic() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        let source = host.add_context("c1", "11");
        let plane = plane(&host);
        plane.attach("c1").unwrap();
        plane.attach("c1").unwrap();

        assert_eq!(source.completed_listeners(), 1);
        source.emit_completed(&NetworkEvent::completed("11", "GET", "https://a.test/x", 200));

        let traffic = plane.traffic("c1", 0, 100).unwrap();
        assert_eq!(traffic.len(), 1);
        assert_eq!(traffic[0].context_id, "c1");
    }

    #[tokio::test]
    async fn test_destroyed_context_stops_routing() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        let source = host.add_context("c1", "11");
        let plane = plane(&host);
        plane.attach("c1").unwrap();
        source.emit_completed(&NetworkEvent::completed("11", "GET", "https://a.test/x", 200));

        plane.context_destroyed("c1");

        assert!(!plane.router().is_attached("c1"));
        assert!(plane.traffic("c1", 0, 100).unwrap().is_empty());
        source.emit_completed(&NetworkEvent::completed("11", "GET", "https://a.test/y", 200));
        assert!(plane.traffic("c1", 0, 100).unwrap().is_empty());

        // Destroying twice is harmless.
        plane.context_destroyed("c1");
    }

    #[tokio::test]
    async fn test_without_capture_has_no_traffic() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        host.add_context("c1", "11");
        let plane = ControlPlane::builder(
            Arc::clone(&host) as Arc<dyn ContextHost>,
            MockDirectory::new(Vec::new()),
        )
        .without_capture()
        .build()
        .unwrap();

        plane.attach("c1").unwrap();
        assert!(plane.traffic("c1", 0, 100).is_none());
        assert!(plane.forward_counts().is_none());
    }

    #[tokio::test]
    async fn test_initial_hooks_are_applied() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        let plane = ControlPlane::builder(
            Arc::clone(&host) as Arc<dyn ContextHost>,
            MockDirectory::new(Vec::new()),
        )
        .hooks(HookConfigUpdate {
            global_enabled: Some(true),
            global_url: Some("http://127.0.0.1:9/hook".to_string()),
            per_context_url: None,
        })
        .build()
        .unwrap();

        assert_eq!(
            plane.hooks().resolve_url("any").as_deref(),
            Some("http://127.0.0.1:9/hook")
        );

        plane.configure_hooks(HookConfigUpdate {
            global_enabled: Some(false),
            ..HookConfigUpdate::default()
        });
        assert!(plane.hooks().resolve_url("any").is_none());
    }

    #[tokio::test]
    async fn test_reattach_after_destroy_records_once() {
        let host = MockHost::new(|_| MockReply::Value(json!(1)));
        let source = host.add_context("c1", "11");
        let plane = plane(&host);

        plane.attach("c1").unwrap();
        plane.context_destroyed("c1");
        assert!(plane.attach("c1").unwrap().is_new());

        source.emit_completed(&NetworkEvent::completed("11", "GET", "https://a.test/x", 200));

        assert_eq!(source.completed_listeners(), 1);
        assert_eq!(plane.traffic("c1", 0, 100).unwrap().len(), 1);
    }
}
