//! Traffic interceptor: listener registration, buffering and forwarding.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use hive_control_core::{
    ContextId, DEFAULT_CAPACITY, EventListener, NetworkEvent, TrafficBuffer, TrafficRecord,
};
use hive_control_router::ContextRouter;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::{
    forward::{ForwardCounts, ForwardStats, HookSink},
    hooks::HookConfigStore,
};

/// Capture error.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Context not attached: {0}")]
    NotAttached(String),
}

/// Captures network events per context and forwards them to hooks.
///
/// Listeners hold only a weak reference back to the interceptor, so event
/// sources outliving it simply stop recording.
pub struct TrafficInterceptor {
    router: Arc<ContextRouter>,
    hooks: Arc<HookConfigStore>,
    sink: Arc<dyn HookSink>,
    stats: Arc<ForwardStats>,
    buffers: Mutex<HashMap<ContextId, TrafficBuffer>>,
    registered_sources: Mutex<HashSet<String>>,
    capacity: usize,
    runtime: Option<Handle>,
}

impl TrafficInterceptor {
    /// Create an interceptor with the default per-context capacity.
    ///
    /// Hook deliveries are spawned on the runtime current at construction.
    #[must_use]
    pub fn new(
        router: Arc<ContextRouter>,
        hooks: Arc<HookConfigStore>,
        sink: Arc<dyn HookSink>,
    ) -> Arc<Self> {
        Self::with_capacity(router, hooks, sink, DEFAULT_CAPACITY)
    }

    /// Create an interceptor retaining `capacity` records per context.
    #[must_use]
    pub fn with_capacity(
        router: Arc<ContextRouter>,
        hooks: Arc<HookConfigStore>,
        sink: Arc<dyn HookSink>,
        capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            hooks,
            sink,
            stats: Arc::new(ForwardStats::default()),
            buffers: Mutex::new(HashMap::new()),
            registered_sources: Mutex::new(HashSet::new()),
            capacity,
            runtime: Handle::try_current().ok(),
        })
    }

    /// Start capturing traffic for an attached context.
    ///
    /// Registers one completion and one error listener on the context's
    /// event source the first time that source is seen. Returns `false`
    /// when the source was already registered.
    ///
    /// # Errors
    /// Returns error if the context is not attached to the router.
    pub fn start_capturing(self: &Arc<Self>, context_id: &str) -> Result<bool, CaptureError> {
        let handle = self
            .router
            .get_handle(context_id)
            .ok_or_else(|| CaptureError::NotAttached(context_id.to_string()))?;

        let newly_registered = self
            .registered_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.event_source_id.clone());
        if !newly_registered {
            tracing::debug!(context_id, "event source already captured");
            return Ok(false);
        }

        handle
            .events
            .on_completed(self.listener(handle.event_source_id.clone()));
        handle
            .events
            .on_error(self.listener(handle.event_source_id.clone()));

        tracing::info!(
            context_id,
            event_source_id = %handle.event_source_id,
            "traffic capture started"
        );
        Ok(true)
    }

    fn listener(self: &Arc<Self>, source_id: String) -> EventListener {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |mut event: NetworkEvent| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            if event.event_source_id.is_empty() {
                event.event_source_id.clone_from(&source_id);
            }
            this.handle_event(event);
        })
    }

    /// Route, record and forward one network event.
    ///
    /// Events from sources no attached context owns are dropped silently.
    pub fn handle_event(&self, event: NetworkEvent) {
        let event = match event.normalize() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("dropping malformed network event: {e}");
                return;
            }
        };

        // Resolve under the buffer lock so a concurrent release cannot be
        // followed by a re-created buffer for a dead context.
        let record = {
            let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(context_id) = self.router.resolve_context(&event.event_source_id) else {
                tracing::trace!(event_source_id = %event.event_source_id, "unrouted event");
                return;
            };
            let record = TrafficRecord::from_event(context_id.clone(), event);
            buffers
                .entry(context_id)
                .or_insert_with(|| TrafficBuffer::new(self.capacity))
                .push(record.clone());
            record
        };

        self.forward(record);
    }

    /// Send a record to its hook target without waiting for the outcome.
    pub fn forward(&self, record: TrafficRecord) {
        let Some(url) = self.hooks.resolve_url(&record.context_id) else {
            self.stats.record_skipped();
            return;
        };

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::warn!("no async runtime available, dropping hook delivery to {url}");
            self.stats.record_failed();
            return;
        };

        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        runtime.spawn(async move {
            match sink.deliver(&url, &record).await {
                Ok(()) => stats.record_delivered(),
                Err(e) => {
                    tracing::warn!(context_id = %record.context_id, "hook delivery to {url} failed: {e}");
                    stats.record_failed();
                }
            }
        });
    }

    /// Records newer than `since` (epoch millis), keeping the last `limit`.
    ///
    /// Unknown contexts yield an empty list.
    #[must_use]
    pub fn get_traffic(&self, context_id: &str, since: i64, limit: usize) -> Vec<TrafficRecord> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context_id)
            .map(|buffer| buffer.tail_since(since, limit))
            .unwrap_or_default()
    }

    /// Drop a destroyed context's buffer.
    ///
    /// The event source stays registered: its listeners cannot be removed,
    /// so re-attaching it must not register a second pair. Once the router
    /// has detached the context, its events are no longer routed.
    pub fn release(&self, context_id: &str) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context_id);
        tracing::debug!(context_id, "traffic buffer released");
    }

    /// Forward outcome counters.
    #[must_use]
    pub fn forward_counts(&self) -> ForwardCounts {
        self.stats.counts()
    }
}
