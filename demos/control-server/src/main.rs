//! Standalone control server over an in-process demo host.
//!
//! Run with: `HIVE_CONTROL_API_KEY=secret cargo run -p control-server-demo`
//!
//! Scripts are not evaluated; each execution answers with a summary of the
//! code it received and emits one synthetic network event, so `/traffic`
//! and hook delivery can be exercised end to end.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context as _;
use async_trait::async_trait;
use hive_control_core::{
    ContextDescriptor, ContextDirectory, ContextHandle, ContextHost, DirectoryError, EventListener,
    HostError, NetworkEvent, NetworkEventSource,
};
use hive_control_transport::{ControlConfig, ControlPlane, ControlServer};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "HIVE_CONTROL_CONFIG";

/// Contexts to serve, read from the same file as the control config.
#[derive(Debug, Default, Deserialize)]
struct DemoContexts {
    #[serde(default)]
    contexts: Vec<ContextDescriptor>,
}

#[derive(Default)]
struct LocalEventSource {
    completed: Mutex<Vec<EventListener>>,
    errored: Mutex<Vec<EventListener>>,
}

impl LocalEventSource {
    fn emit(&self, event: &NetworkEvent) {
        let listeners = self
            .completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

impl NetworkEventSource for LocalEventSource {
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

struct DemoContext {
    url: String,
    source_id: String,
    events: Arc<LocalEventSource>,
}

struct DemoHost {
    contexts: HashMap<String, DemoContext>,
}

impl DemoHost {
    fn new(descriptors: &[ContextDescriptor]) -> Self {
        let contexts = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let context = DemoContext {
                    url: descriptor.url.clone(),
                    source_id: format!("demo-{}", index + 1),
                    events: Arc::new(LocalEventSource::default()),
                };
                (descriptor.id.clone(), context)
            })
            .collect();
        Self { contexts }
    }
}

#[async_trait]
impl ContextHost for DemoHost {
    async fn execute_script(
        &self,
        context_id: &str,
        code: &str,
        _deadline: Instant,
    ) -> Result<Value, HostError> {
        let context = self
            .contexts
            .get(context_id)
            .ok_or_else(|| HostError::ContextNotFound(context_id.to_string()))?;

        let mut event = NetworkEvent::completed(
            context.source_id.as_str(),
            "POST",
            format!("{}/__script", context.url.trim_end_matches('/')),
            200,
        );
        event.resource_type = "script".to_string();
        context.events.emit(&event);

        Ok(json!({ "contextId": context_id, "codeLength": code.len() }))
    }

    fn context_handle(&self, context_id: &str) -> Option<ContextHandle> {
        self.contexts.get(context_id).map(|context| {
            ContextHandle::new(
                context.source_id.as_str(),
                Arc::clone(&context.events) as Arc<dyn NetworkEventSource>,
            )
        })
    }
}

struct StaticDirectory(Vec<ContextDescriptor>);

#[async_trait]
impl ContextDirectory for StaticDirectory {
    async fn list_contexts(&self) -> Result<Vec<ContextDescriptor>, DirectoryError> {
        Ok(self.0.clone())
    }
}

fn load_config() -> anyhow::Result<(ControlConfig, Vec<ContextDescriptor>)> {
    let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let control = ControlConfig::load(path.as_deref())
        .with_context(|| format!("loading control config (${CONFIG_ENV})"))?;

    let mut demo = match &path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<DemoContexts>(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => DemoContexts::default(),
    };
    if demo.contexts.is_empty() {
        demo.contexts
            .push(ContextDescriptor::new("demo", "about:blank", "Demo"));
    }
    Ok((control, demo.contexts))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (config, contexts) = load_config()?;

    let host = Arc::new(DemoHost::new(&contexts));
    let directory = Arc::new(StaticDirectory(contexts.clone()));
    let plane = ControlPlane::builder(host, directory)
        .hooks(config.hooks)
        .build()?;

    for context in &contexts {
        plane.attach(&context.id)?;
    }

    let server = ControlServer::bind(&config.server, Arc::new(plane))
        .await
        .context("starting control API (set HIVE_CONTROL_API_KEY)")?;
    server.serve_with_shutdown(shutdown_signal()).await?;
    Ok(())
}
