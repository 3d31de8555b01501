//! Outbound delivery of captured records to webhook targets.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use hive_control_core::TrafficRecord;
use thiserror::Error;

/// Per-delivery timeout for [`HttpHookSink`].
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Hook delivery error. Never surfaced past the interceptor.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Hook transport error: {0}")]
    Transport(String),
    #[error("Hook responded with status {0}")]
    Status(u16),
    #[error("Hook client error: {0}")]
    Client(String),
}

/// Destination for forwarded traffic records.
#[async_trait]
pub trait HookSink: Send + Sync {
    /// Deliver one record to `url`.
    async fn deliver(&self, url: &str, record: &TrafficRecord) -> Result<(), ForwardError>;
}

/// Delivers records as JSON `POST` requests.
#[derive(Debug, Clone)]
pub struct HttpHookSink {
    client: reqwest::Client,
}

impl HttpHookSink {
    /// Create a sink with the default delivery timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HookSink for HttpHookSink {
    async fn deliver(&self, url: &str, record: &TrafficRecord) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ForwardError::Status(status.as_u16()))
        }
    }
}

/// Counters for forward outcomes.
#[derive(Debug, Default)]
pub struct ForwardStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`ForwardStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardCounts {
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl ForwardStats {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    #[must_use]
    pub fn counts(&self) -> ForwardCounts {
        ForwardCounts {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use hive_control_core::NetworkEvent;
    use tokio::sync::mpsc;

    use super::*;

    fn record() -> TrafficRecord {
        let event = NetworkEvent::completed("src", "GET", "https://example.com", 200)
            .normalize()
            .unwrap();
        TrafficRecord::from_event_at("c1", event, 1_000)
    }

    async fn spawn_receiver(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<serde_json::Value>>,
                          Json(body): Json<serde_json::Value>| async move {
                        let _ = tx.send(body);
                        status
                    },
                ),
            )
            .with_state(tx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, rx)
    }

    #[tokio::test]
    async fn test_http_sink_posts_json_record() {
        let (addr, mut rx) = spawn_receiver(StatusCode::OK).await;
        let sink = HttpHookSink::new().unwrap();

        sink.deliver(&format!("http://{addr}/hook"), &record())
            .await
            .unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["contextId"], "c1");
        assert_eq!(body["url"], "https://example.com");
        assert_eq!(body["timestamp"], 1_000);
    }

    #[tokio::test]
    async fn test_http_sink_reports_non_success_status() {
        let (addr, _rx) = spawn_receiver(StatusCode::BAD_GATEWAY).await;
        let sink = HttpHookSink::new().unwrap();

        let err = sink
            .deliver(&format!("http://{addr}/hook"), &record())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Status(502)));
    }

    #[tokio::test]
    async fn test_http_sink_reports_bad_url() {
        let sink = HttpHookSink::new().unwrap();
        let err = sink.deliver("not a url", &record()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Transport(_)));
    }
}
