//! Network event schema and captured traffic records.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current version of the network event schema.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Status code reserved for transport-level failures.
pub const TRANSPORT_ERROR_STATUS: i32 = -1;

const fn default_schema_version() -> u32 {
    EVENT_SCHEMA_VERSION
}

/// Which listener an event was delivered to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The request completed, whatever its status code.
    #[default]
    Completed,
    /// The request failed before a response arrived.
    Failed,
}

/// Event schema error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Unsupported event schema version: {0}")]
    UnsupportedVersion(u32),
    #[error("Event has no URL")]
    MissingUrl,
}

/// Network event as emitted by a context host.
///
/// Hosts may deserialize this straight from their own JSON payloads; all
/// fields except `url` are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkEvent {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub kind: EventKind,
    /// Host id of the emitting source. Filled in by the listener when empty.
    pub event_source_id: String,
    pub method: String,
    pub url: String,
    pub status_code: Option<i32>,
    pub resource_type: String,
    #[serde(deserialize_with = "header_map")]
    pub request_headers: BTreeMap<String, String>,
    #[serde(deserialize_with = "header_map")]
    pub response_headers: BTreeMap<String, String>,
    pub from_cache: bool,
    pub error: Option<String>,
}

impl NetworkEvent {
    #[must_use]
    pub fn completed(
        event_source_id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        status_code: i32,
    ) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            kind: EventKind::Completed,
            event_source_id: event_source_id.into(),
            method: method.into(),
            url: url.into(),
            status_code: Some(status_code),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(
        event_source_id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            kind: EventKind::Failed,
            event_source_id: event_source_id.into(),
            method: method.into(),
            url: url.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Validate and normalize an event before it becomes a record.
    ///
    /// # Errors
    /// Returns error for an unknown schema version or an empty URL.
    pub fn normalize(mut self) -> Result<Self, EventError> {
        if self.schema_version != EVENT_SCHEMA_VERSION {
            return Err(EventError::UnsupportedVersion(self.schema_version));
        }
        if self.url.trim().is_empty() {
            return Err(EventError::MissingUrl);
        }

        self.method = if self.method.trim().is_empty() {
            "GET".to_string()
        } else {
            self.method.trim().to_ascii_uppercase()
        };

        if self.kind == EventKind::Failed || self.error.is_some() {
            self.kind = EventKind::Failed;
            self.status_code = Some(TRANSPORT_ERROR_STATUS);
            if self.error.is_none() {
                self.error = Some("request failed".to_string());
            }
        }

        if self.resource_type.is_empty() {
            self.resource_type = "other".to_string();
        }

        Ok(self)
    }
}

/// Headers arrive either as `name: value` or `name: [values]`.
fn header_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HeaderValue {
        One(String),
        Many(Vec<String>),
    }

    let raw = Option::<BTreeMap<String, HeaderValue>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                HeaderValue::One(v) => v,
                HeaderValue::Many(vs) => vs.join(", "),
            };
            (name, value)
        })
        .collect())
}

/// One observed network exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRecord {
    pub id: String,
    pub context_id: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub method: String,
    pub url: String,
    pub status_code: i32,
    pub resource_type: String,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    pub from_cache: bool,
    pub error: Option<String>,
}

impl TrafficRecord {
    /// Build a record from a normalized event, stamped with the current time.
    #[must_use]
    pub fn from_event(context_id: impl Into<String>, event: NetworkEvent) -> Self {
        Self::from_event_at(context_id, event, chrono::Utc::now().timestamp_millis())
    }

    /// Build a record with an explicit timestamp.
    #[must_use]
    pub fn from_event_at(context_id: impl Into<String>, event: NetworkEvent, timestamp: i64) -> Self {
        let tie_breaker = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{timestamp}-{}", &tie_breaker[..8]),
            context_id: context_id.into(),
            timestamp,
            method: event.method,
            url: event.url,
            status_code: event.status_code.unwrap_or(0),
            resource_type: event.resource_type,
            request_headers: event.request_headers,
            response_headers: event.response_headers,
            from_cache: event.from_cache,
            error: event.error,
        }
    }
}
