//! Core abstractions for the hive local control plane.
//!
//! This crate provides the fundamental building blocks:
//! - `TrafficBuffer` - Bounded per-context traffic history
//! - `NetworkEvent` / `TrafficRecord` - Versioned event schema and captured records
//! - `ContextHandle` / `ContextDescriptor` - What the host and directory hand out
//! - Collaborator traits for the context host, directory and event sources

pub mod context;
pub mod ring_buffer;
pub mod traffic;
pub mod traits;

#[cfg(feature = "testing")]
pub mod testing;

pub use context::{ContextDescriptor, ContextHandle, ContextId};
pub use ring_buffer::{DEFAULT_CAPACITY, TrafficBuffer};
pub use traffic::{
    EVENT_SCHEMA_VERSION, EventError, EventKind, NetworkEvent, TRANSPORT_ERROR_STATUS, TrafficRecord,
};
pub use traits::{
    ContextDirectory, ContextHost, DirectoryError, EventListener, HostError, NetworkEventSource,
};
