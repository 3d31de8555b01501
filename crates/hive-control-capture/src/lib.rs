//! Traffic capture for the hive control plane.
//!
//! Provides:
//! - `HookConfigStore` - Global and per-context webhook targets
//! - `HookSink` / `HttpHookSink` - Outbound delivery of captured records
//! - `TrafficInterceptor` - Listener registration, buffering and forwarding

pub mod forward;
pub mod hooks;
pub mod interceptor;

pub use forward::{ForwardCounts, ForwardError, ForwardStats, HookSink, HttpHookSink};
pub use hooks::{HookConfig, HookConfigStore, HookConfigUpdate};
pub use interceptor::{CaptureError, TrafficInterceptor};
