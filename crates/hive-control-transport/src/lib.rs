//! Control plane composition and local HTTP API.
//!
//! Provides:
//! - `ControlPlane` - Service object wiring router, capture and executor
//! - Configuration loading (file + environment)
//! - Wire protocol for the HTTP API
//! - `ControlServer` - API-key gated axum server

pub mod config;
pub mod plane;
pub mod protocol;
pub mod server;

pub use config::{ConfigError, ControlConfig, ServerConfig};
pub use plane::{ControlPlane, ControlPlaneBuilder, PlaneError};
pub use protocol::{API_KEY_HEADER, ApiError, WorkspaceEntry};
pub use server::{ControlServer, ServerError, build_router};
