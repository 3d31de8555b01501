//! Context routing for the hive control plane.
//!
//! Provides:
//! - `ContextRouter` - Maps event sources to logical contexts and contexts to handles

pub mod router;

pub use router::{Attachment, ContextRouter, RouterError};
