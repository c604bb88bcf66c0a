//! Browser container lifecycle and debugging-endpoint plumbing.
//!
//! This crate owns the process-level concerns the orchestration engine in
//! `grid-core` builds on: spawning and destroying browser containers with
//! per-kind resource caps, probing their debugging endpoints for readiness,
//! and the WebSocket CDP connection with request/response correlation.

pub mod connection;
pub mod error;
pub mod probe;
pub mod process;
pub mod supervisor;

pub use connection::CdpConnection;
pub use error::{Result, RuntimeError};
pub use supervisor::{Container, ContainerSupervisor, Supervise};
