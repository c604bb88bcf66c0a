//! Orchestration engine for a fleet of ephemeral, remotely-debuggable
//! browser containers.
//!
//! The pieces, leaves first: the pool manager owns the available/active
//! sets on top of a [`grid_runtime::Supervise`] implementation; the session
//! layer wraps an acquired container's CDP connection into session-scoped
//! commands; the load balancer routes session requests across nodes; the
//! autoscaler nudges pool capacity from utilization; and the resource
//! allocator reacts to billing lifecycle events on the event bus.
//!
//! Nothing here is ambient or global: every component is an explicit
//! instance handed to its consumers.

pub mod allocator;
pub mod audit;
pub mod autoscaler;
pub mod balancer;
pub mod error;
pub mod events;
pub mod plans;
pub mod pool;
pub mod session;

pub use error::{GridError, Result};
