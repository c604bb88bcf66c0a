//! Wire types for the browsergrid protocol surfaces.
//!
//! This crate contains the serde-serializable types used on the wire:
//! Chrome DevTools Protocol message envelopes, the `/json/version`
//! readiness payload, and the node HTTP surface shapes consumed by the
//! load balancer and session-creation callers.
//!
//! Types in this crate are pure data. The session client in `grid-core`
//! is a protocol *client*, not a protocol definer: envelope shapes must
//! match what a real browser emits bit for bit.

pub mod cdp;
pub mod node;
pub mod version;

pub use cdp::*;
pub use node::*;
pub use version::*;
