//! Session layer: per-container command surface plus the registry that
//! tracks live sessions and reaps idle ones.

mod client;
mod registry;

pub use client::SessionClient;
pub use registry::{RegistryConfig, SessionRegistry};
