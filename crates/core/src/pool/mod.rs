//! Container pool: ownership sets, acquire/release policy, reaping.

mod manager;
mod metrics;

pub use manager::{PoolConfig, PoolManager};
pub use metrics::PoolMetrics;
