//! Derived pool metrics, recomputed on read.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of pool state and cumulative counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
	pub available_containers: usize,
	pub active_containers: usize,
	pub starting_containers: usize,
	pub total_created: u64,
	pub total_reused: u64,
	pub pool_hits: u64,
	pub pool_misses: u64,
	/// Exponentially smoothed container startup latency.
	pub avg_startup_ms: f64,
	/// Hit ratio as a percentage; 0 before any acquisition.
	pub pool_efficiency: f64,
}

#[derive(Debug, Default)]
pub(super) struct Counters {
	pub total_created: u64,
	pub total_reused: u64,
	pub pool_hits: u64,
	pub pool_misses: u64,
	pub avg_startup_ms: f64,
}

impl Counters {
	const STARTUP_EMA_ALPHA: f64 = 0.1;

	pub fn record_startup(&mut self, elapsed_ms: f64) {
		if self.total_created == 0 {
			self.avg_startup_ms = elapsed_ms;
		} else {
			self.avg_startup_ms = self.avg_startup_ms * (1.0 - Self::STARTUP_EMA_ALPHA) + elapsed_ms * Self::STARTUP_EMA_ALPHA;
		}
		self.total_created += 1;
	}

	pub fn efficiency(&self) -> f64 {
		let total = self.pool_hits + self.pool_misses;
		if total == 0 {
			0.0
		} else {
			self.pool_hits as f64 / total as f64 * 100.0
		}
	}
}
