//! Pool manager owning the available/active container sets.
//!
//! State machine per container: `starting → available ⇄ active →
//! (available | destroyed)`. The three sets are guarded by one mutex, so a
//! container is visible in exactly one set at any observable instant and
//! an acquire's remove-and-insert is a single atomic transition. The lock
//! is never held across an await: destroys happen after the bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use grid_protocol::BrowserKind;
use grid_runtime::{Container, RuntimeError, Supervise};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::metrics::{Counters, PoolMetrics};
use crate::error::{GridError, Result};

#[derive(Debug, Clone)]
pub struct PoolConfig {
	/// Upper bound on the `available` set; releases past it destroy.
	pub capacity: usize,
	/// Containers created up front by `initialize`.
	pub prewarm_count: usize,
	/// Browser kind used for pre-warmed containers.
	pub prewarm_kind: BrowserKind,
	/// Period of the idle-container reaper.
	pub reap_interval: Duration,
	/// Idle time after which an available container is destroyed.
	pub max_idle: Duration,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			capacity: 10,
			prewarm_count: 5,
			prewarm_kind: BrowserKind::Chrome,
			reap_interval: Duration::from_secs(60),
			max_idle: Duration::from_secs(300),
		}
	}
}

struct PooledContainer {
	container: Container,
	last_used: Instant,
}

#[derive(Default)]
struct PoolState {
	available: HashMap<String, PooledContainer>,
	active: HashMap<String, PooledContainer>,
	/// Creations in flight; such containers have no id yet.
	starting: usize,
	counters: Counters,
}

pub struct PoolManager<S: Supervise> {
	supervisor: Arc<S>,
	config: PoolConfig,
	state: Mutex<PoolState>,
}

impl<S: Supervise> PoolManager<S> {
	pub fn new(supervisor: Arc<S>, config: PoolConfig) -> Self {
		Self {
			supervisor,
			config,
			state: Mutex::new(PoolState::default()),
		}
	}

	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// Pre-warms the configured number of containers in parallel. Slot
	/// failures are independent: one failed pre-warm does not abort the
	/// rest.
	pub async fn initialize(&self) -> usize {
		let warmed = self.spawn_spares(self.config.prewarm_count, self.config.prewarm_kind).await;
		info!(
			target = "grid.pool",
			requested = self.config.prewarm_count,
			warmed,
			"pool initialized"
		);
		warmed
	}

	/// Acquires a container of `kind`, preferring the available set.
	///
	/// Creation failure propagates to the caller; retries, if any, belong
	/// there.
	pub async fn acquire(&self, kind: BrowserKind) -> Result<Container> {
		{
			let mut state = self.state.lock();
			let hit = state
				.available
				.iter()
				.find(|(_, pooled)| pooled.container.kind == kind)
				.map(|(id, _)| id.clone());
			// The id was found under this same lock, so the remove always
			// succeeds; a None simply falls through to the miss path.
			if let Some(mut pooled) = hit.and_then(|id| state.available.remove(&id)) {
				pooled.last_used = Instant::now();
				let container = pooled.container.clone();
				state.active.insert(container.id.clone(), pooled);
				state.counters.pool_hits += 1;
				state.counters.total_reused += 1;
				debug!(target = "grid.pool", container = %container.id, %kind, "pool hit");
				return Ok(container);
			}
			state.counters.pool_misses += 1;
			state.starting += 1;
		}

		debug!(target = "grid.pool", %kind, "pool miss, creating container");
		let started = Instant::now();
		match self.supervisor.create(kind, false).await {
			Ok(container) => {
				let mut state = self.state.lock();
				state.starting -= 1;
				state.counters.record_startup(started.elapsed().as_millis() as f64);
				state.active.insert(
					container.id.clone(),
					PooledContainer {
						container: container.clone(),
						last_used: Instant::now(),
					},
				);
				Ok(container)
			}
			Err(err) => {
				self.state.lock().starting -= 1;
				Err(creation_error(err))
			}
		}
	}

	/// Returns a container to the pool, or destroys it when the available
	/// set is at capacity. Releasing an id that is not active is a no-op
	/// returning `false`.
	pub async fn release(&self, container_id: &str) -> bool {
		let to_destroy = {
			let mut state = self.state.lock();
			let Some(mut pooled) = state.active.remove(container_id) else {
				debug!(target = "grid.pool", container = %container_id, "release of non-active container ignored");
				return false;
			};

			// Capacity is checked at the moment of release; brief overshoot
			// under concurrent releases is bounded by the in-flight count.
			if state.available.len() < self.config.capacity {
				pooled.last_used = Instant::now();
				state.available.insert(container_id.to_string(), pooled);
				None
			} else {
				Some(pooled.container)
			}
		};

		match to_destroy {
			None => {
				debug!(target = "grid.pool", container = %container_id, "container returned to pool");
			}
			Some(container) => {
				debug!(target = "grid.pool", container = %container.id, "pool at capacity, destroying container");
				if let Err(err) = self.supervisor.destroy(&container).await {
					warn!(target = "grid.pool", container = %container.id, error = %err, "destroy on release failed");
				}
			}
		}
		true
	}

	/// Destroys available containers idle past the configured bound.
	pub async fn reap(&self) {
		let expired: Vec<Container> = {
			let mut state = self.state.lock();
			let idle_ids: Vec<String> = state
				.available
				.iter()
				.filter(|(_, pooled)| pooled.last_used.elapsed() >= self.config.max_idle)
				.map(|(id, _)| id.clone())
				.collect();
			idle_ids
				.into_iter()
				.filter_map(|id| state.available.remove(&id))
				.map(|pooled| pooled.container)
				.collect()
		};

		if expired.is_empty() {
			return;
		}

		info!(target = "grid.pool", count = expired.len(), "reaping idle containers");
		for container in expired {
			if let Err(err) = self.supervisor.destroy(&container).await {
				warn!(target = "grid.pool", container = %container.id, error = %err, "reap destroy failed");
			}
		}
	}

	/// Periodic reap loop; spawn this once per pool instance.
	pub async fn run_reaper(self: Arc<Self>) {
		let mut ticker = tokio::time::interval(self.config.reap_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			self.reap().await;
		}
	}

	/// Creates `count` spare containers into the available set; partial
	/// success commits. Returns the number actually created.
	pub async fn scale_up(&self, count: usize) -> usize {
		self.spawn_spares(count, self.config.prewarm_kind).await
	}

	/// Destroys up to `count` available containers. Returns the number
	/// actually destroyed.
	pub async fn scale_down(&self, count: usize) -> usize {
		let victims: Vec<Container> = {
			let mut state = self.state.lock();
			let ids: Vec<String> = state.available.keys().take(count).cloned().collect();
			ids.into_iter()
				.filter_map(|id| state.available.remove(&id))
				.map(|pooled| pooled.container)
				.collect()
		};

		let mut destroyed = 0;
		for container in victims {
			match self.supervisor.destroy(&container).await {
				Ok(()) => destroyed += 1,
				Err(err) => {
					warn!(target = "grid.pool", container = %container.id, error = %err, "scale-down destroy failed");
				}
			}
		}
		destroyed
	}

	/// Live containers across all three sets.
	pub fn current_size(&self) -> usize {
		let state = self.state.lock();
		state.available.len() + state.active.len() + state.starting
	}

	pub fn active_count(&self) -> usize {
		self.state.lock().active.len()
	}

	pub fn metrics(&self) -> PoolMetrics {
		let state = self.state.lock();
		PoolMetrics {
			available_containers: state.available.len(),
			active_containers: state.active.len(),
			starting_containers: state.starting,
			total_created: state.counters.total_created,
			total_reused: state.counters.total_reused,
			pool_hits: state.counters.pool_hits,
			pool_misses: state.counters.pool_misses,
			avg_startup_ms: state.counters.avg_startup_ms,
			pool_efficiency: state.counters.efficiency(),
		}
	}

	/// Destroys every live container. Used on shutdown.
	pub async fn drain(&self) {
		let all: Vec<Container> = {
			let mut state = self.state.lock();
			let available = std::mem::take(&mut state.available);
			let active = std::mem::take(&mut state.active);
			available.into_values().chain(active.into_values()).map(|pooled| pooled.container).collect()
		};

		info!(target = "grid.pool", count = all.len(), "draining pool");
		let results = join_all(all.iter().map(|container| self.supervisor.destroy(container))).await;
		for (container, result) in all.iter().zip(results) {
			if let Err(err) = result {
				warn!(target = "grid.pool", container = %container.id, error = %err, "drain destroy failed");
			}
		}
	}

	async fn spawn_spares(&self, count: usize, kind: BrowserKind) -> usize {
		{
			let mut state = self.state.lock();
			state.starting += count;
		}

		let outcomes = join_all((0..count).map(|slot| {
			let supervisor = Arc::clone(&self.supervisor);
			async move {
				let started = Instant::now();
				let result = supervisor.create(kind, true).await;
				(slot, started, result)
			}
		}))
		.await;

		let mut created = 0;
		for (slot, started, result) in outcomes {
			let mut state = self.state.lock();
			state.starting -= 1;
			match result {
				Ok(container) => {
					state.counters.record_startup(started.elapsed().as_millis() as f64);
					state.available.insert(
						container.id.clone(),
						PooledContainer {
							container,
							last_used: Instant::now(),
						},
					);
					created += 1;
				}
				Err(err) => {
					warn!(target = "grid.pool", slot, error = %err, "spare container creation failed");
				}
			}
		}
		created
	}

	#[cfg(test)]
	fn set_ids(&self) -> (Vec<String>, Vec<String>) {
		let state = self.state.lock();
		let mut available: Vec<String> = state.available.keys().cloned().collect();
		let mut active: Vec<String> = state.active.keys().cloned().collect();
		available.sort();
		active.sort();
		(available, active)
	}
}

fn creation_error(err: RuntimeError) -> GridError {
	match err {
		RuntimeError::CreationFailed(detail) => GridError::CreationFailed(detail),
		other => GridError::Runtime(other),
	}
}
