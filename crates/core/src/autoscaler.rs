//! Utilization-driven autoscaler for the container pool.
//!
//! Scaling is advisory and best-effort: the scaler asks the pool to grow
//! or shrink by a bounded step, accepts partial results, and arms a
//! cooldown so one burst cannot thrash capacity. Disabled by default.

use std::sync::Arc;
use std::time::{Duration, Instant};

use grid_runtime::Supervise;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::pool::PoolManager;

#[derive(Debug, Clone)]
pub struct AutoScalerConfig {
	pub enabled: bool,
	/// Capacity floor; scale-down never goes below it.
	pub min_containers: usize,
	/// Capacity ceiling; scale-up never exceeds it.
	pub max_containers: usize,
	/// Utilization percentage at or above which the pool grows.
	pub scale_up_threshold: f64,
	/// Utilization percentage at or below which the pool shrinks.
	pub scale_down_threshold: f64,
	pub cooldown: Duration,
	/// Period of the evaluation loop.
	pub eval_interval: Duration,
}

impl Default for AutoScalerConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			min_containers: 5,
			max_containers: 50,
			scale_up_threshold: 80.0,
			scale_down_threshold: 30.0,
			cooldown: Duration::from_secs(300),
			eval_interval: Duration::from_secs(60),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleAction {
	ScaleUp,
	ScaleDown,
	None,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDecision {
	pub action: ScaleAction,
	pub current_size: usize,
	pub target_size: usize,
	pub utilization: f64,
	pub reason: String,
}

impl ScalingDecision {
	fn hold(current_size: usize, utilization: f64, reason: impl Into<String>) -> Self {
		Self {
			action: ScaleAction::None,
			current_size,
			target_size: current_size,
			utilization,
			reason: reason.into(),
		}
	}
}

/// Operator-facing snapshot of the scaler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalerStatus {
	pub enabled: bool,
	pub min_containers: usize,
	pub max_containers: usize,
	pub scale_up_threshold: f64,
	pub scale_down_threshold: f64,
	pub current_size: usize,
	pub utilization: f64,
	pub cooling_down: bool,
}

pub struct AutoScaler<S: Supervise> {
	pool: Arc<PoolManager<S>>,
	config: AutoScalerConfig,
	last_scale: Mutex<Option<Instant>>,
}

impl<S: Supervise> AutoScaler<S> {
	pub fn new(pool: Arc<PoolManager<S>>, config: AutoScalerConfig) -> Self {
		Self {
			pool,
			config,
			last_scale: Mutex::new(None),
		}
	}

	pub fn config(&self) -> &AutoScalerConfig {
		&self.config
	}

	/// Utilization of the pool as a percentage of its live size.
	fn utilization(&self) -> (usize, usize, f64) {
		let current = self.pool.current_size();
		let active = self.pool.active_count();
		let utilization = if current == 0 { 0.0 } else { active as f64 / current as f64 * 100.0 };
		(current, active, utilization)
	}

	/// Runs one evaluation pass and applies the resulting action.
	///
	/// The step size is 20% of current capacity, rounded up, clamped to the
	/// configured bounds. The cooldown arms only when an action was taken,
	/// so consecutive hold decisions never delay a needed scale.
	pub async fn evaluate(&self) -> ScalingDecision {
		let (current, active, utilization) = self.utilization();

		if !self.config.enabled {
			return ScalingDecision::hold(current, utilization, "autoscaling disabled");
		}

		if let Some(last) = *self.last_scale.lock() {
			let since = last.elapsed();
			if since < self.config.cooldown {
				let remaining = (self.config.cooldown - since).as_secs();
				return ScalingDecision::hold(current, utilization, format!("cooling down, {remaining}s remaining"));
			}
		}

		let step = ((current as f64 * 0.2).ceil() as usize).max(1);

		let decision = if utilization >= self.config.scale_up_threshold && current < self.config.max_containers {
			let target = (current + step).min(self.config.max_containers);
			let added = self.pool.scale_up(target - current).await;
			ScalingDecision {
				action: ScaleAction::ScaleUp,
				current_size: current,
				target_size: current + added,
				utilization,
				reason: format!("utilization {utilization:.1}% >= {:.1}%, added {added}", self.config.scale_up_threshold),
			}
		} else if utilization <= self.config.scale_down_threshold && current > self.config.min_containers {
			let target = current.saturating_sub(step).max(self.config.min_containers);
			let removed = self.pool.scale_down(current - target).await;
			ScalingDecision {
				action: ScaleAction::ScaleDown,
				current_size: current,
				target_size: current - removed,
				utilization,
				reason: format!("utilization {utilization:.1}% <= {:.1}%, removed {removed}", self.config.scale_down_threshold),
			}
		} else {
			debug!(target = "grid.autoscaler", active, current, utilization, "holding");
			return ScalingDecision::hold(current, utilization, format!("utilization {utilization:.1}% within thresholds"));
		};

		*self.last_scale.lock() = Some(Instant::now());
		info!(
			target = "grid.autoscaler",
			action = ?decision.action,
			from = decision.current_size,
			to = decision.target_size,
			reason = %decision.reason,
			"scaled pool"
		);
		decision
	}

	pub fn status(&self) -> AutoScalerStatus {
		let (current, _, utilization) = self.utilization();
		let cooling_down = self.last_scale.lock().is_some_and(|last| last.elapsed() < self.config.cooldown);
		AutoScalerStatus {
			enabled: self.config.enabled,
			min_containers: self.config.min_containers,
			max_containers: self.config.max_containers,
			scale_up_threshold: self.config.scale_up_threshold,
			scale_down_threshold: self.config.scale_down_threshold,
			current_size: current,
			utilization,
			cooling_down,
		}
	}

	/// Periodic evaluation loop; spawn this once per scaler instance.
	pub async fn run(self: Arc<Self>) {
		let mut ticker = tokio::time::interval(self.config.eval_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			self.evaluate().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::SystemTime;

	use async_trait::async_trait;
	use grid_protocol::BrowserKind;
	use grid_runtime::Container;

	use super::*;
	use crate::pool::PoolConfig;

	#[derive(Default)]
	struct CountingSupervisor {
		created: AtomicUsize,
	}

	#[async_trait]
	impl Supervise for CountingSupervisor {
		async fn create(&self, kind: BrowserKind, prewarm: bool) -> grid_runtime::Result<Container> {
			let n = self.created.fetch_add(1, Ordering::SeqCst);
			Ok(Container {
				id: format!("scaled-{n}"),
				kind,
				host: "127.0.0.1".to_string(),
				port: 9200 + n as u16,
				pid: 2000 + n as u32,
				prewarmed: prewarm,
				created_at: SystemTime::now(),
			})
		}

		async fn destroy(&self, _container: &Container) -> grid_runtime::Result<()> {
			Ok(())
		}

		async fn probe(&self, _container: &Container) -> bool {
			true
		}
	}

	fn pool() -> Arc<PoolManager<CountingSupervisor>> {
		Arc::new(PoolManager::new(Arc::new(CountingSupervisor::default()), PoolConfig::default()))
	}

	fn enabled_config() -> AutoScalerConfig {
		AutoScalerConfig {
			enabled: true,
			min_containers: 2,
			max_containers: 20,
			..AutoScalerConfig::default()
		}
	}

	#[tokio::test]
	async fn disabled_scaler_never_acts() {
		let pool = pool();
		let scaler = AutoScaler::new(Arc::clone(&pool), AutoScalerConfig::default());

		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::None);
		assert_eq!(decision.reason, "autoscaling disabled");
		assert_eq!(pool.current_size(), 0);
	}

	#[tokio::test]
	async fn high_utilization_grows_by_a_fifth_rounded_up() {
		let pool = pool();
		// Every container active: utilization 100%.
		for _ in 0..6 {
			pool.acquire(BrowserKind::Chrome).await.unwrap();
		}
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::ScaleUp);
		assert_eq!(decision.current_size, 6);
		// ceil(6 * 0.2) = 2
		assert_eq!(decision.target_size, 8);
		assert_eq!(pool.current_size(), 8);
	}

	#[tokio::test]
	async fn scale_up_is_clamped_to_max() {
		let pool = pool();
		for _ in 0..6 {
			pool.acquire(BrowserKind::Chrome).await.unwrap();
		}
		let scaler = AutoScaler::new(
			Arc::clone(&pool),
			AutoScalerConfig {
				max_containers: 7,
				..enabled_config()
			},
		);

		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::ScaleUp);
		assert_eq!(decision.target_size, 7);
	}

	#[tokio::test]
	async fn low_utilization_shrinks_toward_min() {
		let pool = pool();
		pool.scale_up(6).await;
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		// Nothing active: utilization 0%.
		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::ScaleDown);
		assert_eq!(decision.target_size, 4);
		assert_eq!(pool.current_size(), 4);
	}

	#[tokio::test]
	async fn scale_down_never_goes_below_min() {
		let pool = pool();
		pool.scale_up(3).await;
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::ScaleDown);
		assert_eq!(decision.target_size, 2);

		// Already at the floor: holds instead of shrinking further.
		*scaler.last_scale.lock() = None;
		let next = scaler.evaluate().await;
		assert_eq!(next.action, ScaleAction::None);
		assert_eq!(pool.current_size(), 2);
	}

	#[tokio::test]
	async fn status_reflects_config_and_cooldown() {
		let pool = pool();
		for _ in 0..6 {
			pool.acquire(BrowserKind::Chrome).await.unwrap();
		}
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		let before = scaler.status();
		assert!(before.enabled);
		assert!(!before.cooling_down);
		assert_eq!(before.utilization, 100.0);

		scaler.evaluate().await;
		let after = scaler.status();
		assert!(after.cooling_down);
		assert_eq!(after.current_size, 8);
	}

	#[tokio::test]
	async fn cooldown_blocks_back_to_back_actions() {
		let pool = pool();
		for _ in 0..6 {
			pool.acquire(BrowserKind::Chrome).await.unwrap();
		}
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		let first = scaler.evaluate().await;
		assert_eq!(first.action, ScaleAction::ScaleUp);

		let second = scaler.evaluate().await;
		assert_eq!(second.action, ScaleAction::None);
		assert!(second.reason.starts_with("cooling down"));
		assert_eq!(pool.current_size(), first.target_size);
	}

	#[tokio::test]
	async fn mid_band_utilization_holds_without_arming_cooldown() {
		let pool = pool();
		pool.scale_up(4).await;
		// 2 of 4 active: 50%, between both thresholds.
		pool.acquire(BrowserKind::Chrome).await.unwrap();
		pool.acquire(BrowserKind::Chrome).await.unwrap();
		let scaler = AutoScaler::new(Arc::clone(&pool), enabled_config());

		let decision = scaler.evaluate().await;
		assert_eq!(decision.action, ScaleAction::None);
		assert!(scaler.last_scale.lock().is_none());
	}
}
