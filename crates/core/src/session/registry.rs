//! Session registry: id allocation, lifecycle events, idle reaping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use grid_protocol::BrowserKind;
use grid_runtime::Supervise;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use super::client::SessionClient;
use crate::error::{GridError, Result};
use crate::events::{EventBus, names};
use crate::pool::PoolManager;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
	/// Idle time after which a session is force-closed by the reaper.
	pub max_idle: Duration,
	/// Period of the idle-session sweep.
	pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			max_idle: Duration::from_secs(30 * 60),
			sweep_interval: Duration::from_secs(5 * 60),
		}
	}
}

pub struct SessionRegistry<S: Supervise> {
	pool: Arc<PoolManager<S>>,
	bus: Arc<EventBus>,
	config: RegistryConfig,
	sessions: Mutex<HashMap<String, Arc<SessionClient>>>,
	seq: AtomicU64,
}

impl<S: Supervise> SessionRegistry<S> {
	pub fn new(pool: Arc<PoolManager<S>>, bus: Arc<EventBus>, config: RegistryConfig) -> Self {
		Self {
			pool,
			bus,
			config,
			sessions: Mutex::new(HashMap::new()),
			seq: AtomicU64::new(0),
		}
	}

	/// Acquires a container from the pool and attaches a session to it.
	///
	/// If the attach fails the container goes straight back to the pool;
	/// a half-attached session is never registered.
	pub async fn create_session(&self, kind: BrowserKind) -> Result<Arc<SessionClient>> {
		let container = self.pool.acquire(kind).await?;
		let session_id = self.next_session_id();

		let client = match SessionClient::attach(&session_id, container.clone()).await {
			Ok(client) => Arc::new(client),
			Err(err) => {
				self.pool.release(&container.id).await;
				return Err(err);
			}
		};

		self.sessions.lock().insert(session_id.clone(), Arc::clone(&client));
		info!(target = "grid.session", session = %session_id, container = %container.id, "session created");
		self.bus.publish(
			names::SESSION_STARTED,
			json!({
				"sessionId": session_id,
				"containerId": container.id,
				"browserType": kind.to_string(),
			}),
		);
		Ok(client)
	}

	pub fn get_session(&self, session_id: &str) -> Option<Arc<SessionClient>> {
		self.sessions.lock().get(session_id).cloned()
	}

	pub fn session_count(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Closes a session and returns its container to the pool.
	pub async fn end_session(&self, session_id: &str) -> Result<()> {
		let Some(client) = self.sessions.lock().remove(session_id) else {
			return Err(GridError::not_found("session", session_id));
		};

		client.close();
		self.pool.release(&client.container().id).await;
		info!(target = "grid.session", session = %session_id, "session ended");
		self.bus.publish(
			names::SESSION_COMPLETED,
			json!({
				"sessionId": session_id,
				"containerId": client.container().id,
			}),
		);
		Ok(())
	}

	/// Force-closes every session idle past the configured bound. One
	/// failing teardown does not stop the sweep.
	pub async fn reap_idle(&self) {
		let expired: Vec<String> = {
			let sessions = self.sessions.lock();
			sessions
				.iter()
				.filter(|(_, client)| client.idle_for() >= self.config.max_idle)
				.map(|(id, _)| id.clone())
				.collect()
		};

		if expired.is_empty() {
			return;
		}

		info!(target = "grid.session", count = expired.len(), "reaping idle sessions");
		for session_id in expired {
			if let Err(err) = self.end_session(&session_id).await {
				warn!(target = "grid.session", session = %session_id, error = %err, "idle session teardown failed");
			}
		}
	}

	/// Periodic idle sweep; spawn this once per registry instance.
	pub async fn run_reaper(self: Arc<Self>) {
		let mut ticker = tokio::time::interval(self.config.sweep_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			self.reap_idle().await;
		}
	}

	/// Closes all sessions and releases their containers. Used on shutdown.
	pub async fn drain(&self) {
		let all: Vec<(String, Arc<SessionClient>)> = {
			let mut sessions = self.sessions.lock();
			sessions.drain().collect()
		};

		info!(target = "grid.session", count = all.len(), "draining sessions");
		for (session_id, client) in all {
			client.close();
			self.pool.release(&client.container().id).await;
			self.bus.publish(
				names::SESSION_COMPLETED,
				json!({
					"sessionId": session_id,
					"containerId": client.container().id,
				}),
			);
		}
	}

	fn next_session_id(&self) -> String {
		let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default();
		let seq = self.seq.fetch_add(1, Ordering::Relaxed);
		format!("session-{millis}-{seq:04}")
	}
}
