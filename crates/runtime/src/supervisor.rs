//! Browser container supervision: create, probe, destroy.
//!
//! A "container" here is one isolated browser process with its own profile
//! directory and an externally-reachable debugging port. Creation blocks on
//! a readiness probe with a bounded timeout; a container whose endpoint has
//! not answered by the deadline is still returned as usable, because the
//! endpoint frequently comes up moments later. Callers that need certainty
//! use `probe`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use grid_protocol::BrowserKind;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::probe;
use crate::process::{allocate_port, pid_is_alive};

const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// One live browser container.
#[derive(Debug, Clone)]
pub struct Container {
	pub id: String,
	pub kind: BrowserKind,
	pub host: String,
	pub port: u16,
	pub pid: u32,
	pub prewarmed: bool,
	pub created_at: SystemTime,
}

impl Container {
	/// HTTP debugging endpoint, e.g. `http://127.0.0.1:41733`.
	pub fn cdp_url(&self) -> String {
		format!("http://{}:{}", self.host, self.port)
	}

	/// Browser-level WebSocket endpoint prefix.
	pub fn ws_endpoint(&self) -> String {
		format!("ws://{}:{}/devtools/browser", self.host, self.port)
	}
}

/// Host resource caps applied per browser kind.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCaps {
	pub memory_mb: u64,
	pub cpu_quota: f64,
}

impl ResourceCaps {
	pub fn for_kind(kind: BrowserKind) -> Self {
		match kind {
			BrowserKind::Chrome => Self { memory_mb: 256, cpu_quota: 0.5 },
			BrowserKind::Firefox => Self { memory_mb: 384, cpu_quota: 0.5 },
		}
	}
}

/// Container lifecycle primitives the pool manager is built on.
#[async_trait]
pub trait Supervise: Send + Sync {
	/// Starts a container and waits (bounded) for its debugging endpoint.
	async fn create(&self, kind: BrowserKind, prewarm: bool) -> Result<Container>;

	/// Stops and removes a container. Idempotent: destroying an
	/// already-gone container is not an error.
	async fn destroy(&self, container: &Container) -> Result<()>;

	/// Single bounded health check. Never errors.
	async fn probe(&self, container: &Container) -> bool;
}

/// Process-backed supervisor spawning real browsers.
pub struct ContainerSupervisor {
	host: String,
	data_root: PathBuf,
	seq: AtomicU64,
	children: Mutex<HashMap<String, Child>>,
}

impl ContainerSupervisor {
	pub fn new(data_root: PathBuf) -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			data_root,
			seq: AtomicU64::new(0),
			children: Mutex::new(HashMap::new()),
		}
	}

	fn next_id(&self, kind: BrowserKind) -> String {
		let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default();
		let seq = self.seq.fetch_add(1, Ordering::Relaxed);
		format!("browser-{kind}-{millis}-{seq:04}")
	}

	fn spawn_browser(&self, id: &str, kind: BrowserKind, port: u16) -> Result<Child> {
		let executable = find_browser_executable(kind)
			.ok_or_else(|| RuntimeError::CreationFailed(format!("no {kind} executable found on this host")))?;

		let profile_dir = self.data_root.join(id);
		std::fs::create_dir_all(&profile_dir)?;

		let caps = ResourceCaps::for_kind(kind);
		let mut cmd = Command::new(&executable);
		match kind {
			BrowserKind::Chrome => {
				cmd.args([
					"--headless=new".to_string(),
					format!("--remote-debugging-port={port}"),
					"--remote-debugging-address=0.0.0.0".to_string(),
					"--no-sandbox".to_string(),
					"--disable-dev-shm-usage".to_string(),
					"--no-first-run".to_string(),
					"--no-default-browser-check".to_string(),
					format!("--js-flags=--max-old-space-size={}", caps.memory_mb),
					format!("--user-data-dir={}", profile_dir.display()),
				]);
			}
			BrowserKind::Firefox => {
				cmd.args([
					"--headless".to_string(),
					format!("--remote-debugging-port={port}"),
					"--no-remote".to_string(),
					"--profile".to_string(),
					profile_dir.display().to_string(),
				]);
			}
		}
		cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

		#[cfg(unix)]
		std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

		cmd.spawn()
			.map_err(|e| RuntimeError::CreationFailed(format!("failed to launch {executable}: {e}")))
	}

	fn child_exited(&self, id: &str) -> Option<std::process::ExitStatus> {
		let mut children = self.children.lock();
		let child = children.get_mut(id)?;
		child.try_wait().ok().flatten()
	}
}

#[async_trait]
impl Supervise for ContainerSupervisor {
	async fn create(&self, kind: BrowserKind, prewarm: bool) -> Result<Container> {
		let started = tokio::time::Instant::now();
		let id = self.next_id(kind);
		let port = allocate_port()?;

		let child = self.spawn_browser(&id, kind, port)?;
		let pid = child.id();
		self.children.lock().insert(id.clone(), child);

		let container = Container {
			id: id.clone(),
			kind,
			host: self.host.clone(),
			port,
			pid,
			prewarmed: prewarm,
			created_at: SystemTime::now(),
		};

		match probe::wait_for_endpoint(&self.host, port, READINESS_TIMEOUT).await {
			Some(info) => {
				debug!(
					target = "grid.supervisor",
					container = %id,
					port,
					browser = ?info.browser,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"container ready"
				);
			}
			None => {
				if let Some(status) = self.child_exited(&id) {
					let _ = self.destroy(&container).await;
					return Err(RuntimeError::CreationFailed(format!(
						"{kind} exited before its debugging endpoint came up (status: {status})"
					)));
				}
				// Deliberate: the endpoint may answer shortly after the
				// bound, so the container is returned as usable anyway.
				warn!(
					target = "grid.supervisor",
					container = %id,
					port,
					timeout_ms = READINESS_TIMEOUT.as_millis() as u64,
					"debugging endpoint not ready within bound, returning container anyway"
				);
			}
		}

		info!(
			target = "grid.supervisor",
			container = %id,
			%kind,
			port,
			prewarm,
			startup_ms = started.elapsed().as_millis() as u64,
			"container created"
		);
		Ok(container)
	}

	async fn destroy(&self, container: &Container) -> Result<()> {
		let child = self.children.lock().remove(&container.id);
		match child {
			Some(mut child) => {
				if let Err(err) = child.kill() {
					debug!(target = "grid.supervisor", container = %container.id, error = %err, "kill on exited container");
				}
				// Reap off the executor; a slow-dying browser must not stall
				// a drain or reap sweep.
				let _ = tokio::task::spawn_blocking(move || child.wait()).await;
			}
			None => {
				debug!(target = "grid.supervisor", container = %container.id, "destroy on unknown container, ignoring");
			}
		}

		let profile_dir = self.data_root.join(&container.id);
		if profile_dir.exists() {
			if let Err(err) = std::fs::remove_dir_all(&profile_dir) {
				warn!(target = "grid.supervisor", container = %container.id, error = %err, "failed to remove profile dir");
			}
		}

		info!(target = "grid.supervisor", container = %container.id, "container destroyed");
		Ok(())
	}

	async fn probe(&self, container: &Container) -> bool {
		// A dead or zombie process is unhealthy without an HTTP round trip.
		if !pid_is_alive(container.pid) {
			return false;
		}
		probe::endpoint_ready(&container.host, container.port, PROBE_TIMEOUT).await
	}
}

fn find_browser_executable(kind: BrowserKind) -> Option<String> {
	let candidates: &[&str] = match kind {
		BrowserKind::Chrome => &[
			"chromium",
			"chromium-browser",
			"google-chrome-stable",
			"google-chrome",
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/snap/bin/chromium",
		],
		BrowserKind::Firefox => &["firefox", "firefox-esr", "/usr/bin/firefox", "/usr/bin/firefox-esr", "/snap/bin/firefox"],
	};

	for candidate in candidates {
		if candidate.starts_with('/') {
			if std::path::Path::new(candidate).exists() {
				return Some((*candidate).to_string());
			}
		} else if which::which(candidate).is_ok() {
			return Some((*candidate).to_string());
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_are_unique_and_carry_the_kind() {
		let supervisor = ContainerSupervisor::new(std::env::temp_dir());
		let a = supervisor.next_id(BrowserKind::Chrome);
		let b = supervisor.next_id(BrowserKind::Chrome);
		assert_ne!(a, b);
		assert!(a.starts_with("browser-chrome-"));
	}

	#[test]
	fn caps_differ_by_kind() {
		assert_eq!(ResourceCaps::for_kind(BrowserKind::Chrome).memory_mb, 256);
		assert_eq!(ResourceCaps::for_kind(BrowserKind::Firefox).memory_mb, 384);
	}

	#[tokio::test]
	async fn destroy_of_unknown_container_is_a_noop() {
		let dir = tempfile::tempdir().unwrap();
		let supervisor = ContainerSupervisor::new(dir.path().to_path_buf());
		let container = Container {
			id: "browser-chrome-0-0000".to_string(),
			kind: BrowserKind::Chrome,
			host: "127.0.0.1".to_string(),
			port: 9222,
			pid: 0,
			prewarmed: false,
			created_at: SystemTime::now(),
		};
		supervisor.destroy(&container).await.unwrap();
		supervisor.destroy(&container).await.unwrap();
	}

	fn container_on(port: u16, pid: u32) -> Container {
		Container {
			id: "browser-chrome-0-0001".to_string(),
			kind: BrowserKind::Chrome,
			host: "127.0.0.1".to_string(),
			port,
			pid,
			prewarmed: false,
			created_at: SystemTime::now(),
		}
	}

	fn closed_port() -> u16 {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		listener.local_addr().unwrap().port()
	}

	#[tokio::test]
	async fn probe_is_false_without_a_live_endpoint() {
		let dir = tempfile::tempdir().unwrap();
		let supervisor = ContainerSupervisor::new(dir.path().to_path_buf());
		// Live process, nothing listening on the port.
		let container = container_on(closed_port(), std::process::id());
		assert!(!supervisor.probe(&container).await);
	}

	#[tokio::test]
	async fn probe_is_false_for_a_dead_process() {
		let dir = tempfile::tempdir().unwrap();
		let supervisor = ContainerSupervisor::new(dir.path().to_path_buf());
		let container = container_on(closed_port(), 0);
		assert!(!supervisor.probe(&container).await);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn destroy_kills_and_reaps_a_live_child() {
		let dir = tempfile::tempdir().unwrap();
		let supervisor = ContainerSupervisor::new(dir.path().to_path_buf());

		let child = Command::new("sleep")
			.arg("30")
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.unwrap();
		let pid = child.id();
		let container = container_on(closed_port(), pid);
		supervisor.children.lock().insert(container.id.clone(), child);

		supervisor.destroy(&container).await.unwrap();
		// Reaped, not left behind as a zombie.
		assert!(!pid_is_alive(pid));
		assert!(supervisor.children.lock().is_empty());
	}
}
