//! Debugging-endpoint probing.
//!
//! All probes here are bounded and fail-soft: a slow or dead endpoint turns
//! into `None`/`false`, never into an unbounded wait.

use std::time::Duration;

use grid_protocol::VersionInfo;
use tracing::trace;

use crate::error::{Result, RuntimeError};

/// Fetches `/json/version` from a debugging endpoint within `timeout`.
pub async fn fetch_version(host: &str, port: u16, timeout: Duration) -> Result<VersionInfo> {
	let client = reqwest::Client::builder()
		.timeout(timeout)
		.build()
		.map_err(|e| RuntimeError::Transport(format!("failed to build probe client: {e}")))?;

	let url = format!("http://{host}:{port}/json/version");
	let response = client
		.get(&url)
		.send()
		.await
		.map_err(|e| RuntimeError::Transport(format!("probe {url}: {e}")))?;

	if !response.status().is_success() {
		return Err(RuntimeError::Transport(format!("probe {url}: unexpected status {}", response.status())));
	}

	response
		.json()
		.await
		.map_err(|e| RuntimeError::Transport(format!("probe {url}: invalid version payload: {e}")))
}

/// Single bounded health check. Never errors; any failure is `false`.
pub async fn endpoint_ready(host: &str, port: u16, timeout: Duration) -> bool {
	match fetch_version(host, port, timeout).await {
		Ok(_) => true,
		Err(err) => {
			trace!(target = "grid.probe", %host, port, error = %err, "endpoint not ready");
			false
		}
	}
}

/// Polls `/json/version` until it answers or `deadline` elapses.
///
/// Returns the version payload on success and `None` on timeout. Deciding
/// what a timeout means is the caller's business; the supervisor treats it
/// as a warning, not a failure.
pub async fn wait_for_endpoint(host: &str, port: u16, deadline: Duration) -> Option<VersionInfo> {
	const POLL_INTERVAL: Duration = Duration::from_millis(500);
	const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

	let started = tokio::time::Instant::now();
	while started.elapsed() < deadline {
		if let Ok(info) = fetch_version(host, port, PROBE_TIMEOUT).await {
			return Some(info);
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}

	None
}
