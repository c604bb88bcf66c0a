//! Node HTTP surface shapes.
//!
//! These are the request/response bodies served by a `gridd` node and
//! consumed by the load balancer sweep and by session-creation callers.

use serde::{Deserialize, Serialize};

/// Browser engine hosted by a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	#[default]
	Chrome,
	Firefox,
}

impl std::fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BrowserKind::Chrome => write!(f, "chrome"),
			BrowserKind::Firefox => write!(f, "firefox"),
		}
	}
}

impl std::str::FromStr for BrowserKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"chrome" | "chromium" => Ok(BrowserKind::Chrome),
			"firefox" => Ok(BrowserKind::Firefox),
			other => Err(format!("unknown browser kind: {other}")),
		}
	}
}

/// Body of `POST /browser`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserRequest {
	#[serde(default)]
	pub browser_type: BrowserKind,
}

/// Successful `POST /browser` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserResponse {
	pub session_id: String,
	pub cdp_url: String,
	pub ws_endpoint: String,
	pub port: u16,
}

/// `GET /health` body, also what the balancer sweep ingests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
	pub status: NodeStatus,
	pub cpu_usage: f64,
	pub memory_usage: f64,
	pub active_connections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
	Healthy,
	Unhealthy,
}
