//! Session-scoped command surface over one container's CDP connection.

use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use grid_runtime::{CdpConnection, Container, probe};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{GridError, Result};

const ATTACH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live remote-debugging session bound to one container.
///
/// Every command refreshes the activity timestamp before doing anything
/// else, so a session is idle only when no command has been issued at all.
pub struct SessionClient {
	session_id: String,
	container: Container,
	connection: CdpConnection,
	last_activity: Mutex<Instant>,
}

impl SessionClient {
	/// Resolves the container's WebSocket debugger URL, connects, and
	/// enables the protocol domains the command surface relies on.
	pub async fn attach(session_id: impl Into<String>, container: Container) -> Result<Self> {
		let version = probe::fetch_version(&container.host, container.port, ATTACH_PROBE_TIMEOUT).await?;
		let connection = CdpConnection::connect(&version.web_socket_debugger_url).await?;

		for domain in ["Page.enable", "Runtime.enable", "DOM.enable", "Network.enable"] {
			connection.send(domain, Value::Null).await?;
		}

		let session_id = session_id.into();
		debug!(target = "grid.session", session = %session_id, container = %container.id, "session attached");
		Ok(Self {
			session_id,
			container,
			connection,
			last_activity: Mutex::new(Instant::now()),
		})
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	pub fn container(&self) -> &Container {
		&self.container
	}

	pub fn idle_for(&self) -> Duration {
		self.last_activity.lock().elapsed()
	}

	pub fn is_closed(&self) -> bool {
		self.connection.is_closed()
	}

	fn touch(&self) {
		*self.last_activity.lock() = Instant::now();
	}

	pub async fn navigate(&self, url: &str) -> Result<()> {
		self.touch();
		self.connection.send("Page.navigate", json!({ "url": url })).await?;
		Ok(())
	}

	/// Clicks the center of the first element matching `selector`.
	pub async fn click(&self, selector: &str) -> Result<()> {
		self.touch();
		let node_id = self.require_node(selector).await?;

		let box_model = self.connection.send("DOM.getBoxModel", json!({ "nodeId": node_id })).await?;
		let content = box_model["model"]["content"]
			.as_array()
			.filter(|quad| quad.len() == 8)
			.ok_or_else(|| GridError::ElementNotFound { selector: selector.to_string() })?;
		let coord = |index: usize| content[index].as_f64().unwrap_or(0.0);
		let x = (coord(0) + coord(2) + coord(4) + coord(6)) / 4.0;
		let y = (coord(1) + coord(3) + coord(5) + coord(7)) / 4.0;

		for kind in ["mousePressed", "mouseReleased"] {
			self.connection
				.send(
					"Input.dispatchMouseEvent",
					json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
				)
				.await?;
		}
		Ok(())
	}

	/// Focuses `selector` with a click, then types `text` one character at
	/// a time.
	pub async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
		self.click(selector).await?;
		for ch in text.chars() {
			self.connection
				.send("Input.dispatchKeyEvent", json!({ "type": "char", "text": ch.to_string() }))
				.await?;
		}
		Ok(())
	}

	/// Evaluates a JavaScript expression and returns its value by value.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		self.touch();
		let result = self
			.connection
			.send("Runtime.evaluate", json!({ "expression": expression, "returnByValue": true }))
			.await?;
		Ok(result["result"]["value"].clone())
	}

	/// Captures a PNG screenshot of the current page.
	pub async fn screenshot(&self) -> Result<Vec<u8>> {
		self.touch();
		let result = self.connection.send("Page.captureScreenshot", json!({ "format": "png" })).await?;
		let data = result["data"].as_str().unwrap_or_default();
		BASE64
			.decode(data)
			.map_err(|e| grid_runtime::RuntimeError::Transport(format!("screenshot payload was not valid base64: {e}")).into())
	}

	/// Polls for `selector` until it resolves or `timeout` elapses.
	pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		self.touch();
		let started = Instant::now();
		loop {
			if self.query_node(selector).await? != 0 {
				return Ok(());
			}
			if started.elapsed() >= timeout {
				return Err(GridError::Timeout {
					ms: timeout.as_millis() as u64,
					condition: format!("selector {selector}"),
				});
			}
			tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
		}
	}

	pub async fn get_html(&self) -> Result<String> {
		self.touch();
		let document = self.connection.send("DOM.getDocument", Value::Null).await?;
		let root_id = document["root"]["nodeId"].as_i64().unwrap_or_default();
		let outer = self.connection.send("DOM.getOuterHTML", json!({ "nodeId": root_id })).await?;
		Ok(outer["outerHTML"].as_str().unwrap_or_default().to_string())
	}

	pub async fn get_title(&self) -> Result<String> {
		let value = self.evaluate("document.title").await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	pub async fn get_url(&self) -> Result<String> {
		let value = self.evaluate("window.location.href").await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	/// Closes the underlying connection. Safe to call more than once.
	pub fn close(&self) {
		self.connection.close();
	}

	/// Resolves `selector` or fails with `ElementNotFound`.
	async fn require_node(&self, selector: &str) -> Result<i64> {
		let node_id = self.query_node(selector).await?;
		if node_id == 0 {
			return Err(GridError::ElementNotFound { selector: selector.to_string() });
		}
		Ok(node_id)
	}

	/// One querySelector pass; node id 0 means no match.
	async fn query_node(&self, selector: &str) -> Result<i64> {
		let document = self.connection.send("DOM.getDocument", Value::Null).await?;
		let root_id = document["root"]["nodeId"].as_i64().unwrap_or_default();
		let found = self
			.connection
			.send("DOM.querySelector", json!({ "nodeId": root_id, "selector": selector }))
			.await?;
		Ok(found["nodeId"].as_i64().unwrap_or_default())
	}
}
