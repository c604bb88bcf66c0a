//! Chrome DevTools Protocol message envelopes.
//!
//! A command is `{"id": 7, "method": "Page.navigate", "params": {...}}`.
//! The browser answers with `{"id": 7, "result": {...}}` or
//! `{"id": 7, "error": {"code": ..., "message": ...}}`. Events carry a
//! `method` but no `id`, which is how the connection layer tells them
//! apart from responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser over the debugging socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpCommand {
	pub id: u32,
	pub method: String,
	#[serde(skip_serializing_if = "Value::is_null", default)]
	pub params: Value,
}

impl CdpCommand {
	pub fn new(id: u32, method: impl Into<String>, params: Value) -> Self {
		Self { id, method: method.into(), params }
	}
}

/// Response correlated to a previously sent command id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpResponse {
	pub id: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CdpErrorPayload>,
}

/// Error payload inside a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpErrorPayload {
	pub code: i64,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Unsolicited event pushed by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Any inbound frame: a response (has `id`) or an event (has `method`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
	Response(CdpResponse),
	Event(CdpEvent),
}
