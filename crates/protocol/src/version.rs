//! `/json/version` readiness payload.

use serde::{Deserialize, Serialize};

/// Subset of the `/json/version` response a debugging endpoint serves
/// once the browser is ready to accept connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	pub browser: Option<String>,
	#[serde(rename = "Protocol-Version")]
	pub protocol_version: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_chromium_version_payload() {
		let raw = r#"{
			"Browser": "Chrome/124.0.6367.60",
			"Protocol-Version": "1.3",
			"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
		}"#;
		let info: VersionInfo = serde_json::from_str(raw).unwrap();
		assert_eq!(info.web_socket_debugger_url, "ws://127.0.0.1:9222/devtools/browser/abc");
		assert_eq!(info.browser.as_deref(), Some("Chrome/124.0.6367.60"));
	}

	#[test]
	fn tolerates_missing_optional_fields() {
		let info: VersionInfo = serde_json::from_str(r#"{"webSocketDebuggerUrl":"ws://h/devtools/browser/x"}"#).unwrap();
		assert!(info.browser.is_none());
		assert!(info.protocol_version.is_none());
	}
}
