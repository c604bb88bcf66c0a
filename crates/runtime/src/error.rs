//! Error types for container and connection plumbing.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
	/// A browser container could not be started.
	#[error("container creation failed: {0}")]
	CreationFailed(String),

	/// WebSocket connect or send failure on the debugging socket.
	#[error("cdp transport error: {0}")]
	Transport(String),

	/// The browser closed the debugging socket while commands were pending.
	#[error("cdp connection closed")]
	ConnectionClosed,

	/// The browser answered a command with a protocol-level error.
	#[error("cdp error {code}: {message}")]
	Cdp { code: i64, message: String },

	/// No response arrived for a command within the bound.
	#[error("no response to {method} within {ms}ms")]
	ResponseTimeout { method: String, ms: u64 },

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
