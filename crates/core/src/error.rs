//! Error taxonomy for the orchestration engine.
//!
//! Propagation policy: probe and health-check failures are absorbed into
//! state (a node goes unhealthy, a container reads as not ready) and never
//! reach callers as errors. Acquisition and creation failures propagate to
//! the immediate caller. Orchestrator failures propagate only after the
//! compensating action has been issued.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Error)]
pub enum GridError {
	/// A container could not be started on behalf of an acquire or scale-up.
	#[error("container creation failed: {0}")]
	CreationFailed(String),

	/// Session, container, or node id unknown to this instance.
	#[error("{kind} not found: {id}")]
	NotFound { kind: &'static str, id: String },

	/// A selector did not resolve to an element.
	#[error("element not found: {selector}")]
	ElementNotFound { selector: String },

	/// A command-level wait exceeded its bound.
	#[error("timed out after {ms}ms waiting for {condition}")]
	Timeout { ms: u64, condition: String },

	/// Routing found no healthy node to place the session on.
	#[error("no healthy nodes available")]
	NoHealthyNodes,

	/// An orchestrator provisioning step failed.
	#[error("provisioning step {step} failed for {customer_id}: {detail}")]
	ProvisioningFailed {
		step: &'static str,
		customer_id: String,
		detail: String,
	},

	#[error(transparent)]
	Runtime(#[from] grid_runtime::RuntimeError),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl GridError {
	pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
		Self::NotFound { kind, id: id.into() }
	}
}
