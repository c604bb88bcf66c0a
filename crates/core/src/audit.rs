//! Best-effort audit trail for lifecycle events.
//!
//! Audit recording is fire-and-forget: a failing sink is logged and never
//! aborts the operation that produced the entry.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
	pub event_type: String,
	/// Customer or user the event concerns, when the payload names one.
	pub actor: Option<String>,
	pub payload: Value,
	pub timestamp_ms: u64,
}

impl AuditEntry {
	pub fn new(event_type: impl Into<String>, actor: Option<String>, payload: Value) -> Self {
		let timestamp_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default();
		Self {
			event_type: event_type.into(),
			actor,
			payload,
			timestamp_ms,
		}
	}
}

#[async_trait]
pub trait AuditSink: Send + Sync {
	async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Sink that writes entries to the log stream.
#[derive(Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
	async fn record(&self, entry: AuditEntry) -> Result<()> {
		info!(
			target = "grid.audit",
			event = %entry.event_type,
			actor = entry.actor.as_deref().unwrap_or("-"),
			payload = %entry.payload,
			"audit"
		);
		Ok(())
	}
}

/// In-memory sink for tests and local inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
	entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
	pub fn entries(&self) -> Vec<AuditEntry> {
		self.entries.lock().clone()
	}
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
	async fn record(&self, entry: AuditEntry) -> Result<()> {
		self.entries.lock().push(entry);
		Ok(())
	}
}
