//! In-process event bus with named topics.
//!
//! Delivery is at-least-once and unordered across handlers; subscribers
//! must treat duplicate events as idempotent. The bus is an explicit
//! instance constructed at process start and handed to producers and
//! consumers; there is no ambient dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audit::{AuditEntry, AuditSink};

/// Well-known event names.
pub mod names {
	pub const PAYMENT_VERIFIED: &str = "payment-verified";
	pub const SUBSCRIPTION_CANCELLED: &str = "subscription-cancelled";
	pub const RESOURCES_ALLOCATED: &str = "resources-allocated";
	pub const RESOURCES_DEALLOCATED: &str = "resources-deallocated";
	pub const ERROR_RESOURCE_ALLOCATION: &str = "error:resource-allocation";
	pub const SESSION_STARTED: &str = "session:started";
	pub const SESSION_COMPLETED: &str = "session:completed";
}

#[derive(Debug, Clone)]
pub struct Event {
	pub name: String,
	pub payload: Value,
}

pub struct EventBus {
	topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Event>>>>,
	audit: Arc<dyn AuditSink>,
}

impl EventBus {
	pub fn new(audit: Arc<dyn AuditSink>) -> Self {
		Self {
			topics: Mutex::new(HashMap::new()),
			audit,
		}
	}

	/// Registers a subscriber for `name`. The returned receiver sees every
	/// event published after this call.
	pub fn subscribe(&self, name: &str) -> mpsc::UnboundedReceiver<Event> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.topics.lock().entry(name.to_string()).or_default().push(tx);
		rx
	}

	/// Publishes an event, returning the number of live subscribers it
	/// reached. An audit record is persisted as a detached best-effort
	/// task, independent of whether any handler succeeds.
	pub fn publish(&self, name: &str, payload: Value) -> usize {
		let event = Event {
			name: name.to_string(),
			payload: payload.clone(),
		};

		let delivered = {
			let mut topics = self.topics.lock();
			match topics.get_mut(name) {
				Some(subscribers) => {
					subscribers.retain(|tx| tx.send(event.clone()).is_ok());
					subscribers.len()
				}
				None => 0,
			}
		};
		debug!(target = "grid.events", event = name, delivered, "published");

		let actor = payload
			.get("customerId")
			.or_else(|| payload.get("userId"))
			.and_then(Value::as_str)
			.map(str::to_string);
		let entry = AuditEntry::new(name, actor, payload);
		let audit = Arc::clone(&self.audit);
		let event_type = entry.event_type.clone();
		tokio::spawn(async move {
			if let Err(err) = audit.record(entry).await {
				warn!(target = "grid.events", event = %event_type, error = %err, "audit record failed");
			}
		});

		delivered
	}
}
