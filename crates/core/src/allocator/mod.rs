//! Resource allocator: reacts to billing lifecycle events.
//!
//! On `payment-verified` it provisions the customer's isolation boundary,
//! quotas, network policy, and autoscale policy, in that order. A failed
//! step publishes an allocation error, issues a compensating refund, and
//! propagates; completed steps are NOT rolled back, because the
//! provisioning API is idempotent and a retry after the next payment event
//! converges on the same end state. On `subscription-cancelled` it
//! cascade-deletes the boundary; teardown failures are logged and alerted
//! but never propagate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::{GridError, Result};
use crate::events::{Event, EventBus, names};
use crate::plans::{PlanQuotas, PlanTier};

/// Provisioning backend the allocator drives. Every operation is
/// idempotent: applying to an already-provisioned target succeeds.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
	/// Creates the customer's isolation boundary, returning its namespace.
	async fn create_isolation_boundary(&self, customer_id: &str) -> Result<String>;

	async fn apply_quota(&self, namespace: &str, quotas: &PlanQuotas) -> Result<()>;

	async fn apply_network_policy(&self, namespace: &str) -> Result<()>;

	async fn apply_autoscale_policy(&self, namespace: &str, quotas: &PlanQuotas) -> Result<()>;

	/// Cascade-deletes the boundary and everything inside it.
	async fn delete_isolation_boundary(&self, namespace: &str) -> Result<()>;

	async fn list_resources(&self, namespace: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait BillingApi: Send + Sync {
	async fn refund(&self, customer_id: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
	Allocated,
	Deallocating,
	Deallocated,
}

/// What the allocator knows about one customer's provisioned resources.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRecord {
	pub customer_id: String,
	pub namespace: String,
	pub plan: PlanTier,
	pub quotas: PlanQuotas,
	pub state: ResourceState,
	pub updated_at_ms: u64,
}

pub struct ResourceAllocator {
	api: Arc<dyn ProvisioningApi>,
	billing: Arc<dyn BillingApi>,
	bus: Arc<EventBus>,
	records: Mutex<HashMap<String, ProvisioningRecord>>,
}

impl ResourceAllocator {
	pub fn new(api: Arc<dyn ProvisioningApi>, billing: Arc<dyn BillingApi>, bus: Arc<EventBus>) -> Self {
		Self {
			api,
			billing,
			bus,
			records: Mutex::new(HashMap::new()),
		}
	}

	pub fn record(&self, customer_id: &str) -> Option<ProvisioningRecord> {
		self.records.lock().get(customer_id).cloned()
	}

	/// Provisions resources for a verified payment.
	///
	/// Re-running for an already-provisioned customer is safe: each step
	/// re-applies and the record is overwritten in place.
	pub async fn allocate(&self, customer_id: &str, plan: PlanTier) -> Result<ProvisioningRecord> {
		let quotas = plan.quotas();
		info!(target = "grid.allocator", customer = %customer_id, %plan, "allocating resources");

		let outcome: std::result::Result<String, (&'static str, GridError)> = async {
			let namespace = self
				.api
				.create_isolation_boundary(customer_id)
				.await
				.map_err(|e| ("isolation-boundary", e))?;
			self.api.apply_quota(&namespace, &quotas).await.map_err(|e| ("resource-quota", e))?;
			self.api.apply_network_policy(&namespace).await.map_err(|e| ("network-policy", e))?;
			self.api
				.apply_autoscale_policy(&namespace, &quotas)
				.await
				.map_err(|e| ("autoscale-policy", e))?;
			Ok(namespace)
		}
		.await;

		let namespace = match outcome {
			Ok(namespace) => namespace,
			Err((step, err)) => {
				self.compensate_failed_allocation(customer_id, step, &err).await;
				return Err(GridError::ProvisioningFailed {
					step,
					customer_id: customer_id.to_string(),
					detail: err.to_string(),
				});
			}
		};

		let record = ProvisioningRecord {
			customer_id: customer_id.to_string(),
			namespace: namespace.clone(),
			plan,
			quotas,
			state: ResourceState::Allocated,
			updated_at_ms: now_ms(),
		};
		self.records.lock().insert(customer_id.to_string(), record.clone());

		self.bus.publish(
			names::RESOURCES_ALLOCATED,
			json!({
				"customerId": customer_id,
				"namespace": namespace,
				"plan": plan.to_string(),
			}),
		);
		info!(target = "grid.allocator", customer = %customer_id, %namespace, "resources allocated");
		Ok(record)
	}

	/// Publishes the allocation error and refunds the charge. Completed
	/// steps stay in place; a later retry re-applies over them.
	async fn compensate_failed_allocation(&self, customer_id: &str, step: &'static str, err: &GridError) {
		error!(
			target = "grid.ops",
			customer = %customer_id,
			step,
			error = %err,
			"resource allocation failed, refunding"
		);
		self.bus.publish(
			names::ERROR_RESOURCE_ALLOCATION,
			json!({
				"customerId": customer_id,
				"step": step,
				"error": err.to_string(),
			}),
		);
		if let Err(refund_err) = self.billing.refund(customer_id, &format!("allocation failed at {step}")).await {
			error!(
				target = "grid.ops",
				customer = %customer_id,
				error = %refund_err,
				"compensating refund failed, manual intervention required"
			);
		}
	}

	/// Tears down a cancelled customer's resources. Failures are logged
	/// and alerted but never propagate: cancellation must always succeed
	/// from the billing system's point of view.
	pub async fn deallocate(&self, customer_id: &str) {
		let Some(namespace) = self.records.lock().get_mut(customer_id).map(|record| {
			record.state = ResourceState::Deallocating;
			record.updated_at_ms = now_ms();
			record.namespace.clone()
		}) else {
			warn!(target = "grid.allocator", customer = %customer_id, "deallocate for unknown customer ignored");
			return;
		};

		let teardown: Result<()> = async {
			let resources = self.api.list_resources(&namespace).await?;
			info!(
				target = "grid.allocator",
				customer = %customer_id,
				%namespace,
				resources = resources.len(),
				"deallocating resources"
			);
			self.api.delete_isolation_boundary(&namespace).await
		}
		.await;

		match teardown {
			Ok(()) => {
				if let Some(record) = self.records.lock().get_mut(customer_id) {
					record.state = ResourceState::Deallocated;
					record.updated_at_ms = now_ms();
				}
				self.bus.publish(
					names::RESOURCES_DEALLOCATED,
					json!({
						"customerId": customer_id,
						"namespace": namespace,
					}),
				);
			}
			Err(err) => {
				error!(
					target = "grid.ops",
					customer = %customer_id,
					%namespace,
					error = %err,
					"resource teardown failed, manual cleanup required"
				);
			}
		}
	}

	/// Event loop consuming billing lifecycle events. Handler failures are
	/// logged; the loop never dies on a bad event.
	pub async fn run(self: Arc<Self>) {
		let mut payments = self.bus.subscribe(names::PAYMENT_VERIFIED);
		let mut cancellations = self.bus.subscribe(names::SUBSCRIPTION_CANCELLED);

		loop {
			tokio::select! {
				Some(event) = payments.recv() => self.handle_payment(event).await,
				Some(event) = cancellations.recv() => self.handle_cancellation(event).await,
				else => break,
			}
		}
	}

	async fn handle_payment(&self, event: Event) {
		let Some(customer_id) = event.payload.get("customerId").and_then(|v| v.as_str()) else {
			warn!(target = "grid.allocator", "payment event without customerId ignored");
			return;
		};
		let plan = event
			.payload
			.get("plan")
			.and_then(|v| v.as_str())
			.and_then(|s| s.parse::<PlanTier>().ok())
			.unwrap_or(PlanTier::Starter);

		if let Err(err) = self.allocate(customer_id, plan).await {
			warn!(target = "grid.allocator", customer = %customer_id, error = %err, "allocation handler failed");
		}
	}

	async fn handle_cancellation(&self, event: Event) {
		let Some(customer_id) = event.payload.get("customerId").and_then(|v| v.as_str()) else {
			warn!(target = "grid.allocator", "cancellation event without customerId ignored");
			return;
		};
		self.deallocate(customer_id).await;
	}
}

fn now_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}
