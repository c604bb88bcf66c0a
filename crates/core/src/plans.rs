//! Plan tiers and the resource quotas derived from them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
	#[default]
	Starter,
	Professional,
	Enterprise,
}

impl std::fmt::Display for PlanTier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PlanTier::Starter => write!(f, "starter"),
			PlanTier::Professional => write!(f, "professional"),
			PlanTier::Enterprise => write!(f, "enterprise"),
		}
	}
}

impl std::str::FromStr for PlanTier {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"starter" => Ok(PlanTier::Starter),
			"professional" => Ok(PlanTier::Professional),
			"enterprise" => Ok(PlanTier::Enterprise),
			other => Err(format!("unknown plan tier: {other}")),
		}
	}
}

/// Hard bounds applied to a customer's isolation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanQuotas {
	pub min_pods: u32,
	pub max_pods: u32,
	pub max_memory_mib: u64,
	pub max_cpu: u32,
}

impl PlanTier {
	pub fn quotas(self) -> PlanQuotas {
		match self {
			PlanTier::Starter => PlanQuotas {
				min_pods: 1,
				max_pods: 5,
				max_memory_mib: 640,
				max_cpu: 1,
			},
			PlanTier::Professional => PlanQuotas {
				min_pods: 5,
				max_pods: 50,
				max_memory_mib: 6_554,
				max_cpu: 10,
			},
			PlanTier::Enterprise => PlanQuotas {
				min_pods: 20,
				max_pods: 500,
				max_memory_mib: 65_536,
				max_cpu: 100,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tier_parses_lowercase() {
		let tier: PlanTier = serde_json::from_str("\"professional\"").unwrap();
		assert_eq!(tier, PlanTier::Professional);
	}

	#[test]
	fn quotas_grow_with_tier() {
		let starter = PlanTier::Starter.quotas();
		let enterprise = PlanTier::Enterprise.quotas();
		assert!(starter.max_pods < enterprise.max_pods);
		assert!(starter.max_memory_mib < enterprise.max_memory_mib);
		assert_eq!(starter.max_pods, 5);
		assert_eq!(enterprise.min_pods, 20);
	}
}
