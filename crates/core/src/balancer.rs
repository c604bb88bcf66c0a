//! Load balancer: node registry, selection algorithms, health sweep.
//!
//! Only nodes with `healthy == true` are eligible for routing. The health
//! view is advisory and eventually consistent: the sweep may lag reality,
//! and routing decisions are never transactional across nodes.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use grid_protocol::{NodeHealth, NodeStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GridError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
	#[default]
	RoundRobin,
	LeastConnections,
	ResourceBased,
}

impl std::str::FromStr for Algorithm {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"round-robin" => Ok(Algorithm::RoundRobin),
			"least-connections" => Ok(Algorithm::LeastConnections),
			"resource-based" => Ok(Algorithm::ResourceBased),
			other => Err(format!("unknown balancing algorithm: {other}")),
		}
	}
}

#[derive(Debug, Clone)]
pub struct BalancerConfig {
	pub algorithm: Algorithm,
	pub check_interval: Duration,
	pub check_timeout: Duration,
}

impl Default for BalancerConfig {
	fn default() -> Self {
		Self {
			algorithm: Algorithm::RoundRobin,
			check_interval: Duration::from_secs(30),
			check_timeout: Duration::from_secs(5),
		}
	}
}

/// One pool-manager node as the balancer sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub id: String,
	pub host: String,
	pub port: u16,
	pub healthy: bool,
	pub active_connections: usize,
	pub cpu_usage: f64,
	pub memory_usage: f64,
	pub last_health_check_ms: u64,
}

impl Node {
	pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
		Self {
			id: id.into(),
			host: host.into(),
			port,
			healthy: true,
			active_connections: 0,
			cpu_usage: 0.0,
			memory_usage: 0.0,
			last_health_check_ms: now_ms(),
		}
	}

	fn resource_score(&self) -> f64 {
		self.cpu_usage * 0.5 + self.memory_usage * 0.3 + self.active_connections as f64 * 0.2
	}
}

/// Aggregate view for operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerStats {
	pub algorithm: Algorithm,
	pub total_nodes: usize,
	pub healthy_nodes: usize,
	pub unhealthy_nodes: usize,
	pub total_connections: usize,
	pub avg_cpu_usage: f64,
	pub avg_memory_usage: f64,
	pub nodes: Vec<Node>,
}

#[derive(Default)]
struct Registry {
	/// Registry order is the tie-break order for selection.
	nodes: Vec<Node>,
	cursor: usize,
}

pub struct LoadBalancer {
	config: BalancerConfig,
	state: Mutex<Registry>,
	client: reqwest::Client,
}

impl LoadBalancer {
	pub fn new(config: BalancerConfig) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(config.check_timeout)
			.build()
			.map_err(|e| GridError::Io(std::io::Error::other(format!("failed to build health client: {e}"))))?;
		Ok(Self {
			config,
			state: Mutex::new(Registry::default()),
			client,
		})
	}

	/// Adds a node, replacing any existing registration with the same id.
	pub fn add_node(&self, node: Node) {
		let mut state = self.state.lock();
		info!(target = "grid.balancer", node = %node.id, host = %node.host, port = node.port, "node added");
		match state.nodes.iter_mut().find(|existing| existing.id == node.id) {
			Some(existing) => *existing = node,
			None => state.nodes.push(node),
		}
	}

	pub fn remove_node(&self, node_id: &str) -> bool {
		let mut state = self.state.lock();
		let before = state.nodes.len();
		state.nodes.retain(|node| node.id != node_id);
		let removed = state.nodes.len() != before;
		if removed {
			info!(target = "grid.balancer", node = %node_id, "node removed");
		}
		removed
	}

	/// Marks a node's health and, on success, folds in reported metrics.
	pub fn update_health(&self, node_id: &str, healthy: bool, health: Option<&NodeHealth>) -> bool {
		let mut state = self.state.lock();
		let Some(node) = state.nodes.iter_mut().find(|node| node.id == node_id) else {
			return false;
		};
		node.healthy = healthy;
		node.last_health_check_ms = now_ms();
		if let Some(health) = health {
			node.cpu_usage = health.cpu_usage;
			node.memory_usage = health.memory_usage;
			node.active_connections = health.active_connections;
		}
		true
	}

	/// Session-assignment bookkeeping on the routed node.
	pub fn record_assignment(&self, node_id: &str) {
		let mut state = self.state.lock();
		if let Some(node) = state.nodes.iter_mut().find(|node| node.id == node_id) {
			node.active_connections += 1;
		}
	}

	pub fn record_completion(&self, node_id: &str) {
		let mut state = self.state.lock();
		if let Some(node) = state.nodes.iter_mut().find(|node| node.id == node_id) {
			node.active_connections = node.active_connections.saturating_sub(1);
		}
	}

	/// Picks a target node for an incoming session request.
	pub fn select_node(&self) -> Result<Node> {
		let mut state = self.state.lock();
		let healthy: Vec<usize> = state
			.nodes
			.iter()
			.enumerate()
			.filter(|(_, node)| node.healthy)
			.map(|(index, _)| index)
			.collect();

		if healthy.is_empty() {
			warn!(target = "grid.balancer", "no healthy nodes available");
			return Err(GridError::NoHealthyNodes);
		}

		let chosen = match self.config.algorithm {
			Algorithm::RoundRobin => {
				let position = state.cursor % healthy.len();
				state.cursor = (state.cursor + 1) % healthy.len();
				healthy[position]
			}
			Algorithm::LeastConnections => healthy
				.iter()
				.copied()
				.min_by_key(|&index| state.nodes[index].active_connections)
				.unwrap_or(healthy[0]),
			Algorithm::ResourceBased => healthy
				.iter()
				.copied()
				.min_by(|&a, &b| {
					state.nodes[a]
						.resource_score()
						.partial_cmp(&state.nodes[b].resource_score())
						.unwrap_or(std::cmp::Ordering::Equal)
				})
				.unwrap_or(healthy[0]),
		};

		Ok(state.nodes[chosen].clone())
	}

	pub fn stats(&self) -> BalancerStats {
		let state = self.state.lock();
		let nodes = state.nodes.clone();
		let healthy = nodes.iter().filter(|node| node.healthy).count();
		let count = nodes.len().max(1) as f64;
		BalancerStats {
			algorithm: self.config.algorithm,
			total_nodes: nodes.len(),
			healthy_nodes: healthy,
			unhealthy_nodes: nodes.len() - healthy,
			total_connections: nodes.iter().map(|node| node.active_connections).sum(),
			avg_cpu_usage: nodes.iter().map(|node| node.cpu_usage).sum::<f64>() / count,
			avg_memory_usage: nodes.iter().map(|node| node.memory_usage).sum::<f64>() / count,
			nodes,
		}
	}

	/// Probes every node's `/health` endpoint concurrently. Each probe has
	/// its own timeout, so one stuck node cannot stall the sweep; any
	/// failure flips that node to unhealthy and nothing propagates.
	pub async fn sweep(&self) {
		let targets: Vec<(String, String, u16)> = {
			let state = self.state.lock();
			state.nodes.iter().map(|node| (node.id.clone(), node.host.clone(), node.port)).collect()
		};

		let probes = join_all(targets.iter().map(|(id, host, port)| {
			let client = self.client.clone();
			async move {
				let url = format!("http://{host}:{port}/health");
				let outcome: std::result::Result<NodeHealth, String> = async {
					let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
					if !response.status().is_success() {
						return Err(format!("unexpected status {}", response.status()));
					}
					response.json::<NodeHealth>().await.map_err(|e| e.to_string())
				}
				.await;
				(id.clone(), outcome)
			}
		}))
		.await;

		for (node_id, outcome) in probes {
			match outcome {
				Ok(health) => {
					let healthy = health.status == NodeStatus::Healthy;
					self.update_health(&node_id, healthy, Some(&health));
					debug!(target = "grid.balancer", node = %node_id, healthy, "health check ok");
				}
				Err(reason) => {
					self.update_health(&node_id, false, None);
					warn!(target = "grid.balancer", node = %node_id, %reason, "health check failed");
				}
			}
		}
	}

	/// Periodic sweep loop; spawn this once per balancer instance.
	pub async fn run_sweeper(self: Arc<Self>) {
		let mut ticker = tokio::time::interval(self.config.check_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			self.sweep().await;
		}
	}
}

fn now_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn balancer(algorithm: Algorithm) -> LoadBalancer {
		LoadBalancer::new(BalancerConfig {
			algorithm,
			..BalancerConfig::default()
		})
		.unwrap()
	}

	fn node(id: &str, conns: usize, cpu: f64, mem: f64) -> Node {
		Node {
			active_connections: conns,
			cpu_usage: cpu,
			memory_usage: mem,
			..Node::new(id, "10.0.0.1", 3002)
		}
	}

	#[test]
	fn round_robin_selects_each_healthy_node_exactly_once() {
		let lb = balancer(Algorithm::RoundRobin);
		for id in ["a", "b", "c"] {
			lb.add_node(Node::new(id, "10.0.0.1", 3002));
		}

		let mut seen: Vec<String> = (0..3).map(|_| lb.select_node().unwrap().id).collect();
		seen.sort();
		assert_eq!(seen, vec!["a", "b", "c"]);

		// Cursor persists and wraps.
		assert_eq!(lb.select_node().unwrap().id, "a");
	}

	#[test]
	fn round_robin_skips_unhealthy_nodes() {
		let lb = balancer(Algorithm::RoundRobin);
		for id in ["a", "b", "c"] {
			lb.add_node(Node::new(id, "10.0.0.1", 3002));
		}
		assert!(lb.update_health("b", false, None));

		for _ in 0..4 {
			assert_ne!(lb.select_node().unwrap().id, "b");
		}
	}

	#[test]
	fn least_connections_prefers_the_idlest_node() {
		let lb = balancer(Algorithm::LeastConnections);
		lb.add_node(node("a", 5, 0.0, 0.0));
		lb.add_node(node("b", 2, 0.0, 0.0));
		lb.add_node(node("c", 9, 0.0, 0.0));
		assert_eq!(lb.select_node().unwrap().id, "b");
	}

	#[test]
	fn least_connections_breaks_ties_by_registry_order() {
		let lb = balancer(Algorithm::LeastConnections);
		lb.add_node(node("first", 1, 0.0, 0.0));
		lb.add_node(node("second", 1, 0.0, 0.0));
		assert_eq!(lb.select_node().unwrap().id, "first");
	}

	#[test]
	fn resource_based_weights_cpu_memory_and_connections() {
		let lb = balancer(Algorithm::ResourceBased);
		// Scores: a = 50*0.5 = 25; b = 10*0.5 + 50*0.3 = 20; c = 100*0.2 = 20.
		lb.add_node(node("a", 0, 50.0, 0.0));
		lb.add_node(node("b", 0, 10.0, 50.0));
		lb.add_node(node("c", 100, 0.0, 0.0));
		// b and c tie at 20; registry order prefers b.
		assert_eq!(lb.select_node().unwrap().id, "b");
	}

	#[test]
	fn no_healthy_nodes_is_a_routing_error() {
		let lb = balancer(Algorithm::RoundRobin);
		assert!(matches!(lb.select_node(), Err(GridError::NoHealthyNodes)));

		lb.add_node(Node::new("a", "10.0.0.1", 3002));
		lb.update_health("a", false, None);
		assert!(matches!(lb.select_node(), Err(GridError::NoHealthyNodes)));
	}

	#[test]
	fn removed_nodes_are_not_selectable() {
		let lb = balancer(Algorithm::RoundRobin);
		lb.add_node(Node::new("a", "10.0.0.1", 3002));
		lb.add_node(Node::new("b", "10.0.0.2", 3002));
		assert!(lb.remove_node("a"));
		assert!(!lb.remove_node("a"));

		for _ in 0..3 {
			assert_eq!(lb.select_node().unwrap().id, "b");
		}
		assert!(!lb.update_health("a", true, None));
	}

	#[test]
	fn assignment_bookkeeping_tracks_connections() {
		let lb = balancer(Algorithm::LeastConnections);
		lb.add_node(Node::new("a", "10.0.0.1", 3002));
		lb.record_assignment("a");
		lb.record_assignment("a");
		lb.record_completion("a");
		assert_eq!(lb.stats().total_connections, 1);
		// Underflow clamps at zero.
		lb.record_completion("a");
		lb.record_completion("a");
		assert_eq!(lb.stats().total_connections, 0);
	}

	#[test]
	fn stats_aggregate_over_all_nodes() {
		let lb = balancer(Algorithm::RoundRobin);
		lb.add_node(node("a", 2, 40.0, 60.0));
		lb.add_node(node("b", 3, 20.0, 20.0));
		lb.update_health("b", false, None);

		let stats = lb.stats();
		assert_eq!(stats.total_nodes, 2);
		assert_eq!(stats.healthy_nodes, 1);
		assert_eq!(stats.unhealthy_nodes, 1);
		assert_eq!(stats.total_connections, 5);
		assert_eq!(stats.avg_cpu_usage, 30.0);
		assert_eq!(stats.avg_memory_usage, 40.0);
	}
}
