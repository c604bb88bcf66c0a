//! Host-level CPU and memory gauges for the `/health` body.
//!
//! Best-effort readings from /proc; anything unreadable reports 0.0 rather
//! than failing the health check.

/// One-minute load average scaled by core count, as a 0..=100 percentage.
pub fn cpu_usage_percent() -> f64 {
	#[cfg(unix)]
	{
		let loadavg = match std::fs::read_to_string("/proc/loadavg") {
			Ok(contents) => contents,
			Err(_) => return 0.0,
		};
		let load: f64 = loadavg.split_whitespace().next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
		let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
		(load / cores * 100.0).clamp(0.0, 100.0)
	}
	#[cfg(not(unix))]
	{
		0.0
	}
}

/// Fraction of physical memory in use, as a 0..=100 percentage.
pub fn memory_usage_percent() -> f64 {
	#[cfg(unix)]
	{
		let meminfo = match std::fs::read_to_string("/proc/meminfo") {
			Ok(contents) => contents,
			Err(_) => return 0.0,
		};
		let field = |name: &str| -> Option<f64> {
			meminfo
				.lines()
				.find(|line| line.starts_with(name))
				.and_then(|line| line.split_whitespace().nth(1))
				.and_then(|v| v.parse().ok())
		};
		match (field("MemTotal:"), field("MemAvailable:")) {
			(Some(total), Some(available)) if total > 0.0 => ((total - available) / total * 100.0).clamp(0.0, 100.0),
			_ => 0.0,
		}
	}
	#[cfg(not(unix))]
	{
		0.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gauges_stay_in_percentage_range() {
		let cpu = cpu_usage_percent();
		let memory = memory_usage_percent();
		assert!((0.0..=100.0).contains(&cpu));
		assert!((0.0..=100.0).contains(&memory));
	}
}
