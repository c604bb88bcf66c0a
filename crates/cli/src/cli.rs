use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gridd")]
#[command(about = "Browsergrid node daemon - pooled browser containers over HTTP")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Address the HTTP surface binds to
	#[arg(long, default_value = "0.0.0.0:3002")]
	pub listen: SocketAddr,

	/// Directory for per-container browser profiles (defaults to a
	/// browsergrid directory under the system temp dir)
	#[arg(long, value_name = "DIR")]
	pub data_dir: Option<PathBuf>,

	/// Upper bound on idle containers kept warm
	#[arg(long, default_value_t = 10)]
	pub pool_capacity: usize,

	/// Containers pre-warmed at startup
	#[arg(long, default_value_t = 5)]
	pub prewarm: usize,

	/// Enable the utilization-driven autoscaler
	#[arg(long)]
	pub autoscale: bool,

	/// Autoscaler capacity floor
	#[arg(long, default_value_t = 5)]
	pub min_containers: usize,

	/// Autoscaler capacity ceiling
	#[arg(long, default_value_t = 50)]
	pub max_containers: usize,
}
