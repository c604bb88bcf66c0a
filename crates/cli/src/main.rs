use std::sync::Arc;

use clap::Parser;
use grid::audit::LogAuditSink;
use grid::autoscaler::{AutoScaler, AutoScalerConfig};
use grid::events::EventBus;
use grid::pool::{PoolConfig, PoolManager};
use grid::session::{RegistryConfig, SessionRegistry};
use grid_cli::server::{self, AppState};
use grid_cli::{cli::Cli, logging};
use grid_runtime::ContainerSupervisor;
use tracing::{error, info};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init(cli.verbose);

	if let Err(err) = run(cli).await {
		error!(target = "gridd", error = %err, "node daemon failed");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let data_dir = cli.data_dir.unwrap_or_else(|| std::env::temp_dir().join("browsergrid"));
	std::fs::create_dir_all(&data_dir)?;

	let supervisor = Arc::new(ContainerSupervisor::new(data_dir));
	let pool = Arc::new(PoolManager::new(
		supervisor,
		PoolConfig {
			capacity: cli.pool_capacity,
			prewarm_count: cli.prewarm,
			..PoolConfig::default()
		},
	));
	let bus = Arc::new(EventBus::new(Arc::new(LogAuditSink)));
	let registry = Arc::new(SessionRegistry::new(Arc::clone(&pool), Arc::clone(&bus), RegistryConfig::default()));

	pool.initialize().await;
	tokio::spawn(Arc::clone(&pool).run_reaper());
	tokio::spawn(Arc::clone(&registry).run_reaper());

	if cli.autoscale {
		let scaler = Arc::new(AutoScaler::new(
			Arc::clone(&pool),
			AutoScalerConfig {
				enabled: true,
				min_containers: cli.min_containers,
				max_containers: cli.max_containers,
				..AutoScalerConfig::default()
			},
		));
		tokio::spawn(scaler.run());
	}

	let app = server::router(AppState {
		registry: Arc::clone(&registry),
		pool: Arc::clone(&pool),
	});
	let listener = tokio::net::TcpListener::bind(cli.listen).await?;
	info!(target = "gridd", addr = %cli.listen, "node daemon listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	// Drain order matters: sessions give containers back before the pool
	// destroys them.
	registry.drain().await;
	pool.drain().await;
	info!(target = "gridd", "node daemon stopped");
	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	info!(target = "gridd", "shutdown requested");
}
