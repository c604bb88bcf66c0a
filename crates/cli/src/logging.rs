use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes the log pipeline. `RUST_LOG` wins over the verbosity flag.
pub fn init(verbose: u8) {
	let default_level = match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
		.with(fmt::layer())
		.init();
}
