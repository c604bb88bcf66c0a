//! Process and port lifecycle helpers for the supervisor.

use std::net::TcpListener;

use crate::error::{Result, RuntimeError};

/// Returns `true` when a process with `pid` is alive and not a zombie.
///
/// A killed browser lingers in the process table as a zombie until it is
/// reaped; for supervision purposes that counts as dead.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
			// State is the first field after the parenthesized comm, which
			// may itself contain parens.
			Ok(stat) => !stat.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')),
			Err(_) => std::process::Command::new("kill")
				.arg("-0")
				.arg(pid.to_string())
				.status()
				.map(|status| status.success())
				.unwrap_or(false),
		}
	}

	#[cfg(not(unix))]
	{
		pid == std::process::id()
	}
}

/// Asks the OS for a free port by binding port 0 and releasing it.
///
/// The port is not reserved between return and the browser binding it, so a
/// race is possible; callers surface the resulting spawn failure normally.
pub fn allocate_port() -> Result<u16> {
	let listener = TcpListener::bind(("0.0.0.0", 0)).map_err(|e| RuntimeError::CreationFailed(format!("no free debugging port: {e}")))?;
	let port = listener.local_addr().map_err(RuntimeError::Io)?.port();
	drop(listener);
	Ok(port)
}
