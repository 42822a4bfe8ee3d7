//! Launching the wrapped server process
//!
//! The real server is opaque to the gate: start a shell command, hold the
//! handle, wait for exit. Anything beyond that belongs to the server's own
//! start script.

use log::info;
use tokio::process::{Child, Command};

/// Launches the real server via `sh -c`, returning its handle. The caller
/// owns the child and is expected to `wait().await` on it.
pub fn launch(command: &str) -> std::io::Result<Child> {
    info!("Launching server: {}", command);
    Command::new("sh").arg("-c").arg(command).spawn()
}
