use std::time::Duration;

use clap::Parser;
use daemon::config::GateConfig;
use daemon::gate::Gate;
use log::{error, info};

/// Demand-activated Minecraft server manager: holds the server's port
/// while it is stopped, starts it on the first login attempt, and stops
/// it again over RCON once it has been empty long enough.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the server.properties file shared with the real server
    #[clap(long, default_value = "server.properties")]
    properties: String,

    /// Seconds the server may sit empty before it is stopped
    #[clap(long, env = "DYNMC_EMPTY_TIME", default_value = "600")]
    empty_time: u64,

    /// Command used to launch the real server
    #[clap(long, default_value = "./start.sh")]
    command: String,

    /// Server icon embedded in status responses (skipped if absent)
    #[clap(long, default_value = "server-icon.png")]
    icon: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // Configuration problems are the only fatal errors; everything after
    // this point keeps the daemon alive
    let config = match GateConfig::load(
        &args.properties,
        &args.icon,
        Duration::from_secs(args.empty_time),
        args.command,
    ) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Server will shut down if empty for {} seconds",
        config.idle_timeout.as_secs()
    );

    let gate = Gate::new(config);

    tokio::select! {
        result = gate.run() => {
            if let Err(e) = result {
                error!("Gate failed: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
}
