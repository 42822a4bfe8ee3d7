//! Lifecycle controller: the gate between "proxy listening" and "real
//! server running"
//!
//! The gate cycles through three phases. While LISTENING it owns the
//! server's public port, answers status pings and waits for a login
//! attempt. A login moves it to STARTING: the listener is closed first
//! (the real server binds the same port next), the server process is
//! launched and the idle monitor spawned. ACTIVE then blocks until the
//! process exits, stops the monitor, waits for the OS to release the port
//! and re-binds. The port is owned by exactly one of {gate listener, real
//! server} at any time.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, error, info, warn};
use protocol::frame::{
    is_legacy_ping, FrameHeader, Handshake, NextState, HANDSHAKE_PACKET_ID, PING_PACKET_ID,
};
use protocol::status::{login_notice_frame, StatusResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::admin::RconAdmin;
use crate::config::GateConfig;
use crate::monitor::{IdleMonitor, StatusProbe};
use crate::process;

/// How often the idle monitor polls the running server.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Per-connection read budget; handshake exchanges are sub-millisecond.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Short wait for the optional ping frame that follows a status exchange.
const PING_FOLLOWUP_TIMEOUT: Duration = Duration::from_millis(500);
/// Grace period for the OS to release the port after the server exits.
const PORT_RELEASE_DELAY: Duration = Duration::from_secs(1);
/// Pause before shutdown so slow clients consume the final payload.
const CLIENT_FLUSH_DELAY: Duration = Duration::from_millis(50);

type GateError = Box<dyn std::error::Error + Send + Sync>;

/// What handling one connection concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Request answered (or deliberately ignored); keep listening.
    Served,
    /// A login attempt: the caller must hand the port to the real server.
    StartupRequested,
}

/// The top-level orchestrator. Owns the listening socket while the real
/// server is stopped and the child process handle while it runs.
pub struct Gate {
    config: GateConfig,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Runs the gate's cycle forever. Only binding the listener can fail
    /// out of this loop; per-connection and per-session errors are logged
    /// and absorbed.
    pub async fn run(&self) -> Result<(), GateError> {
        loop {
            let listener = TcpListener::bind((
                self.config.bind_address.as_str(),
                self.config.server_port,
            ))
            .await?;
            info!(
                "Listening for connections on {}:{}",
                self.config.bind_address, self.config.server_port
            );

            self.accept_until_login(&listener).await;

            // The real server binds this same port next; no window where
            // two listeners coexist
            drop(listener);

            if let Err(e) = self.run_server_session().await {
                error!("Server session failed: {}", e);
            }

            sleep(PORT_RELEASE_DELAY).await;
            info!("Reclaiming control and listening for new connections");
        }
    }

    /// LISTENING: sequential accept loop. Returns on the first login
    /// attempt; everything else is answered or dropped in place.
    async fn accept_until_login(&self, listener: &TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            match self.handle_connection(stream, peer).await {
                Ok(Outcome::StartupRequested) => return,
                Ok(Outcome::Served) => {}
                // Malformed or unexpected input never takes the listener
                // down; the connection is simply gone
                Err(e) => debug!("Dropped connection from {}: {}", peer, e),
            }
        }
    }

    /// Reads and dispatches one client connection.
    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<Outcome, GateError> {
        let mut buf = [0u8; 1024];
        let n = timeout(CLIENT_READ_TIMEOUT, stream.read(&mut buf))
            .await
            .map_err(|_| "read timed out")??;
        let data = &buf[..n];

        if data.is_empty() {
            return Ok(Outcome::Served);
        }
        if is_legacy_ping(data) {
            debug!("Legacy ping from {}, ignoring", peer);
            return Ok(Outcome::Served);
        }

        let header = FrameHeader::parse(data)?;
        let payload = header.payload(data)?;

        // A lone ping frame is echoed back byte-for-byte
        if header.packet_id == PING_PACKET_ID {
            stream.write_all(&data[..header.frame_len()]).await?;
            return Ok(Outcome::Served);
        }
        if header.packet_id != HANDSHAKE_PACKET_ID {
            return Err(protocol::ProtocolError::MalformedFrame("expected handshake").into());
        }

        let handshake = Handshake::parse(payload)?;
        match handshake.next_state {
            NextState::Status => {
                let rest = data[header.frame_len()..].to_vec();
                self.serve_status(&mut stream, peer, handshake.protocol_version, rest)
                    .await?;
                Ok(Outcome::Served)
            }
            NextState::Login => {
                info!("{} initiated server startup", peer);
                stream.write_all(&login_notice_frame()).await?;
                sleep(CLIENT_FLUSH_DELAY).await;
                let _ = stream.shutdown().await;
                Ok(Outcome::StartupRequested)
            }
        }
    }

    /// Answers the packet following a status handshake: a status request
    /// gets the paused-server JSON, a ping is echoed. Clients that request
    /// status usually follow up with a ping for the latency display, so
    /// one more frame is awaited briefly after the response.
    async fn serve_status(
        &self,
        stream: &mut TcpStream,
        peer: SocketAddr,
        client_protocol: u32,
        mut pending: Vec<u8>,
    ) -> Result<(), GateError> {
        if pending.is_empty() {
            let mut buf = [0u8; 1024];
            let n = timeout(CLIENT_READ_TIMEOUT, stream.read(&mut buf))
                .await
                .map_err(|_| "status request timed out")??;
            if n == 0 {
                return Ok(());
            }
            pending.extend_from_slice(&buf[..n]);
        }

        let header = FrameHeader::parse(&pending)?;
        header.payload(&pending)?;

        match header.packet_id {
            HANDSHAKE_PACKET_ID => {
                info!("Sending server status to {}", peer);
                let status = StatusResponse::paused(
                    &self.config.motd,
                    client_protocol,
                    self.config.icon.as_deref(),
                );
                stream.write_all(&status.to_frame()?).await?;
                self.echo_followup_ping(stream).await;
            }
            PING_PACKET_ID => {
                stream.write_all(&pending[..header.frame_len()]).await?;
            }
            _ => {
                return Err(
                    protocol::ProtocolError::MalformedFrame("unexpected status packet").into(),
                )
            }
        }

        sleep(CLIENT_FLUSH_DELAY).await;
        let _ = stream.shutdown().await;
        Ok(())
    }

    /// Best effort: echo the ping that typically trails a status request.
    /// Clients that skip it just see the connection close.
    async fn echo_followup_ping(&self, stream: &mut TcpStream) {
        let mut buf = [0u8; 64];
        let n = match timeout(PING_FOLLOWUP_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => n,
            _ => return,
        };

        if let Ok(header) = FrameHeader::parse(&buf[..n]) {
            if header.packet_id == PING_PACKET_ID && header.frame_len() <= n {
                let _ = stream.write_all(&buf[..header.frame_len()]).await;
            }
        }
    }

    /// STARTING + ACTIVE: launch the real server, watch it with the idle
    /// monitor, block until the process exits, then stand the monitor
    /// down. The monitor must never outlive the session.
    async fn run_server_session(&self) -> Result<(), GateError> {
        let mut child = process::launch(&self.config.launch_command)?;

        let probe = StatusProbe::new(self.probe_host(), self.config.server_port);
        let admin = RconAdmin::new(
            self.probe_host(),
            self.config.rcon_port,
            self.config.rcon_password.clone(),
        );
        let monitor = IdleMonitor::new(
            probe,
            admin,
            STATUS_POLL_INTERVAL,
            self.config.idle_timeout,
        );
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let monitor_handle = tokio::spawn(monitor.run(stop_rx));

        let wait_result = child.wait().await;

        // Whatever ended the process (idle stop, manual stop, crash), the
        // monitor stands down without issuing a command of its own
        let _ = stop_tx.send(());
        if let Err(e) = monitor_handle.await {
            warn!("Monitor task failed: {}", e);
        }

        let status = wait_result?;
        info!("Server process exited ({})", status);
        Ok(())
    }

    /// Where the monitor and RCON client reach the running server. A
    /// wildcard bind address is not a destination.
    fn probe_host(&self) -> &str {
        if self.config.bind_address == "0.0.0.0" {
            "127.0.0.1"
        } else {
            &self.config.bind_address
        }
    }
}
