//! Idle monitor: polls the running server and stops it once empty
//!
//! While the real server runs, the monitor opens a short-lived status
//! connection on every poll interval, reads `players.online` from the
//! status JSON, and counts consecutive empty polls. Crossing the threshold
//! fires the remote stop command exactly once, after which the monitor is
//! done. A stop signal from the controller (the process already exited on
//! its own) ends the monitor without sending anything.

use std::time::Duration;

use log::{debug, error, info, warn};
use protocol::frame::{status_request_frame, FrameHeader, Handshake, NextState};
use protocol::status::parse_online_players;
use protocol::varint::MAX_VARINT_LEN;
use protocol::ProtocolError;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::admin::RemoteAdmin;

/// Protocol version declared in outbound status probes. Servers answer
/// status requests regardless of version, so any plausible value works.
pub const PROBE_PROTOCOL_VERSION: u32 = 500;

/// Bound on a single probe's connect/send/receive sequence so a hung
/// server cannot stall the polling schedule.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A failed poll. Recoverable per-tick: the idle counter is left untouched
/// and the next tick proceeds on schedule.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("status probe I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("status probe timed out")]
    Timeout,
    #[error("status response malformed: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Source of the "how many players are online" answer. Trait seam so tick
/// behavior is testable with scripted counts.
#[allow(async_fn_in_trait)]
pub trait PlayerCountSource {
    async fn online_players(&self) -> Result<u32, MonitorError>;
}

/// Production source: a real status handshake + request against the
/// running server, one fresh connection per poll.
#[derive(Debug, Clone)]
pub struct StatusProbe {
    host: String,
    port: u16,
    probe_timeout: Duration,
}

impl StatusProbe {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Overrides the per-probe timeout; tests use short values.
    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    async fn query(&self) -> Result<u32, MonitorError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        let handshake = Handshake {
            protocol_version: PROBE_PROTOCOL_VERSION,
            server_address: self.host.clone(),
            server_port: self.port,
            next_state: NextState::Status,
        };
        stream.write_all(&handshake.to_frame()).await?;
        stream.write_all(&status_request_frame()).await?;

        let (header, buf) = read_full_frame(&mut stream).await?;
        let payload = header.payload(&buf)?;
        Ok(parse_online_players(payload)?)
    }
}

impl PlayerCountSource for StatusProbe {
    async fn online_players(&self) -> Result<u32, MonitorError> {
        timeout(self.probe_timeout, self.query())
            .await
            .map_err(|_| MonitorError::Timeout)?
    }
}

/// Reads from the stream until one complete frame is buffered.
///
/// Status responses routinely exceed a single read (a favicon alone can be
/// tens of kilobytes), so keep reading until the declared length arrives.
pub(crate) async fn read_full_frame(
    stream: &mut TcpStream,
) -> Result<(FrameHeader, Vec<u8>), MonitorError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        let at_eof = n == 0;
        buf.extend_from_slice(&chunk[..n]);

        match FrameHeader::parse(&buf) {
            Ok(header) if header.frame_len() <= buf.len() => return Ok((header, buf)),
            // Header parsed but the declared payload has not all arrived yet
            Ok(_) if !at_eof => continue,
            // The leading varints themselves may still be partial
            Err(ProtocolError::MalformedVarint(_)) if !at_eof && buf.len() < 2 * MAX_VARINT_LEN => {
                continue
            }
            Ok(_) => {
                return Err(ProtocolError::MalformedFrame(
                    "fewer bytes available than declared",
                )
                .into())
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// The idle monitor task state. RUNNING from construction; STOPPED is
/// terminal and is reached either by firing the stop command or by the
/// controller's stop signal.
pub struct IdleMonitor<S, A> {
    source: S,
    admin: A,
    poll_interval: Duration,
    /// Consecutive empty polls required before the stop command fires.
    threshold: u32,
    consecutive_empty: u32,
}

impl<S: PlayerCountSource, A: RemoteAdmin> IdleMonitor<S, A> {
    /// The threshold is the configured idle duration divided by the poll
    /// interval, rounded up: 600s at a 30s interval means 20 consecutive
    /// empty polls.
    pub fn new(source: S, admin: A, poll_interval: Duration, idle_timeout: Duration) -> Self {
        let step = poll_interval.as_secs().max(1);
        let threshold = (idle_timeout.as_secs().div_ceil(step) as u32).max(1);

        Self {
            source,
            admin,
            poll_interval,
            threshold,
            consecutive_empty: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Runs until the stop command has fired or `stop_rx` signals that the
    /// server process is already gone. The first poll happens one full
    /// interval after start.
    pub async fn run(mut self, mut stop_rx: mpsc::UnboundedReceiver<()>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; skip it so the
        // server gets a full interval to boot before the first probe
        ticker.tick().await;

        info!(
            "Monitoring server player status (threshold: {} empty polls)",
            self.threshold
        );

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    info!("Server process exited, monitor standing down");
                    return;
                }
                _ = ticker.tick() => {
                    if self.observe_tick().await {
                        return;
                    }
                }
            }
        }
    }

    /// One poll. Returns true when the monitor's job is discharged (the
    /// stop command was issued, acknowledged or not).
    async fn observe_tick(&mut self) -> bool {
        match self.source.online_players().await {
            Err(e) => {
                // Could not determine status this tick; neither idle nor
                // active, leave the counter alone
                warn!("Status poll failed: {}", e);
                false
            }
            Ok(0) => {
                self.consecutive_empty += 1;
                debug!(
                    "Server empty ({}/{} polls)",
                    self.consecutive_empty, self.threshold
                );
                if self.consecutive_empty >= self.threshold {
                    self.fire_stop().await;
                    true
                } else {
                    false
                }
            }
            Ok(online) => {
                debug!("{} players online, resetting idle counter", online);
                self.consecutive_empty = 0;
                false
            }
        }
    }

    async fn fire_stop(&self) {
        info!(
            "Server has been empty for {} polls, shutting down",
            self.consecutive_empty
        );
        match self.admin.send_command("stop").await {
            Ok(reply) => info!("Server acknowledged stop: {}", reply.trim()),
            // Not retried; the monitor's one-shot trigger is discharged
            // whether or not the command was acknowledged
            Err(e) => error!("Remote stop command failed: {}", e),
        }
    }
}
