//! Remote administration capability
//!
//! The gate needs exactly one thing from the server's admin channel: the
//! ability to send a command string and read the text reply. That seam is a
//! trait so the idle monitor can be exercised without a live RCON endpoint.

use log::debug;
use rcon::Connection;
use tokio::net::TcpStream;

/// A boxed error that can cross task boundaries.
pub type AdminError = Box<dyn std::error::Error + Send + Sync>;

/// Capability to send one command string over an authenticated admin
/// session and receive its text reply.
#[allow(async_fn_in_trait)]
pub trait RemoteAdmin {
    async fn send_command(&self, command: &str) -> Result<String, AdminError>;
}

/// RCON-backed implementation. Opens a fresh authenticated session per
/// command; the gate issues a single command per server lifetime, so
/// connection reuse buys nothing.
#[derive(Debug, Clone)]
pub struct RconAdmin {
    address: String,
    password: String,
}

impl RconAdmin {
    pub fn new(host: &str, port: u16, password: String) -> Self {
        Self {
            address: format!("{}:{}", host, port),
            password,
        }
    }
}

impl RemoteAdmin for RconAdmin {
    async fn send_command(&self, command: &str) -> Result<String, AdminError> {
        debug!("Opening rcon session to {}", self.address);
        let mut connection =
            Connection::<TcpStream>::connect(&self.address, &self.password).await?;
        let reply = connection.cmd(command).await?;
        Ok(reply)
    }
}
