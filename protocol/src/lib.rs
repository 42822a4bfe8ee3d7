//! # Minecraft Wire Protocol Subset
//!
//! This library implements the small slice of the Minecraft Java Edition
//! protocol that the gate daemon needs to impersonate a stopped server:
//!
//! - **Varint codec** (`varint`): the protocol's variable-length integer
//!   encoding and length-prefixed UTF-8 strings. Pure functions, no I/O.
//! - **Frame reader/builder** (`frame`): length-prefixed packet framing,
//!   handshake parsing and the legacy-ping special case.
//! - **Status schema** (`status`): the typed JSON status response, the
//!   "server paused" responder and the login notice payload.
//!
//! All parsing is defensive. Hostile or truncated input surfaces as a
//! [`ProtocolError`] which callers are expected to treat as "drop this
//! connection" rather than a reason to stop listening.

pub mod frame;
pub mod status;
pub mod varint;

use thiserror::Error;

pub use frame::{
    build_frame, is_legacy_ping, status_request_frame, FrameHeader, Handshake, NextState,
    HANDSHAKE_PACKET_ID, LEGACY_PING_BYTE, PING_PACKET_ID,
};
pub use status::{login_notice_frame, parse_online_players, StatusResponse};
pub use varint::{read_string, read_varint, write_string, write_varint};

/// Errors produced while decoding inbound bytes.
///
/// Every variant is recoverable at the connection level: log it, drop the
/// connection, keep accepting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed varint: {0}")]
    MalformedVarint(&'static str),
    #[error("malformed string: {0}")]
    MalformedString(&'static str),
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
}
