//! Typed status JSON schema and response builders
//!
//! The JSON wire schema is the only contract; internally the response is a
//! plain struct serialized through a single `serde_json` boundary.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::frame::{build_frame, HANDSHAKE_PACKET_ID};
use crate::varint::{read_string, write_string};
use crate::ProtocolError;

/// Version name reported while the real server is stopped.
const PAUSED_VERSION_NAME: &str = "1.19";

/// Bold line appended to the MOTD while the real server is stopped.
pub const PAUSED_NOTICE: &str = "\nServer paused, connect to restart";

/// Chat message sent to any client that attempts to log in.
pub const LOGIN_NOTICE: &str =
    "Server startup will now occur, please wait and reconnect shortly.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: Version,
    pub players: Players,
    pub description: Description,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    pub protocol: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Players {
    pub max: u32,
    pub online: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
    #[serde(default)]
    pub extra: Vec<ExtraText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraText {
    pub text: String,
    pub bold: bool,
}

impl StatusResponse {
    /// Builds the "server paused" status shown while the real server is
    /// stopped.
    ///
    /// Player counts are always zero (nobody can be online), and the
    /// client's own protocol version is echoed back so it does not render a
    /// version-mismatch warning. The favicon field is present only when an
    /// icon is configured.
    pub fn paused(motd: &str, client_protocol: u32, icon_png: Option<&[u8]>) -> Self {
        Self {
            version: Version {
                name: PAUSED_VERSION_NAME.to_string(),
                protocol: client_protocol,
            },
            players: Players { max: 0, online: 0 },
            description: Description {
                text: motd.to_string(),
                extra: vec![ExtraText {
                    text: PAUSED_NOTICE.to_string(),
                    bold: true,
                }],
            },
            favicon: icon_png.map(|bytes| format!("data:image/png;base64,{}", BASE64.encode(bytes))),
        }
    }

    /// Serializes this response into a packet-id-0 frame ready to write to
    /// the wire.
    pub fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        let json = serde_json::to_string(self)?;
        let mut payload = Vec::with_capacity(json.len() + 5);
        write_string(&json, &mut payload);
        Ok(build_frame(HANDSHAKE_PACKET_ID, &payload))
    }
}

/// Extracts `players.online` from a status-response payload.
///
/// Lenient on purpose: real servers vary wildly in what else they put in
/// the status JSON (string vs. object descriptions, mod lists, ...), so
/// only the player block is deserialized.
pub fn parse_online_players(payload: &[u8]) -> Result<u32, ProtocolError> {
    #[derive(Deserialize)]
    struct ProbedStatus {
        players: Players,
    }

    let (json, _) = read_string(payload, 0)?;
    let status: ProbedStatus = serde_json::from_str(&json)
        .map_err(|_| ProtocolError::MalformedFrame("status payload is not valid status JSON"))?;
    Ok(status.players.online)
}

/// The fixed login-disconnect frame sent on any login attempt, telling the
/// client that startup is in progress.
pub fn login_notice_frame() -> Vec<u8> {
    let json = serde_json::json!({ "text": LOGIN_NOTICE }).to_string();
    let mut payload = Vec::with_capacity(json.len() + 5);
    write_string(&json, &mut payload);
    build_frame(HANDSHAKE_PACKET_ID, &payload)
}
