//! Packet framing: `<varint total_length><varint packet_id><payload>`
//!
//! `total_length` counts everything after itself, so the packet id is part
//! of the declared length. A frame whose buffer holds fewer bytes than
//! declared is malformed.

use crate::varint::{read_string, read_varint, write_string, write_varint};
use crate::ProtocolError;

/// Packet id of the handshake (serverbound) and of the status response
/// (clientbound) - both are zero in their respective phases.
pub const HANDSHAKE_PACKET_ID: u32 = 0x00;
/// Packet id of the status ping/pong exchange.
pub const PING_PACKET_ID: u32 = 0x01;
/// First byte of a pre-Netty legacy server list ping.
pub const LEGACY_PING_BYTE: u8 = 0xFE;

/// Upper bound on the declared frame length we will honour (matches the
/// protocol's own packet size limit). Anything larger is hostile.
pub const MAX_FRAME_LEN: u32 = (1 << 21) - 1;

/// The two leading varints of a frame, plus where they end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared byte length of packet id + payload.
    pub total_length: u32,
    pub packet_id: u32,
    /// Byte length of the `total_length` prefix itself.
    prefix_len: usize,
    /// Offset of the first payload byte.
    header_len: usize,
}

impl FrameHeader {
    /// Parses the leading fields of a raw buffer.
    ///
    /// Only the two varints are read here; use [`FrameHeader::payload`] to
    /// validate that the declared number of bytes actually arrived.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        let (total_length, prefix_len) = read_varint(buf, 0)?;
        if total_length > MAX_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame("declared length too large"));
        }

        let (packet_id, id_len) = read_varint(buf, prefix_len)?;
        let header_len = prefix_len + id_len;
        if (total_length as usize) < id_len {
            return Err(ProtocolError::MalformedFrame(
                "declared length shorter than packet id",
            ));
        }

        Ok(Self {
            total_length,
            packet_id,
            prefix_len,
            header_len,
        })
    }

    /// Total number of buffer bytes this frame occupies once complete.
    pub fn frame_len(&self) -> usize {
        self.prefix_len + self.total_length as usize
    }

    /// Borrows the payload bytes, failing if fewer bytes are available than
    /// the frame declared.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        let end = self.frame_len();
        if end > buf.len() {
            return Err(ProtocolError::MalformedFrame(
                "fewer bytes available than declared",
            ));
        }
        Ok(&buf[self.header_len..end])
    }
}

/// Serializes a `(packet_id, payload)` pair into a length-prefixed frame.
///
/// The outer length prefix covers the packet id and the payload together.
pub fn build_frame(packet_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 5);
    write_varint(packet_id, &mut body);
    body.extend_from_slice(payload);

    let mut frame = Vec::with_capacity(body.len() + 5);
    write_varint(body.len() as u32, &mut frame);
    frame.extend_from_slice(&body);
    frame
}

/// An empty status request frame (packet id 0, no payload).
pub fn status_request_frame() -> Vec<u8> {
    build_frame(HANDSHAKE_PACKET_ID, &[])
}

/// True if the buffer starts a legacy (pre-varint-framing) server list
/// ping. These are dropped without a reply; that is a compatibility no-op,
/// not an error.
pub fn is_legacy_ping(buf: &[u8]) -> bool {
    buf.first() == Some(&LEGACY_PING_BYTE)
}

/// The client's declared next phase after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
}

/// The handshake packet: first packet of every modern connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    /// Address the client used to reach us. Parsed for framing correctness,
    /// otherwise ignored.
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl Handshake {
    /// Parses a handshake from a packet-id-0 payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut offset = 0;

        let (protocol_version, read) = read_varint(payload, offset)?;
        offset += read;

        let (server_address, read) = read_string(payload, offset)?;
        offset += read;

        if offset + 2 > payload.len() {
            return Err(ProtocolError::MalformedFrame("handshake missing port"));
        }
        let server_port = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        offset += 2;

        let (next_state, _) = read_varint(payload, offset)?;
        let next_state = match next_state {
            1 => NextState::Status,
            2 => NextState::Login,
            _ => return Err(ProtocolError::MalformedFrame("unknown next_state")),
        };

        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }

    /// Serializes this handshake into a complete frame, for outbound
    /// status probes.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        write_varint(self.protocol_version, &mut payload);
        write_string(&self.server_address, &mut payload);
        payload.extend_from_slice(&self.server_port.to_be_bytes());
        let state = match self.next_state {
            NextState::Status => 1,
            NextState::Login => 2,
        };
        write_varint(state, &mut payload);

        build_frame(HANDSHAKE_PACKET_ID, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame_layout() {
        let frame = build_frame(0x00, b"abc");
        // length = 1 byte of id + 3 bytes of payload
        assert_eq!(frame, vec![0x04, 0x00, b'a', b'b', b'c']);
    }

    #[test]
    fn test_build_frame_empty_payload() {
        assert_eq!(status_request_frame(), vec![0x01, 0x00]);
    }

    #[test]
    fn test_header_parse_roundtrip() {
        let frame = build_frame(0x01, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let header = FrameHeader::parse(&frame).unwrap();

        assert_eq!(header.packet_id, PING_PACKET_ID);
        assert_eq!(header.total_length, 9);
        assert_eq!(header.frame_len(), frame.len());
        assert_eq!(header.payload(&frame).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_header_truncated_payload() {
        let mut frame = build_frame(0x00, b"full payload");
        frame.truncate(frame.len() - 4);

        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(
            header.payload(&frame),
            Err(ProtocolError::MalformedFrame(
                "fewer bytes available than declared"
            ))
        );
    }

    #[test]
    fn test_header_rejects_oversized_declaration() {
        let mut buf = Vec::new();
        crate::varint::write_varint(MAX_FRAME_LEN + 1, &mut buf);
        buf.push(0x00);

        assert_eq!(
            FrameHeader::parse(&buf),
            Err(ProtocolError::MalformedFrame("declared length too large"))
        );
    }

    #[test]
    fn test_header_malformed_varint_propagates() {
        let result = FrameHeader::parse(&[0x80]);
        assert!(matches!(result, Err(ProtocolError::MalformedVarint(_))));
    }

    #[test]
    fn test_legacy_ping_detection() {
        assert!(is_legacy_ping(&[0xFE, 0x01]));
        assert!(!is_legacy_ping(&[0x10, 0x00]));
        assert!(!is_legacy_ping(&[]));
    }

    #[test]
    fn test_handshake_roundtrip() {
        let handshake = Handshake {
            protocol_version: 500,
            server_address: "mc.example.com".to_string(),
            server_port: 25565,
            next_state: NextState::Status,
        };

        let frame = handshake.to_frame();
        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header.packet_id, HANDSHAKE_PACKET_ID);

        let parsed = Handshake::parse(header.payload(&frame).unwrap()).unwrap();
        assert_eq!(parsed, handshake);
    }

    #[test]
    fn test_handshake_login_state() {
        let handshake = Handshake {
            protocol_version: 763,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NextState::Login,
        };

        let frame = handshake.to_frame();
        let header = FrameHeader::parse(&frame).unwrap();
        let parsed = Handshake::parse(header.payload(&frame).unwrap()).unwrap();
        assert_eq!(parsed.next_state, NextState::Login);
    }

    #[test]
    fn test_handshake_unknown_next_state() {
        let mut payload = Vec::new();
        crate::varint::write_varint(47, &mut payload);
        crate::varint::write_string("localhost", &mut payload);
        payload.extend_from_slice(&25565u16.to_be_bytes());
        crate::varint::write_varint(9, &mut payload);

        assert_eq!(
            Handshake::parse(&payload),
            Err(ProtocolError::MalformedFrame("unknown next_state"))
        );
    }

    #[test]
    fn test_handshake_missing_port() {
        let mut payload = Vec::new();
        crate::varint::write_varint(47, &mut payload);
        crate::varint::write_string("localhost", &mut payload);
        payload.push(0x63);

        assert_eq!(
            Handshake::parse(&payload),
            Err(ProtocolError::MalformedFrame("handshake missing port"))
        );
    }
}
