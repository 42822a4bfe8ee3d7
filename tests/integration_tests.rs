//! Integration tests for the gate daemon and protocol crates
//!
//! These tests validate cross-component interactions over real TCP
//! sockets: the status probe against a scripted server, and the full gate
//! lifecycle (listen, status, login handoff, re-listen).

use std::time::Duration;

use daemon::config::GateConfig;
use daemon::gate::Gate;
use daemon::monitor::{PlayerCountSource, StatusProbe};
use protocol::frame::{status_request_frame, FrameHeader, Handshake, NextState};
use protocol::status::{StatusResponse, PAUSED_NOTICE};
use protocol::varint::read_string;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

/// Reads one complete frame, returning its packet id and payload.
///
/// `buf` carries bytes left over from a previous read on the same stream;
/// consecutive frames can arrive coalesced into a single read, so callers
/// reading more than one frame must reuse the same buffer.
async fn read_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> (u32, Vec<u8>) {
    let mut chunk = [0u8; 4096];

    loop {
        if let Ok(header) = FrameHeader::parse(buf) {
            if header.frame_len() <= buf.len() {
                let payload = header.payload(buf).unwrap().to_vec();
                let packet_id = header.packet_id;
                buf.drain(..header.frame_len());
                return (packet_id, payload);
            }
        }

        let n = stream.read(&mut chunk).await.expect("read failed");
        assert!(n > 0, "connection closed before a complete frame");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Performs a raw status exchange against `addr` and returns the JSON.
async fn query_status(addr: &str, protocol_version: u32) -> serde_json::Value {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");

    let handshake = Handshake {
        protocol_version,
        server_address: "localhost".to_string(),
        server_port: 25565,
        next_state: NextState::Status,
    };
    stream.write_all(&handshake.to_frame()).await.unwrap();
    stream.write_all(&status_request_frame()).await.unwrap();

    let (packet_id, payload) = read_frame(&mut stream, &mut Vec::new()).await;
    assert_eq!(packet_id, 0);

    let (json, _) = read_string(&payload, 0).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn gate_config(port: u16, motd: &str, launch_command: &str) -> GateConfig {
    GateConfig {
        bind_address: "127.0.0.1".to_string(),
        server_port: port,
        motd: motd.to_string(),
        icon: None,
        rcon_port: 25575,
        rcon_password: "secret".to_string(),
        idle_timeout: Duration::from_secs(600),
        launch_command: launch_command.to_string(),
    }
}

/// STATUS PROBE TESTS
mod probe_tests {
    use super::*;

    /// A scripted server that answers one status exchange with the given
    /// online count, using the same protocol crate from the other side.
    async fn scripted_status_server(listener: TcpListener, online: u32) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        // Handshake frame, then the empty status request
        let (packet_id, payload) = read_frame(&mut stream, &mut buf).await;
        assert_eq!(packet_id, 0);
        let handshake = Handshake::parse(&payload).unwrap();
        assert_eq!(handshake.next_state, NextState::Status);

        let (packet_id, _) = read_frame(&mut stream, &mut buf).await;
        assert_eq!(packet_id, 0);

        let mut status = StatusResponse::paused("scripted", handshake.protocol_version, None);
        status.players.online = online;
        status.players.max = 20;
        stream.write_all(&status.to_frame().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn probe_reads_online_count() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(scripted_status_server(listener, 7));

        let probe = StatusProbe::new("127.0.0.1", addr.port());
        let online = probe.online_players().await.unwrap();

        assert_eq!(online, 7);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn probe_times_out_against_silent_server() {
        // Accepts but never answers; the probe must give up on its own
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            sleep(Duration::from_secs(30)).await;
        });

        let probe = StatusProbe::new("127.0.0.1", addr.port())
            .with_timeout(Duration::from_millis(200));
        let result = timeout(Duration::from_secs(5), probe.online_players()).await;

        assert!(result.expect("probe did not honour its timeout").is_err());
        server.abort();
    }

    #[tokio::test]
    async fn probe_fails_cleanly_when_nothing_listens() {
        let probe = StatusProbe::new("127.0.0.1", 1).with_timeout(Duration::from_millis(500));
        assert!(probe.online_players().await.is_err());
    }
}

/// GATE LIFECYCLE TESTS
mod gate_lifecycle_tests {
    use super::*;

    // Fixed ports; the gate binds the configured server port by design
    const STATUS_PORT: u16 = 47821;
    const CYCLE_PORT: u16 = 47822;

    #[tokio::test]
    async fn gate_answers_status_with_paused_motd() {
        let gate = Gate::new(gate_config(STATUS_PORT, "Integration MOTD", "true"));
        let gate_task = tokio::spawn(async move { gate.run().await });
        sleep(Duration::from_millis(200)).await;

        let json = query_status(&format!("127.0.0.1:{}", STATUS_PORT), 47).await;

        assert_eq!(json["players"]["online"], 0);
        assert_eq!(json["players"]["max"], 0);
        assert_eq!(json["version"]["protocol"], 47);
        assert_eq!(json["description"]["text"], "Integration MOTD");
        assert_eq!(json["description"]["extra"][0]["text"], PAUSED_NOTICE);
        assert_eq!(json["description"]["extra"][0]["bold"], true);

        gate_task.abort();
    }

    /// The full cycle: a login attempt releases the port, the child runs,
    /// and after it exits the gate takes the port back.
    #[tokio::test]
    async fn gate_hands_port_over_and_reclaims_it() {
        // The "server" is a short sleep; it never binds the port itself,
        // so a refused connection proves the gate's listener is gone
        let gate = Gate::new(gate_config(CYCLE_PORT, "motd", "sleep 1"));
        let gate_task = tokio::spawn(async move { gate.run().await });
        sleep(Duration::from_millis(200)).await;

        let addr = format!("127.0.0.1:{}", CYCLE_PORT);

        // Login attempt: the client gets the startup notice
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        let handshake = Handshake {
            protocol_version: 763,
            server_address: "localhost".to_string(),
            server_port: CYCLE_PORT,
            next_state: NextState::Login,
        };
        stream.write_all(&handshake.to_frame()).await.unwrap();
        let (packet_id, payload) = read_frame(&mut stream, &mut Vec::new()).await;
        assert_eq!(packet_id, 0);
        let (json, _) = read_string(&payload, 0).unwrap();
        assert!(json.contains("reconnect shortly"));
        drop(stream);

        // Listener must be closed before/while the child runs
        sleep(Duration::from_millis(400)).await;
        assert!(
            TcpStream::connect(&addr).await.is_err(),
            "port still accepting while the real server owns it"
        );

        // Child exits after ~1s, gate waits ~1s for the port, re-binds
        sleep(Duration::from_millis(2500)).await;
        let json = query_status(&addr, 47).await;
        assert_eq!(json["players"]["online"], 0);

        gate_task.abort();
    }
}
