//! # Gate Daemon Library
//!
//! This library implements a demand-activated front for a Minecraft
//! server. While the real server is stopped the daemon holds its public
//! port, answering status pings with a "server paused" MOTD. The first
//! login attempt hands the port over: the listener closes, the real
//! server is launched, and an idle monitor starts polling it. Once the
//! server has sat empty past the configured timeout, the monitor stops it
//! over RCON and the daemon takes the port back.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Loads and validates `server.properties`. All failures here are fatal
//! and happen before anything listens.
//!
//! ### Gate Module (`gate`)
//! The lifecycle controller: sequential accept loop, handshake dispatch,
//! the listener/server port handoff and the server session supervision.
//!
//! ### Monitor Module (`monitor`)
//! The idle monitor task and the status probe it polls with, plus the
//! consecutive-empty-poll counting that decides when to stop the server.
//!
//! ### Admin Module (`admin`)
//! The remote-administration seam (send one command, read one reply) and
//! its RCON implementation.
//!
//! ### Process Module (`process`)
//! Launching the wrapped server command and holding its handle.
//!
//! The wire protocol itself (varints, framing, the status JSON schema)
//! lives in the `protocol` crate.

pub mod admin;
pub mod config;
pub mod gate;
pub mod monitor;
pub mod process;
