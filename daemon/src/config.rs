//! Configuration loading from `server.properties`
//!
//! The gate reuses the real server's own properties file so the two can
//! never disagree about the port or the RCON credentials. Everything here
//! runs once before the gate starts; any violation is fatal.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Fatal, pre-start configuration failures. The process must not enter the
/// listening state with any of these outstanding.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("required property `{0}` is missing")]
    MissingKey(&'static str),
    #[error("property `{key}` is not a valid number: `{value}`")]
    NotNumeric { key: &'static str, value: String },
    #[error("rcon is not enabled; set enable-rcon=true in server.properties")]
    RconDisabled,
}

/// Everything the gate consumes, validated and immutable. Constructed once
/// at startup and passed by reference from there on.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Address the listener binds to (`server-ip`, default `0.0.0.0`).
    pub bind_address: String,
    /// The real server's public port; the gate borrows it while the server
    /// is stopped.
    pub server_port: u16,
    pub motd: String,
    /// Raw PNG bytes of the server icon, if one exists on disk.
    pub icon: Option<Vec<u8>>,
    pub rcon_port: u16,
    pub rcon_password: String,
    /// How long the server may sit empty before it is stopped.
    pub idle_timeout: Duration,
    /// Shell command that launches the real server.
    pub launch_command: String,
}

/// Parses `key=value` lines into a string map. Blank lines and `#` comments
/// are skipped; lines without `=` are ignored, matching how the server
/// itself treats the file.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    properties
}

impl GateConfig {
    /// Loads and validates the configuration from a properties file.
    ///
    /// `icon_path` is probed for existence; a missing icon is not an error,
    /// the favicon field is simply omitted from status responses.
    pub fn load(
        properties_path: &str,
        icon_path: &str,
        idle_timeout: Duration,
        launch_command: String,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(properties_path).map_err(|source| {
            ConfigError::Unreadable {
                path: properties_path.to_string(),
                source,
            }
        })?;

        let icon = if Path::new(icon_path).exists() {
            Some(
                std::fs::read(icon_path).map_err(|source| ConfigError::Unreadable {
                    path: icon_path.to_string(),
                    source,
                })?,
            )
        } else {
            None
        };

        Self::from_properties(&parse_properties(&text), icon, idle_timeout, launch_command)
    }

    /// Validates a parsed property map. Split out from [`GateConfig::load`]
    /// so validation is testable without touching the filesystem.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        icon: Option<Vec<u8>>,
        idle_timeout: Duration,
        launch_command: String,
    ) -> Result<Self, ConfigError> {
        let server_port = required_port(properties, "server-port")?;

        if properties.get("enable-rcon").map(String::as_str) != Some("true") {
            return Err(ConfigError::RconDisabled);
        }
        let rcon_port = required_port(properties, "rcon.port")?;
        let rcon_password = properties
            .get("rcon.password")
            .filter(|password| !password.is_empty())
            .ok_or(ConfigError::MissingKey("rcon.password"))?
            .clone();

        let bind_address = match properties.get("server-ip").map(String::as_str) {
            None | Some("") => "0.0.0.0".to_string(),
            Some(address) => address.to_string(),
        };
        let motd = properties.get("motd").cloned().unwrap_or_default();

        Ok(Self {
            bind_address,
            server_port,
            motd,
            icon,
            rcon_port,
            rcon_password,
            idle_timeout,
            launch_command,
        })
    }
}

fn required_port(
    properties: &HashMap<String, String>,
    key: &'static str,
) -> Result<u16, ConfigError> {
    let value = properties.get(key).ok_or(ConfigError::MissingKey(key))?;
    value.parse::<u16>().map_err(|_| ConfigError::NotNumeric {
        key,
        value: value.clone(),
    })
}
