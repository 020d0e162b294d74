use serde::{Deserialize, Serialize};

use crate::protocol::MAX_MESSAGE_SIZE;

/// Default server address
pub const DEFAULT_ADDRESS: &str = "localhost:21212";

/// Default bound on dial + handshake
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Settings for opening a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server address (host:port)
    pub address: String,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Largest frame payload accepted or sent
    pub max_message_size: usize,

    /// Disable Nagle's algorithm on the socket
    pub nodelay: bool,

    /// Bound on dial + login handshake; calls themselves never time out
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            username: String::new(),
            password: String::new(),
            max_message_size: MAX_MESSAGE_SIZE,
            nodelay: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: normalize_address(address),
            ..Self::default()
        }
    }

    /// Defaults overridden by `VOLT_ADDRESS`, `VOLT_USERNAME`,
    /// `VOLT_PASSWORD` and `VOLT_MAX_MESSAGE_SIZE`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = lookup("VOLT_ADDRESS") {
            config.address = normalize_address(&address);
        }
        if let Some(username) = lookup("VOLT_USERNAME") {
            config.username = username;
        }
        if let Some(password) = lookup("VOLT_PASSWORD") {
            config.password = password;
        }
        if let Some(raw) = lookup("VOLT_MAX_MESSAGE_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.max_message_size = size,
                _ => tracing::warn!(
                    "Ignoring invalid VOLT_MAX_MESSAGE_SIZE '{}', using {}",
                    raw,
                    config.max_message_size
                ),
            }
        }

        config
    }
}

/// Trim whitespace and strip a copy-pasted scheme prefix
fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    trimmed
        .strip_prefix("tcp://")
        .unwrap_or(trimmed)
        .to_string()
}
