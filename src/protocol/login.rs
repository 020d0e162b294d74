//! Login handshake payloads

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;

/// Protocol version byte carried in the login frame
pub const PROTOCOL_VERSION: u8 = 1;

/// Password hash scheme byte carried in the login frame (1 = SHA-256)
pub const PASSWORD_HASH_VERSION: u8 = 1;

/// Service name requested at login
pub const DATABASE_SERVICE: &str = "database";

/// Login request sent once per connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub service: String,
    pub username: String,
    #[serde(with = "serde_bytes")]
    pub password_hash: Vec<u8>,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            service: DATABASE_SERVICE.to_string(),
            username: username.to_string(),
            password_hash: hash_password(password),
        }
    }
}

/// SHA-256 of the password
pub fn hash_password(password: &str) -> Vec<u8> {
    Sha256::digest(password.as_bytes()).to_vec()
}

/// Login response as it travels on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// 0 on success
    pub auth_code: u8,
    pub host_id: i32,
    pub connection_id: i64,
    #[serde(default)]
    pub cluster_start_timestamp: i64,
    pub leader_address: u32,
    pub build_string: String,
}

impl LoginResponse {
    pub fn accepted(data: &LoginData) -> Self {
        Self {
            auth_code: 0,
            host_id: data.host_id,
            connection_id: data.connection_id,
            cluster_start_timestamp: data.cluster_start_timestamp,
            leader_address: u32::from(data.leader_address),
            build_string: data.build_string.clone(),
        }
    }

    pub fn rejected(auth_code: u8) -> Self {
        Self {
            auth_code,
            host_id: -1,
            connection_id: -1,
            cluster_start_timestamp: 0,
            leader_address: 0,
            build_string: String::new(),
        }
    }
}

/// Session identity returned by the server at login; immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginData {
    pub host_id: i32,
    pub connection_id: i64,
    pub cluster_start_timestamp: i64,
    pub leader_address: Ipv4Addr,
    pub build_string: String,
}

impl From<LoginResponse> for LoginData {
    fn from(resp: LoginResponse) -> Self {
        Self {
            host_id: resp.host_id,
            connection_id: resp.connection_id,
            cluster_start_timestamp: resp.cluster_start_timestamp,
            leader_address: Ipv4Addr::from(resp.leader_address),
            build_string: resp.build_string,
        }
    }
}
