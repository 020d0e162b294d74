//! MessagePack payload codecs
//!
//! Client side: `serialize_invocation`, `serialize_login_message`,
//! `deserialize_login_response`, `deserialize_response`.
//! Server side mirrors are kept here as well so tooling and tests speak the
//! exact same format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DriverError;
use super::login::{LoginData, LoginRequest, LoginResponse};
use super::response::ResponseFrame;
use crate::client::Handle;

/// Procedure invocation as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub handle: Handle,
    pub procedure: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Encode any message with named (map) serialization
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, DriverError> {
    rmp_serde::to_vec_named(msg)
        .map_err(|e| DriverError::ProtocolError(format!("Serialization failed: {}", e)))
}

/// Decode a message from a frame payload
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DriverError> {
    rmp_serde::from_slice(data)
        .map_err(|e| DriverError::ProtocolError(format!("Deserialization failed: {}", e)))
}

pub fn serialize_invocation(
    procedure: &str,
    handle: Handle,
    params: &[Value],
) -> Result<Vec<u8>, DriverError> {
    if procedure.is_empty() {
        return Err(DriverError::ProtocolError(
            "Procedure name must not be empty".to_string(),
        ));
    }
    encode_message(&Invocation {
        handle,
        procedure: procedure.to_string(),
        params: params.to_vec(),
    })
}

pub fn serialize_login_message(username: &str, password: &str) -> Result<Vec<u8>, DriverError> {
    encode_message(&LoginRequest::new(username, password))
}

/// Decode the handshake reply; a non-zero auth code is an `AuthError`
pub fn deserialize_login_response(data: &[u8]) -> Result<LoginData, DriverError> {
    let resp: LoginResponse = decode_message(data)
        .map_err(|e| DriverError::ProtocolError(format!("Invalid login response: {}", e)))?;

    if resp.auth_code != 0 {
        return Err(DriverError::AuthError(format!(
            "Login rejected with code {}",
            resp.auth_code
        )));
    }
    Ok(LoginData::from(resp))
}

pub fn deserialize_response(data: &[u8]) -> Result<ResponseFrame, DriverError> {
    decode_message(data)
}

// ==================== Server side ====================

pub fn deserialize_invocation(data: &[u8]) -> Result<Invocation, DriverError> {
    decode_message(data)
}

pub fn deserialize_login_message(data: &[u8]) -> Result<LoginRequest, DriverError> {
    decode_message(data)
}

pub fn serialize_login_response(resp: &LoginResponse) -> Result<Vec<u8>, DriverError> {
    encode_message(resp)
}

pub fn serialize_response(resp: &ResponseFrame) -> Result<Vec<u8>, DriverError> {
    encode_message(resp)
}
