//! Length-prefixed framing
//!
//! - **Frame**: `[length: 4 bytes BE][payload]`
//! - **Login frame**: `[length: 4 bytes BE][protocol version][password hash version][payload]`,
//!   where the two version bytes are counted in the length
//!
//! Writers are not synchronized here; the connection serializes access to its
//! write half.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::DriverError;
use super::login::{PASSWORD_HASH_VERSION, PROTOCOL_VERSION};

/// Maximum payload size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Build a frame: length prefix followed by the payload
pub fn encode_frame(payload: &[u8], max_size: usize) -> Result<Vec<u8>, DriverError> {
    if payload.len() > max_size {
        return Err(DriverError::MessageTooLarge);
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Build a login frame with the version bytes folded into the length
pub fn encode_login_frame(payload: &[u8], max_size: usize) -> Result<Vec<u8>, DriverError> {
    let length = payload.len() + 2;
    if length > max_size {
        return Err(DriverError::MessageTooLarge);
    }

    let mut buf = Vec::with_capacity(4 + length);
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.push(PROTOCOL_VERSION);
    buf.push(PASSWORD_HASH_VERSION);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write one frame. A single copy plus a single write keeps the frame contiguous.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_size: usize) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let data = encode_frame(payload, max_size)?;
    write_all_flush(writer, &data).await
}

/// Write the login frame
pub async fn write_login_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_size: usize,
) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let data = encode_login_frame(payload, max_size)?;
    write_all_flush(writer, &data).await
}

async fn write_all_flush<W>(writer: &mut W, data: &[u8]) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer
        .write_all(data)
        .await
        .map_err(|e| DriverError::SendError(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| DriverError::SendError(format!("Flush failed: {}", e)))
}

async fn read_length<R>(reader: &mut R, max_size: usize) -> Result<usize, DriverError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DriverError::ConnectionLost(format!("Read length failed: {}", e)))?;

    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > max_size {
        return Err(DriverError::MessageTooLarge);
    }
    Ok(msg_len)
}

/// Read exactly one frame and return its payload
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, DriverError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let msg_len = read_length(reader, max_size).await?;

    let mut payload = vec![0u8; msg_len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| DriverError::ConnectionLost(format!("Read payload failed: {}", e)))?;
    Ok(payload)
}

/// Header bytes of a login frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginHeader {
    pub protocol_version: u8,
    pub password_hash_version: u8,
}

/// Read a login frame (server side of the handshake)
pub async fn read_login_frame<R>(
    reader: &mut R,
    max_size: usize,
) -> Result<(LoginHeader, Vec<u8>), DriverError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let msg_len = read_length(reader, max_size).await?;
    if msg_len < 2 {
        return Err(DriverError::ProtocolError(format!(
            "Login frame too short: {} bytes",
            msg_len
        )));
    }

    let mut body = vec![0u8; msg_len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| DriverError::ConnectionLost(format!("Read login frame failed: {}", e)))?;

    let header = LoginHeader {
        protocol_version: body[0],
        password_hash_version: body[1],
    };
    body.drain(..2);
    Ok((header, body))
}
