//! Wire protocol definitions for the driver
//!
//! Uses length-prefixed frames carrying MessagePack payloads.

pub mod codec;
pub mod error;
pub mod frame;
pub mod login;
pub mod response;

pub use codec::{
    decode_message, deserialize_login_response, deserialize_response, encode_message,
    serialize_invocation, serialize_login_message, Invocation,
};
pub use error::DriverError;
pub use frame::{
    read_frame, read_login_frame, write_frame, write_login_frame, LoginHeader, MAX_MESSAGE_SIZE,
};
pub use login::{LoginData, LoginRequest, LoginResponse};
pub use response::{Column, ExecResult, QueryResponse, ResponseFrame, ResponseStatus, Row, Table};
