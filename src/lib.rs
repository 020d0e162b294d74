//! Asynchronous client driver for a binary stored-procedure database protocol.
//!
//! One [`Connection`] multiplexes many calls over a single stream. Requests
//! carry a process-unique handle; a background listener matches each
//! response to the [`PendingResult`] registered under that handle, so replies
//! may arrive in any order.
//!
//! ```no_run
//! use serde_json::json;
//! use volt_driver::{Client, ConnectionConfig};
//!
//! # async fn run() -> Result<(), volt_driver::DriverError> {
//! let client = Client::new(ConnectionConfig::new("localhost:21212"));
//! let conn = client.connect().await?;
//!
//! conn.exec("HELLOWORLD.insert", &[json!("Hej"), json!("Verden"), json!("Danish")]).await?;
//! let pending = conn.query_async("HELLOWORLD.select", &[json!("Danish")]).await?;
//! conn.drain_all().await;
//!
//! let response = pending.get().await?;
//! println!("{} table(s)", response.table_count());
//! conn.close().await
//! # }
//! ```

pub mod client;
pub mod config;
pub mod protocol;

pub use client::{
    wait_all, Client, Connection, ConnectionBuilder, ExecFuture, Handle, HandleAllocator,
    PendingResult, QueryFuture,
};
pub use config::ConnectionConfig;
pub use protocol::{DriverError, ExecResult, LoginData, QueryResponse, ResponseStatus, Row, Table};
