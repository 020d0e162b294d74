//! Driver connection
//!
//! A [`Connection`] owns one stream. Callers write requests through it; a
//! single background [`NetworkListener`] reads every response and hands it to
//! the [`PendingResult`] registered under the response's handle.
//!
//! Both call styles share one dispatch path: allocate a handle, register it,
//! write the frame. `query`/`exec` then wait on the result in place while
//! `query_async`/`exec_async` return it and keep it in the outstanding set
//! for a later [`Connection::drain`].

mod builder;
mod drain;
mod handle;
mod listener;
mod pending;

pub use builder::{Client, ConnectionBuilder};
pub use drain::wait_all;
pub use handle::{Handle, HandleAllocator};
pub use listener::{CallKind, Delivery};
pub use pending::{ExecFuture, Outcome, PendingResult, QueryFuture};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ConnectionConfig;
use crate::protocol::{codec, frame, DriverError, ExecResult, LoginData, QueryResponse};
use listener::{BoxedReader, NetworkListener, Registry};
use pending::OutstandingSet;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open driver connection
pub struct Connection {
    address: String,
    login: LoginData,
    config: ConnectionConfig,
    allocator: Arc<HandleAllocator>,
    /// Write half; `None` once closed
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    registry: Arc<Registry>,
    listener: tokio::sync::Mutex<NetworkListener>,
    queries: Arc<OutstandingSet<QueryResponse>>,
    execs: Arc<OutstandingSet<ExecResult>>,
    open: AtomicBool,
}

impl Connection {
    /// Connect to `config.address`, log in and start the listener.
    ///
    /// Dial and handshake together are bounded by `config.connect_timeout_ms`.
    pub async fn open(
        config: &ConnectionConfig,
        allocator: Arc<HandleAllocator>,
    ) -> Result<Self, DriverError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        match tokio::time::timeout(timeout, Self::dial(config, allocator)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::ConnectError(format!(
                "Timed out connecting to {} after {}ms",
                config.address, config.connect_timeout_ms
            ))),
        }
    }

    async fn dial(
        config: &ConnectionConfig,
        allocator: Arc<HandleAllocator>,
    ) -> Result<Self, DriverError> {
        let addrs = tokio::net::lookup_host(config.address.as_str())
            .await
            .map_err(|e| {
                DriverError::ConnectError(format!("Error resolving {}: {}", config.address, e))
            })?;

        // Try each resolved address in turn; `localhost` may resolve to ::1 first.
        let mut last_err = None;
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    tracing::debug!("Failed to connect to {}: {}", addr, e);
                    last_err = Some(format!("Failed to connect to {}: {}", addr, e));
                }
            }
        }
        let stream = connected.ok_or_else(|| {
            DriverError::ConnectError(last_err.unwrap_or_else(|| {
                format!("No address found for {}", config.address)
            }))
        })?;
        stream.set_nodelay(config.nodelay).map_err(|e| {
            DriverError::ConnectError(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let (read, write) = stream.into_split();
        Self::login(Box::new(read), Box::new(write), config, allocator).await
    }

    /// Log in over an already established stream and start the listener
    pub async fn handshake<S>(
        stream: S,
        config: &ConnectionConfig,
        allocator: Arc<HandleAllocator>,
    ) -> Result<Self, DriverError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::login(Box::new(read), Box::new(write), config, allocator).await
    }

    async fn login(
        mut reader: BoxedReader,
        mut writer: BoxedWriter,
        config: &ConnectionConfig,
        allocator: Arc<HandleAllocator>,
    ) -> Result<Self, DriverError> {
        let login = codec::serialize_login_message(&config.username, &config.password)?;
        frame::write_login_frame(&mut writer, &login, config.max_message_size)
            .await
            .map_err(|e| DriverError::ConnectError(format!("Failed to send login: {}", e)))?;

        let payload = frame::read_frame(&mut reader, config.max_message_size)
            .await
            .map_err(|e| {
                DriverError::ProtocolError(format!("Failed to read login response: {}", e))
            })?;
        let login_data = codec::deserialize_login_response(&payload)?;

        tracing::info!(
            "Connected to {} (host {}, connection {}, build {})",
            config.address,
            login_data.host_id,
            login_data.connection_id,
            login_data.build_string
        );

        Ok(Self::from_parts(
            reader,
            writer,
            login_data,
            config.clone(),
            allocator,
        ))
    }

    /// Assemble an open connection around an authenticated stream
    fn from_parts(
        reader: BoxedReader,
        writer: BoxedWriter,
        login: LoginData,
        config: ConnectionConfig,
        allocator: Arc<HandleAllocator>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let listener = NetworkListener::start(reader, registry.clone(), config.max_message_size);

        Self {
            address: config.address.clone(),
            login,
            config,
            allocator,
            writer: tokio::sync::Mutex::new(Some(writer)),
            registry,
            listener: tokio::sync::Mutex::new(listener),
            queries: Arc::new(OutstandingSet::new()),
            execs: Arc::new(OutstandingSet::new()),
            open: AtomicBool::new(true),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Session identity acquired at login
    pub fn login_data(&self) -> &LoginData {
        &self.login
    }

    /// False once closed, or once the listener has stopped on its own
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.registry.is_closed()
    }

    /// Responses dropped because no call was registered under their handle
    pub fn orphaned_responses(&self) -> u64 {
        self.registry.orphaned()
    }

    /// Run a procedure and wait for its result set
    pub async fn query(
        &self,
        procedure: &str,
        params: &[Value],
    ) -> Result<QueryResponse, DriverError> {
        let pending = self.dispatch::<QueryResponse>(procedure, params, None).await?;
        pending.get().await
    }

    /// Run a procedure without waiting; the returned future is also kept
    /// in [`Connection::outstanding_queries`] until it resolves
    pub async fn query_async(
        &self,
        procedure: &str,
        params: &[Value],
    ) -> Result<Arc<QueryFuture>, DriverError> {
        self.dispatch(procedure, params, Some(&self.queries)).await
    }

    /// Run a modifying procedure and wait for its row count
    pub async fn exec(&self, procedure: &str, params: &[Value]) -> Result<ExecResult, DriverError> {
        let pending = self.dispatch::<ExecResult>(procedure, params, None).await?;
        pending.get().await
    }

    /// Run a modifying procedure without waiting
    pub async fn exec_async(
        &self,
        procedure: &str,
        params: &[Value],
    ) -> Result<Arc<ExecFuture>, DriverError> {
        self.dispatch(procedure, params, Some(&self.execs)).await
    }

    /// Snapshot of the query futures that have not resolved yet
    pub fn outstanding_queries(&self) -> Vec<Arc<QueryFuture>> {
        self.queries.snapshot()
    }

    /// Snapshot of the exec futures that have not resolved yet
    pub fn outstanding_execs(&self) -> Vec<Arc<ExecFuture>> {
        self.execs.snapshot()
    }

    /// Allocate, register, write. A request that could not be written is
    /// deregistered before the error is returned, so nothing waits on it.
    async fn dispatch<T: Outcome>(
        &self,
        procedure: &str,
        params: &[Value],
        outstanding: Option<&Arc<OutstandingSet<T>>>,
    ) -> Result<Arc<PendingResult<T>>, DriverError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(DriverError::ConnectionClosed);
        }
        if let Some(reason) = self.registry.closed_reason() {
            return Err(DriverError::ConnectionLost(reason));
        }

        let handle = self.allocator.next();
        let payload = codec::serialize_invocation(procedure, handle, params)?;

        let rx = self.registry.register(handle, T::KIND)?;
        let pending = Arc::new(PendingResult::new(
            handle,
            rx,
            outstanding.map_or_else(Weak::new, Arc::downgrade),
        ));
        if let Some(set) = outstanding {
            set.insert(pending.clone());
        }

        tracing::debug!(handle, procedure, "Dispatching call");
        if let Err(e) = self.send(&payload).await {
            self.registry.remove(handle);
            if let Some(set) = outstanding {
                set.remove(handle);
            }
            tracing::warn!(handle, procedure, "Failed to send call: {}", e);
            return Err(e);
        }

        Ok(pending)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), DriverError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(DriverError::ConnectionClosed)?;
        frame::write_frame(writer, payload, self.config.max_message_size).await
    }

    /// Stop the listener, fail everything still in flight with
    /// `ConnectionLost`, then close the stream.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), DriverError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Closing connection to {}", self.address);

        // Barrier: after this no delivery can race the teardown below.
        self.listener.lock().await.stop().await;

        let queries = wait_all(self.queries.snapshot()).await;
        let execs = wait_all(self.execs.snapshot()).await;
        if queries + execs > 0 {
            tracing::debug!(queries, execs, "Failed in-flight calls on close");
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer
                .shutdown()
                .await
                .map_err(|e| DriverError::SendError(format!("Shutdown failed: {}", e)))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("connection_id", &self.login.connection_id)
            .field("open", &self.is_open())
            .finish()
    }
}
