use std::sync::Arc;

use super::handle::HandleAllocator;
use super::Connection;
use crate::config::ConnectionConfig;
use crate::protocol::DriverError;

/// Builder for opening a [`Connection`] with additional options
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    allocator: Option<Arc<HandleAllocator>>,
}

impl ConnectionBuilder {
    /// Create a new builder
    pub fn new(addr: &str) -> Self {
        Self::from_config(ConnectionConfig::new(addr))
    }

    pub fn from_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            allocator: None,
        }
    }

    /// Set login credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.config.username = username.to_string();
        self.config.password = password.to_string();
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set connection timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Share a handle allocator with other connections.
    ///
    /// Without one the connection gets its own, and handles are only unique
    /// within it.
    pub fn handle_allocator(mut self, allocator: Arc<HandleAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Open the connection
    pub async fn connect(self) -> Result<Connection, DriverError> {
        let allocator = self
            .allocator
            .unwrap_or_else(|| Arc::new(HandleAllocator::new()));
        Connection::open(&self.config, allocator).await
    }
}

/// Process-level driver context.
///
/// Holds the configuration and the handle allocator shared by every
/// connection it opens, so handles stay unique across connections. It is not
/// a pool: each [`Connection`] is independent.
#[derive(Debug, Clone)]
pub struct Client {
    config: ConnectionConfig,
    allocator: Arc<HandleAllocator>,
}

impl Client {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_allocator(config, Arc::new(HandleAllocator::new()))
    }

    pub fn with_allocator(config: ConnectionConfig, allocator: Arc<HandleAllocator>) -> Self {
        Self { config, allocator }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<HandleAllocator> {
        &self.allocator
    }

    /// Open a connection to the configured address
    pub async fn connect(&self) -> Result<Connection, DriverError> {
        Connection::open(&self.config, self.allocator.clone()).await
    }

    /// Open a connection to another address with the same settings
    pub async fn connect_to(&self, address: &str) -> Result<Connection, DriverError> {
        ConnectionBuilder::from_config(ConnectionConfig {
            address: address.to_string(),
            ..self.config.clone()
        })
        .handle_allocator(self.allocator.clone())
        .connect()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chained() {
        let allocator = Arc::new(HandleAllocator::new());
        let builder = ConnectionBuilder::new("127.0.0.1:21212")
            .credentials("admin", "secret")
            .max_message_size(4096)
            .nodelay(false)
            .connect_timeout_ms(250)
            .handle_allocator(allocator.clone());

        assert_eq!(builder.config.address, "127.0.0.1:21212");
        assert_eq!(builder.config.username, "admin");
        assert_eq!(builder.config.password, "secret");
        assert_eq!(builder.config.max_message_size, 4096);
        assert!(!builder.config.nodelay);
        assert_eq!(builder.config.connect_timeout_ms, 250);
        assert!(Arc::ptr_eq(builder.allocator.as_ref().unwrap(), &allocator));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ConnectionBuilder::new(&addr.to_string())
            .connect_timeout_ms(2_000)
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ConnectError(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_connect_error() {
        let client = Client::new(ConnectionConfig::new("not a host"));
        assert!(matches!(
            client.connect().await,
            Err(DriverError::ConnectError(_))
        ));
    }
}
