// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker configuration and builder.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::{Error, Result};
use crate::event::EventBus;
use crate::store::{DeviceStore, FileStore};

use super::{Broker, Shared};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9000;

/// Configuration of a [`Broker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    host: String,
    port: u16,
    data_dir: Option<PathBuf>,
    read_timeout: Option<Duration>,
    shutdown_timeout: Duration,
    push_timeout: Duration,
    device_port: Option<u16>,
    subscribe_website: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: None,
            read_timeout: Some(Duration::from_secs(10)),
            shutdown_timeout: Duration::from_secs(10),
            push_timeout: Duration::from_secs(2),
            device_port: None,
            subscribe_website: true,
        }
    }
}

impl BrokerConfig {
    /// Returns the listening host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the listening port. Port 0 picks a free one.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the data directory, if records are kept on disk.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Returns how long a connection may take to deliver its message.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Returns how long shutdown waits for in-flight connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns how long a direct CONTROL push may take.
    #[must_use]
    pub fn push_timeout(&self) -> Duration {
        self.push_timeout
    }

    /// Returns the port devices accept pushed CONTROL messages on.
    #[must_use]
    pub fn device_port(&self) -> Option<u16> {
        self.device_port
    }

    /// Returns true if new devices are subscribed to by the website.
    #[must_use]
    pub fn subscribe_website(&self) -> bool {
        self.subscribe_website
    }

    fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            subscribe_website: self.subscribe_website,
            device_port: self.device_port,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("listening host is required".to_string()));
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config(
                "read timeout must be positive; disable it instead".to_string(),
            ));
        }
        if self.push_timeout.is_zero() {
            return Err(Error::Config("push timeout must be positive".to_string()));
        }
        if self.device_port == Some(0) {
            return Err(Error::Config("device port cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`Broker`].
///
/// Records are kept under [`data_dir`](Self::data_dir) unless a store is
/// given with [`store`](Self::store), which takes precedence.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use smarthub::broker::Broker;
///
/// # async fn example() -> smarthub::Result<()> {
/// let broker = Broker::builder()
///     .port(9000)
///     .data_dir("/var/lib/smarthub")
///     .read_timeout(Some(Duration::from_secs(5)))
///     .build()
///     .await?;
/// broker.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct BrokerBuilder {
    config: BrokerConfig,
    store: Option<Arc<dyn DeviceStore>>,
}

impl BrokerBuilder {
    /// Sets the listening host (default: `0.0.0.0`).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the listening port (default: 9000).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Keeps records as JSON files under `dir`.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// Keeps records in `store`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DeviceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the per-connection read deadline (default: 10 seconds).
    /// `None` waits forever.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets how long shutdown waits for in-flight connections
    /// (default: 10 seconds).
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the deadline of a direct CONTROL push (default: 2 seconds).
    #[must_use]
    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.config.push_timeout = timeout;
        self
    }

    /// Pushes CONTROL messages to devices on `port` before falling back to
    /// the mailbox. Disabled by default.
    #[must_use]
    pub fn device_port(mut self, port: Option<u16>) -> Self {
        self.config.device_port = port;
        self
    }

    /// Subscribes the website to every newly registered device
    /// (default: true).
    #[must_use]
    pub fn subscribe_website(mut self, enabled: bool) -> Self {
        self.config.subscribe_website = enabled;
        self
    }

    /// Opens the store, loads the registry and binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - Neither a data directory nor a store was given
    /// - The store or registry cannot be opened
    /// - The socket cannot be bound
    pub async fn build(self) -> Result<Broker> {
        let Self { config, store } = self;
        config.validate()?;

        let store: Arc<dyn DeviceStore> = match (store, config.data_dir()) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::open(dir)?),
            (None, None) => {
                return Err(Error::Config(
                    "a data directory or a store is required".to_string(),
                ));
            }
        };

        let events = EventBus::new();
        let dispatcher = Dispatcher::open(store, events, config.dispatcher_config())?;

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            devices = dispatcher.registry().len(),
            "Hub listening"
        );

        Ok(Broker {
            listener,
            shared: Arc::new(Shared { dispatcher, config }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 9000);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.device_port(), None);
        assert!(config.subscribe_website());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = BrokerConfig {
            read_timeout: Some(Duration::ZERO),
            ..BrokerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = BrokerConfig {
            push_timeout: Duration::ZERO,
            ..BrokerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn build_requires_storage() {
        let result = Broker::builder().host("127.0.0.1").port(0).build().await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn build_binds_ephemeral_port() {
        let broker = Broker::builder()
            .host("127.0.0.1")
            .port(0)
            .store(Arc::new(MemoryStore::new()))
            .build()
            .await
            .unwrap();
        assert_ne!(broker.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn build_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let _broker = Broker::builder()
            .host("127.0.0.1")
            .port(0)
            .data_dir(&data)
            .build()
            .await
            .unwrap();

        assert!(data.join("server.json").is_file());
        assert!(data.join("devices/website.json").is_file());
    }
}
