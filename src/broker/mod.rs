// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TCP front-end of the hub.
//!
//! The [`Broker`] owns the listening socket. Each accepted connection gets
//! its own task which reads exactly one message, routes it and writes at
//! most one response before closing. Connections never share state except
//! through the [`Dispatcher`].
//!
//! # Examples
//!
//! ```no_run
//! use smarthub::broker::Broker;
//!
//! # async fn example() -> smarthub::Result<()> {
//! let broker = Broker::builder().data_dir("./hub-data").build().await?;
//!
//! let mut events = broker.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! broker.run().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

pub use config::{BrokerBuilder, BrokerConfig, DEFAULT_PORT};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::event::HubEvent;

/// State shared by every connection task.
#[derive(Debug)]
struct Shared {
    dispatcher: Dispatcher,
    config: BrokerConfig,
}

/// A bound, ready-to-run hub.
#[derive(Debug)]
pub struct Broker {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Broker {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    /// Returns the dispatcher, for inspecting the registry and records.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// Subscribes to hub events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.shared.dispatcher.events().subscribe()
    }

    /// Serves until CTRL+C.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and retried.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received CTRL+C, shutting down"),
                Err(e) => {
                    tracing::error!(error = %e, "Cannot listen for CTRL+C");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Serves until `shutdown` completes, then waits up to the configured
    /// shutdown timeout for in-flight connections.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and retried.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self { listener, shared } = self;
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Accepted connection");
                        tasks.spawn(connection::handle(stream, peer, Arc::clone(&shared)));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Error accepting connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        drop(listener);
        let in_flight = tasks.len();
        tracing::info!(in_flight, "Stopped accepting, draining connections");

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(shared.config.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            tracing::warn!(abandoned = tasks.len(), "Shutdown timeout reached, aborting connections");
            tasks.abort_all();
        }

        tracing::info!("Hub stopped");
        Ok(())
    }
}
