// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `smarthub` - a store-and-forward hub for home-automation nodes.
//!
//! Small sensor and actuator nodes connect to the hub over TCP from time to
//! time. Each connection carries exactly one binary message and at most one
//! response. The hub keeps, per device:
//!
//! - the last value of every peripheral it reported
//! - the set of devices subscribed to its updates
//! - a mailbox of entries waiting for its next GET
//!
//! # Supported Operations
//!
//! - **Handshake**: a node announces its identity and receives a one-byte UID
//! - **GET**: collect the mailbox
//! - **POST**: report `PERIPHERAL_S` / `PERIPHERAL_C` readings, which are
//!   copied into every subscriber's mailbox
//! - **SUBSCRIBE / UNSUBSCRIBE**: follow or stop following other devices
//! - **Relay**: any message addressed to another UID lands in its mailbox
//!
//! # Quick Start
//!
//! ## Running a Hub
//!
//! ```no_run
//! use smarthub::broker::Broker;
//!
//! #[tokio::main]
//! async fn main() -> smarthub::Result<()> {
//!     let broker = Broker::builder()
//!         .port(9000)
//!         .data_dir("/var/lib/smarthub")
//!         .build()
//!         .await?;
//!
//!     broker.run().await
//! }
//! ```
//!
//! ## Talking to a Hub
//!
//! ```no_run
//! use smarthub::client::HubClient;
//! use smarthub::state::PeripheralReading;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), smarthub::ProtocolError> {
//!     let hub = HubClient::new("192.168.1.10:9000");
//!     let uid = hub.handshake("porch_light").await?;
//!
//!     hub.subscribe(uid, &["garden_temp"]).await?;
//!     hub.post_readings(uid, &[PeripheralReading::control("LED", "ON")])
//!         .await?;
//!
//!     let mail = hub.get(uid).await?;
//!     println!("{}", mail.payload_str());
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;

pub use broker::{Broker, BrokerBuilder, BrokerConfig};
pub use client::{HubClient, PeripheralProvider};
pub use dispatcher::{Dispatcher, DispatcherConfig, Routed};
pub use error::{
    DecodeError, Error, ProtocolError, RegistryError, Result, RoutingError, StoreError,
};
pub use event::{EventBus, HubEvent};
pub use protocol::{Message, MessageCodec, MessageType};
pub use registry::{Registry, RegistrySnapshot};
pub use state::{DeviceRecord, PeripheralKind, PeripheralReading, Records};
pub use store::{DeviceStore, FileStore, MemoryStore};
pub use types::{Flags, Lifecycle, Uid};
