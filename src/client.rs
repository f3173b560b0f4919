// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device side of the exchange.
//!
//! Every call opens a fresh connection, sends one message and, where the hub
//! answers, waits a short while for the response. This is what an embedded
//! node does on each wake-up, and what the hub itself uses to push CONTROL
//! messages straight to a device.
//!
//! # Examples
//!
//! ```no_run
//! use smarthub::client::HubClient;
//! use smarthub::state::PeripheralReading;
//!
//! # async fn example() -> Result<(), smarthub::error::ProtocolError> {
//! let client = HubClient::new("192.168.1.10:9000");
//! let uid = client.handshake("garden_temp").await?;
//!
//! client
//!     .post_readings(uid, &[PeripheralReading::sensor("temp", "21.5")])
//!     .await?;
//!
//! let mail = client.get(uid).await?;
//! for entry in mail.payload_str().split(';').filter(|e| !e.is_empty()) {
//!     println!("{entry}");
//! }
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::ProtocolError;
use crate::protocol::{Message, MessageCodec, MessageType};
use crate::state::{PeripheralReading, RECORD_SEPARATOR};
use crate::types::Uid;

/// Default time to wait for the connection and for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can report peripheral values.
///
/// Devices implement this for whatever sensors and actuators they carry.
pub trait PeripheralProvider {
    /// Returns the current readings.
    fn readings(&mut self) -> Vec<PeripheralReading>;
}

fn join_records<S: AsRef<str>>(items: &[S]) -> String {
    let mut joined = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            joined.push(RECORD_SEPARATOR);
        }
        joined.push_str(item.as_ref());
    }
    joined
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn connect(addr: &str, limit: Duration) -> Result<Framed<TcpStream, MessageCodec>, ProtocolError> {
    let stream = tokio::time::timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::Timeout(millis(limit)))?
        .map_err(|e| ProtocolError::ConnectionFailed(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, MessageCodec))
}

/// Sends `message` to `addr` without waiting for an answer.
///
/// # Errors
///
/// Returns `ProtocolError` if the connection cannot be made or the message
/// cannot be written within `limit`.
pub async fn push(addr: SocketAddr, message: &Message, limit: Duration) -> Result<(), ProtocolError> {
    let exchange = async {
        let mut framed = connect(&addr.to_string(), limit).await?;
        framed.send(message.clone()).await?;
        framed.close().await
    };
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| ProtocolError::Timeout(millis(limit)))?
}

/// Client for one hub.
#[derive(Debug, Clone)]
pub struct HubClient {
    addr: String,
    timeout: Duration,
}

impl HubClient {
    /// Creates a client for the hub at `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the connect and response timeout (default: 2 seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the hub address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `message` and returns the response, if the hub sent one.
    ///
    /// `None` means the hub closed the connection without answering, or did
    /// not answer in time.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the connection fails or the response cannot
    /// be decoded.
    pub async fn exchange(&self, message: &Message) -> Result<Option<Message>, ProtocolError> {
        let mut framed = connect(&self.addr, self.timeout).await?;
        framed.send(message.clone()).await?;

        match tokio::time::timeout(self.timeout, framed.next()).await {
            Ok(Some(response)) => response.map(Some),
            Ok(None) => Ok(None),
            Err(_) => {
                tracing::debug!(addr = %self.addr, kind = %message.kind(), "No response from hub");
                Ok(None)
            }
        }
    }

    async fn expect_response(&self, message: &Message) -> Result<Message, ProtocolError> {
        self.exchange(message)
            .await?
            .ok_or(ProtocolError::ConnectionClosed)
    }

    // Waiting for the hub to close means the message has been applied.
    async fn send_to_hub(&self, source: Uid, kind: MessageType, payload: String) -> Result<(), ProtocolError> {
        let message = Message::new(source, Uid::SERVER, kind).with_payload(payload)?;
        self.exchange(&message).await.map(drop)
    }

    /// Announces `identity` and returns the UID the hub assigned.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ConnectionClosed` if the hub rejected the
    /// handshake.
    pub async fn handshake(&self, identity: &str) -> Result<Uid, ProtocolError> {
        let reply = self.expect_response(&Message::init(identity)?).await?;
        tracing::debug!(identity, uid = %reply.dest(), "Handshake complete");
        Ok(reply.dest())
    }

    /// Collects the mailbox of `uid`.
    ///
    /// The response carries the `ERROR` flag if the hub does not know `uid`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if no response arrives.
    pub async fn get(&self, uid: Uid) -> Result<Message, ProtocolError> {
        self.expect_response(&Message::new(uid, Uid::SERVER, MessageType::Get))
            .await
    }

    /// Reports peripheral readings.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Decode` if the readings do not fit in one
    /// message, or a transport error.
    pub async fn post_readings(&self, uid: Uid, readings: &[PeripheralReading]) -> Result<(), ProtocolError> {
        let segments: Vec<String> = readings.iter().map(ToString::to_string).collect();
        self.send_to_hub(uid, MessageType::Post, join_records(&segments))
            .await
    }

    /// Reports whatever `provider` currently reads.
    ///
    /// # Errors
    ///
    /// See [`post_readings`](Self::post_readings).
    pub async fn post_from(&self, uid: Uid, provider: &mut impl PeripheralProvider) -> Result<(), ProtocolError> {
        let readings = provider.readings();
        self.post_readings(uid, &readings).await
    }

    /// Tells the hub the device is alive.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn ping(&self, uid: Uid) -> Result<(), ProtocolError> {
        self.send_to_hub(uid, MessageType::Ping, String::new()).await
    }

    /// Subscribes `uid` to updates of every device in `targets`.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn subscribe(&self, uid: Uid, targets: &[&str]) -> Result<(), ProtocolError> {
        let kind = if targets.len() == 1 {
            MessageType::Subscribe
        } else {
            MessageType::SubscribeMulti
        };
        self.send_to_hub(uid, kind, join_records(targets))
            .await
    }

    /// Removes `uid` from the subscribers of every device in `targets`.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn unsubscribe(&self, uid: Uid, targets: &[&str]) -> Result<(), ProtocolError> {
        let kind = if targets.len() == 1 {
            MessageType::Unsubscribe
        } else {
            MessageType::UnsubscribeMulti
        };
        self.send_to_hub(uid, kind, join_records(targets))
            .await
    }

    /// Relays `payload` from `source` into the mailbox of `dest`.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn relay(&self, source: Uid, dest: Uid, kind: MessageType, payload: &str) -> Result<(), ProtocolError> {
        let message = Message::new(source, dest, kind).with_payload(payload)?;
        self.exchange(&message).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    struct Thermometer(f32);

    impl PeripheralProvider for Thermometer {
        fn readings(&mut self) -> Vec<PeripheralReading> {
            vec![
                PeripheralReading::sensor("temp", format!("{:.1}", self.0)),
                PeripheralReading::control("LED", "OFF"),
            ]
        }
    }

    async fn one_shot_server() -> (SocketAddr, tokio::task::JoinHandle<Message>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, MessageCodec);
            framed.next().await.unwrap().unwrap()
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn post_from_joins_readings() {
        let (addr, server) = one_shot_server().await;
        let client = HubClient::new(addr.to_string());

        client
            .post_from(Uid::new(3), &mut Thermometer(21.5))
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.kind(), MessageType::Post);
        assert_eq!(received.source(), Uid::new(3));
        assert_eq!(received.dest(), Uid::SERVER);
        assert_eq!(
            received.payload_str(),
            "PERIPHERAL_S:temp:21.5;PERIPHERAL_C:LED:OFF"
        );
    }

    #[tokio::test]
    async fn subscribe_picks_single_or_multi() {
        let (addr, server) = one_shot_server().await;
        HubClient::new(addr.to_string())
            .subscribe(Uid::new(3), &["a"])
            .await
            .unwrap();
        assert_eq!(server.await.unwrap().kind(), MessageType::Subscribe);

        let (addr, server) = one_shot_server().await;
        HubClient::new(addr.to_string())
            .unsubscribe(Uid::new(3), &["a", "b"])
            .await
            .unwrap();
        let received = server.await.unwrap();
        assert_eq!(received.kind(), MessageType::UnsubscribeMulti);
        assert_eq!(received.payload_str(), "a;b");
    }

    #[tokio::test]
    async fn push_delivers_message() {
        let (addr, server) = one_shot_server().await;
        let message = Message::new(Uid::WEBSITE, Uid::new(4), MessageType::Control)
            .with_payload("LED:ON")
            .unwrap();

        push(addr, &message, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(server.await.unwrap(), message);
    }

    #[tokio::test]
    async fn push_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let message = Message::new(Uid::WEBSITE, Uid::new(4), MessageType::Control);
        assert!(push(addr, &message, DEFAULT_TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn exchange_without_response_is_none() {
        let (addr, server) = one_shot_server().await;
        let client = HubClient::new(addr.to_string()).with_timeout(Duration::from_millis(500));

        let response = client
            .exchange(&Message::new(Uid::new(3), Uid::SERVER, MessageType::Ping))
            .await
            .unwrap();
        assert!(response.is_none());
        server.await.unwrap();
    }
}
