// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of decoded messages.
//!
//! The [`Dispatcher`] turns one decoded [`Message`] into registry and record
//! mutations plus at most one response. It is synchronous: the broker runs it
//! on the blocking pool because store access is blocking I/O.
//!
//! Routing decisions, in order:
//!
//! 1. Destination is not the hub: the payload is relayed into the
//!    destination's mailbox, or pushed to the device for CONTROL when direct
//!    push is enabled.
//! 2. `IS_INIT_MSG` is set: the payload is the device identity. The device is
//!    registered if needed and told its UID.
//! 3. Otherwise the message is an operation of its source device: GET, POST,
//!    PING and the (un)subscription family.
//!
//! Lookup misses and malformed input are logged and skipped. Only store and
//! registry failures are returned as errors.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::{Error, Result, RoutingError, StoreError};
use crate::event::{EventBus, HubEvent};
use crate::protocol::{MAX_PAYLOAD_SIZE, Message, MessageType};
use crate::registry::{Registry, WEBSITE_NAME};
use crate::state::{DeviceRecord, FIELD_SEPARATOR, PeripheralReading, Records, parse_readings, split_records};
use crate::store::DeviceStore;
use crate::types::{Flags, Uid};

/// Routing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Subscribe the website consumer to every newly registered device.
    pub subscribe_website: bool,
    /// Port devices listen on for pushed CONTROL messages. `None` queues
    /// every CONTROL message in the mailbox.
    pub device_port: Option<u16>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            subscribe_website: true,
            device_port: None,
        }
    }
}

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Write this response, then close.
    Reply(Message),
    /// Close without responding.
    Silent,
    /// Push `message` to `addr`. If that fails, hand the message back to
    /// [`Dispatcher::deliver_to_mailbox`].
    Forward {
        /// Device address.
        addr: SocketAddr,
        /// Message to push, unchanged.
        message: Message,
    },
}

/// Routes decoded messages against the registry and the device records.
///
/// # Examples
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use std::sync::Arc;
///
/// use smarthub::dispatcher::{Dispatcher, DispatcherConfig, Routed};
/// use smarthub::event::EventBus;
/// use smarthub::protocol::Message;
/// use smarthub::store::MemoryStore;
/// use smarthub::types::Uid;
///
/// # fn example() -> smarthub::Result<()> {
/// let dispatcher = Dispatcher::open(
///     Arc::new(MemoryStore::new()),
///     EventBus::new(),
///     DispatcherConfig::default(),
/// )?;
///
/// let peer = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// let Routed::Reply(reply) = dispatcher.route(&Message::init("garden")?, peer)? else {
///     unreachable!("init is always answered");
/// };
/// assert_eq!(reply.dest(), Uid::new(2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    records: Records,
    events: EventBus,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Loads the registry from `store` and makes sure the website record
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be loaded or the website
    /// record cannot be created.
    pub fn open(store: Arc<dyn DeviceStore>, events: EventBus, config: DispatcherConfig) -> Result<Self> {
        let registry = Registry::load(Arc::clone(&store))?;
        let records = Records::new(store);
        let dispatcher = Self {
            registry,
            records,
            events,
            config,
        };
        dispatcher.ensure_website()?;
        Ok(dispatcher)
    }

    fn ensure_website(&self) -> Result<()> {
        if !self.records.exists(WEBSITE_NAME)? {
            self.records
                .create(DeviceRecord::new(Uid::WEBSITE, WEBSITE_NAME))?;
            tracing::info!("Created website record");
        }
        Ok(())
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the device records.
    #[must_use]
    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Routes one message received from `peer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or a record cannot be persisted.
    /// Protocol misuse is logged and yields [`Routed::Silent`].
    pub fn route(&self, message: &Message, peer: IpAddr) -> Result<Routed> {
        tracing::debug!(
            source = %message.source(),
            dest = %message.dest(),
            kind = %message.kind(),
            flags = ?message.flags(),
            len = message.payload().len(),
            "Routing message"
        );

        if message.dest() != Uid::SERVER {
            return self.relay(message);
        }
        if message.flags().is_init() {
            return self.handshake(message, peer);
        }

        let source = message.source();
        let Some(name) = self.registry.resolve_name(source) else {
            return Ok(Self::unknown_source(message));
        };

        match message.kind() {
            MessageType::Get => self.get(source, &name, peer),
            MessageType::Post => self.post(source, &name, message, peer),
            MessageType::Ping => {
                self.touch(source, &name, peer, |_| ())?;
                Ok(Routed::Silent)
            }
            MessageType::Subscribe => {
                self.touch(source, &name, peer, |_| ())?;
                let target = message.payload_str();
                self.subscribe(source, target.trim())?;
                Ok(Routed::Silent)
            }
            MessageType::SubscribeMulti => {
                self.touch(source, &name, peer, |_| ())?;
                for target in split_records(&message.payload_str()) {
                    self.subscribe(source, target.trim())?;
                }
                Ok(Routed::Silent)
            }
            MessageType::Unsubscribe => {
                self.touch(source, &name, peer, |_| ())?;
                let target = message.payload_str();
                self.unsubscribe(source, target.trim())?;
                Ok(Routed::Silent)
            }
            MessageType::UnsubscribeMulti => {
                self.touch(source, &name, peer, |_| ())?;
                for target in split_records(&message.payload_str()) {
                    self.unsubscribe(source, target.trim())?;
                }
                Ok(Routed::Silent)
            }
            MessageType::Control => {
                let err = RoutingError::ControlToServer(source);
                tracing::warn!(device = %name, error = %err, "Ignoring message");
                Ok(Routed::Silent)
            }
            MessageType::Other(value) => {
                tracing::warn!(device = %name, kind = value, "Discarding message of unknown type");
                Ok(Routed::Silent)
            }
        }
    }

    /// Appends the payload of a relayed message to its destination's
    /// mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination record cannot be saved.
    pub fn deliver_to_mailbox(&self, message: &Message) -> Result<()> {
        let (source, dest) = (message.source(), message.dest());
        let Some(name) = self.registry.resolve_name(dest) else {
            let err = RoutingError::UnknownDestination(dest);
            tracing::warn!(source = %source, error = %err, "Dropping relayed message");
            self.events.publish(HubEvent::Undeliverable { source, dest });
            return Ok(());
        };

        let Ok(payload) = std::str::from_utf8(message.payload()) else {
            let err = RoutingError::BinaryPayload(source);
            tracing::warn!(device = %name, error = %err, "Dropping relayed message");
            self.events.publish(HubEvent::Undeliverable { source, dest });
            return Ok(());
        };
        if payload.is_empty() {
            tracing::debug!(device = %name, "Nothing to relay");
            return Ok(());
        }

        let queued = self.records.upsert(
            &name,
            || DeviceRecord::new(dest, name.as_str()),
            |record, _| {
                record.push_mail(payload);
                record.mailbox().len()
            },
        )?;
        tracing::debug!(device = %name, queued, "Relayed payload to mailbox");
        self.events.publish(HubEvent::Relayed {
            source,
            dest,
            kind: message.kind(),
        });
        Ok(())
    }

    fn relay(&self, message: &Message) -> Result<Routed> {
        if message.kind() == MessageType::Control
            && let Some(port) = self.config.device_port
            && let Some(ip) = self.push_address(message.dest())?
        {
            return Ok(Routed::Forward {
                addr: SocketAddr::new(ip, port),
                message: message.clone(),
            });
        }

        self.deliver_to_mailbox(message)?;
        Ok(Routed::Silent)
    }

    fn push_address(&self, dest: Uid) -> Result<Option<IpAddr>> {
        let Some(name) = self.registry.resolve_name(dest) else {
            return Ok(None);
        };
        match self.records.read(&name) {
            Ok(record) => Ok(record.last_ip()),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn handshake(&self, message: &Message, peer: IpAddr) -> Result<Routed> {
        let payload = message.payload_str();
        let identity = payload.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if identity.is_empty() {
            tracing::warn!(peer = %peer, error = %RoutingError::EmptyIdentity, "Rejecting handshake");
            return Ok(Routed::Silent);
        }

        let uid = match self.registry.register(identity) {
            Ok(uid) => uid,
            Err(Error::Store(StoreError::InvalidName(name))) => {
                tracing::warn!(peer = %peer, identity = %name, "Rejecting handshake with unusable identity");
                return Ok(Routed::Silent);
            }
            Err(e) => return Err(e),
        };
        if !uid.is_assignable() {
            let err = RoutingError::ReservedIdentity(identity.to_string());
            tracing::warn!(peer = %peer, uid = %uid, error = %err, "Rejecting handshake");
            return Ok(Routed::Silent);
        }

        let subscribe_website = self.config.subscribe_website;
        let created = self.records.upsert(
            identity,
            || {
                let mut record = DeviceRecord::new(uid, identity);
                if subscribe_website {
                    record.add_subscriber(Uid::WEBSITE);
                }
                record
            },
            |record, created| {
                record.set_last_ip(peer);
                record.touch();
                created
            },
        )?;

        if created {
            tracing::info!(device = %identity, uid = %uid, peer = %peer, "Device registered");
            self.events.publish(HubEvent::DeviceRegistered {
                uid,
                name: identity.to_string(),
            });
        } else {
            tracing::debug!(device = %identity, uid = %uid, peer = %peer, "Device reconnected");
        }

        Ok(Routed::Reply(Message::new(Uid::SERVER, uid, MessageType::Post)))
    }

    fn unknown_source(message: &Message) -> Routed {
        let source = message.source();
        let err = RoutingError::UnknownSource(source);
        tracing::warn!(kind = %message.kind(), error = %err, "Ignoring message");

        if message.kind() == MessageType::Get {
            let reply = Message::new(Uid::SERVER, source, MessageType::Post).with_flags(Flags::ERROR);
            Routed::Reply(reply)
        } else {
            Routed::Silent
        }
    }

    /// Refreshes contact information of the source and runs `f` inside the
    /// same unit of work.
    fn touch<R>(
        &self,
        uid: Uid,
        name: &str,
        peer: IpAddr,
        f: impl FnOnce(&mut DeviceRecord) -> R,
    ) -> Result<R> {
        let result = self.records.upsert(
            name,
            || DeviceRecord::new(uid, name),
            |record, _| {
                record.set_last_ip(peer);
                record.touch();
                f(record)
            },
        )?;
        Ok(result)
    }

    fn get(&self, uid: Uid, name: &str, peer: IpAddr) -> Result<Routed> {
        let (payload, entries, remaining) = self.touch(uid, name, peer, |record| {
            let (payload, entries) = record.drain_joined(MAX_PAYLOAD_SIZE);
            (payload, entries, record.mailbox().len())
        })?;

        tracing::debug!(device = %name, entries, remaining, "Drained mailbox");
        if entries > 0 {
            self.events.publish(HubEvent::MailboxDrained {
                uid,
                entries,
                remaining,
            });
        }

        let reply = Message::new(Uid::SERVER, uid, MessageType::Post).with_payload(payload)?;
        Ok(Routed::Reply(reply))
    }

    fn post(&self, uid: Uid, name: &str, message: &Message, peer: IpAddr) -> Result<Routed> {
        let payload = message.payload_str();

        let mut segments = Vec::new();
        let mut readings: Vec<PeripheralReading> = Vec::new();
        for (segment, parsed) in parse_readings(&payload) {
            match parsed {
                Ok(reading) => {
                    segments.push(segment);
                    readings.push(reading);
                }
                Err(err) => tracing::warn!(device = %name, error = %err, "Skipping segment"),
            }
        }

        let subscribers = self.touch(uid, name, peer, |record| {
            for reading in &readings {
                record.apply_reading(reading);
            }
            record.subscribers().iter().copied().collect::<Vec<_>>()
        })?;

        if segments.is_empty() {
            return Ok(Routed::Silent);
        }

        // The source lock is released; subscribers are updated one at a time.
        let entries: Vec<String> = segments
            .iter()
            .map(|segment| format!("{name}{FIELD_SEPARATOR}{segment}"))
            .collect();
        let mut fanned_out = 0;
        let mut failure = None;
        for subscriber in subscribers {
            match self.fan_out(subscriber, &entries) {
                Ok(true) => fanned_out += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(device = %name, subscriber = %subscriber, error = %e, "Fan-out failed");
                    failure.get_or_insert(e);
                }
            }
        }

        tracing::debug!(device = %name, readings = readings.len(), fanned_out, "Applied readings");
        self.events.publish(HubEvent::PeripheralsUpdated {
            uid,
            readings,
            fanned_out,
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(Routed::Silent),
        }
    }

    fn fan_out(&self, subscriber: Uid, entries: &[String]) -> Result<bool> {
        let Some(name) = self.registry.resolve_name(subscriber) else {
            tracing::warn!(subscriber = %subscriber, "Skipping subscriber without a name");
            return Ok(false);
        };

        match self.records.update(&name, |record| {
            for entry in entries {
                record.push_mail(entry.as_str());
            }
        }) {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(subscriber = %name, "Skipping subscriber without a record");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn subscription_target(&self, source: Uid, target: &str) -> Option<(Uid, String)> {
        if target.is_empty() {
            return None;
        }
        let Some(target_uid) = self.registry.resolve_uid(target) else {
            let err = RoutingError::UnknownTarget(target.to_string());
            tracing::warn!(source = %source, error = %err, "Ignoring subscription change");
            return None;
        };
        Some((target_uid, target.to_string()))
    }

    fn subscribe(&self, source: Uid, target: &str) -> Result<()> {
        let Some((target_uid, target)) = self.subscription_target(source, target) else {
            return Ok(());
        };
        if target_uid == source {
            let err = RoutingError::SelfSubscription(source);
            tracing::warn!(device = %target, error = %err, "Ignoring subscription");
            return Ok(());
        }

        match self.records.update(&target, |record| record.add_subscriber(source)) {
            Ok(added) => {
                tracing::debug!(source = %source, target = %target, added, "Subscribed");
                if added {
                    self.events.publish(HubEvent::Subscribed {
                        subscriber: source,
                        target: target_uid,
                    });
                }
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                let err = RoutingError::UnknownTarget(target);
                tracing::warn!(source = %source, error = %err, "Ignoring subscription");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unsubscribe(&self, source: Uid, target: &str) -> Result<()> {
        let Some((target_uid, target)) = self.subscription_target(source, target) else {
            return Ok(());
        };

        match self.records.update(&target, |record| record.remove_subscriber(source)) {
            Ok(removed) => {
                tracing::debug!(source = %source, target = %target, removed, "Unsubscribed");
                if removed {
                    self.events.publish(HubEvent::Unsubscribed {
                        subscriber: source,
                        target: target_uid,
                    });
                }
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
