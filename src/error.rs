// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the hub.
//!
//! This module provides the error hierarchy used across the crate: wire
//! decoding, transport communication, message routing, persistence, and
//! identity allocation.
//!
//! Only [`DecodeError`] ever prevents a response from being sent. Routing
//! errors are recovered where they happen: the offending unit of work is
//! skipped and logged, and the rest of the message is still processed.

use std::io;

use thiserror::Error;

use crate::types::Uid;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while decoding a frame.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error occurred during transport communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while routing a message.
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Error occurred in the device store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error occurred while allocating a device identity.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The broker configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Binding or accepting on the listening socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while decoding a message from raw bytes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than a full header (or the declared frame) were available.
    #[error("truncated frame: {available} bytes available, {needed} needed")]
    Truncated {
        /// Bytes available in the buffer.
        available: usize,
        /// Bytes required to complete the frame.
        needed: usize,
    },

    /// The declared payload does not fit in the frame limit or the buffer.
    #[error("payload of {declared} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// Payload size declared by the header.
        declared: usize,
        /// Largest payload that was acceptable.
        limit: usize,
    },

    /// The header carries a protocol version this hub does not speak.
    #[error("protocol version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version the hub supports.
        expected: u8,
        /// Version found in the header.
        found: u8,
    },
}

/// Errors related to transport communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Reading from or writing to the socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection to the peer failed.
    #[error("connection to {0} failed")]
    ConnectionFailed(String),

    /// The operation did not complete in time.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The peer closed the connection before a full message arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

/// Errors raised while routing a decoded message.
///
/// All of these are recovered locally by the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A relayed message names a destination UID nobody owns.
    #[error("no device is registered under UID {0}")]
    UnknownDestination(Uid),

    /// A message to the hub comes from a UID nobody owns.
    #[error("message from unknown source UID {0}")]
    UnknownSource(Uid),

    /// A device tried to subscribe to its own updates.
    #[error("device {0} cannot subscribe to itself")]
    SelfSubscription(Uid),

    /// A POST segment is not of the form `KIND:name:value`.
    #[error("malformed peripheral record: {0:?}")]
    MalformedPeripheralRecord(String),

    /// A (un)subscription names a device that does not exist.
    #[error("subscription target {0:?} does not exist")]
    UnknownTarget(String),

    /// A CONTROL message was addressed to the hub itself.
    #[error("CONTROL message from {0} addressed to the hub")]
    ControlToServer(Uid),

    /// An init handshake carried no identity.
    #[error("init handshake carried an empty identity")]
    EmptyIdentity,

    /// An init handshake named an identity bound to a reserved UID.
    #[error("identity {0:?} is reserved")]
    ReservedIdentity(String),

    /// A relayed payload is not valid UTF-8 and cannot be queued.
    #[error("relayed payload from {0} is not valid UTF-8")]
    BinaryPayload(Uid),
}

/// Errors related to device persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the given name.
    #[error("no device record named {0:?}")]
    NotFound(String),

    /// The name cannot be used as a storage key.
    #[error("invalid device name {0:?}")]
    InvalidName(String),

    /// Reading or writing the backing storage failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized or deserialized.
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors related to identity allocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every one-byte UID has been handed out.
    #[error("no UIDs left to assign to {0:?}")]
    Exhausted(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
