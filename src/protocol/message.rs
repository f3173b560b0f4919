// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message model and the fixed binary layout.
//!
//! Every message starts with a packed 7-byte header:
//!
//! ```text
//! offset 0: version       u8
//! offset 1: flags         u8
//! offset 2: source_uid    u8
//! offset 3: dest_uid      u8
//! offset 4: message_type  u8
//! offset 5: payload_size  u16, little-endian
//! offset 7: payload       payload_size bytes
//! ```

use std::borrow::Cow;
use std::fmt;

use bytes::BufMut;

use crate::error::DecodeError;
use crate::types::{Flags, Uid};

/// Protocol version spoken by this hub.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 7;

/// Largest frame (header and payload) accepted or produced.
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// Largest payload that fits in a frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_MESSAGE_SIZE - HEADER_SIZE;

/// Kind of request carried by a message.
///
/// Values the hub does not know are kept in [`MessageType::Other`] so that a
/// decoded header re-encodes to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Ask the hub for queued data.
    Get,
    /// Report data to the hub.
    Post,
    /// Keepalive.
    Ping,
    /// Subscribe to one device's updates.
    Subscribe,
    /// Subscribe to several devices at once.
    SubscribeMulti,
    /// Stop receiving one device's updates.
    Unsubscribe,
    /// Stop receiving several devices' updates.
    UnsubscribeMulti,
    /// Command for a destination device.
    Control,
    /// Unassigned type byte.
    Other(u8),
}

impl MessageType {
    /// Returns the wire value.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Get => 0,
            Self::Post => 1,
            Self::Ping => 2,
            Self::Subscribe => 3,
            Self::SubscribeMulti => 4,
            Self::Unsubscribe => 5,
            Self::UnsubscribeMulti => 6,
            Self::Control => 7,
            Self::Other(value) => *value,
        }
    }

    /// Returns the upper-case protocol name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Ping => "PING",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubscribeMulti => "SUBSCRIBE_MULTI",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubscribeMulti => "UNSUBSCRIBE_MULTI",
            Self::Control => "CONTROL",
            Self::Other(_) => "OTHER",
        }
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Get,
            1 => Self::Post,
            2 => Self::Ping,
            3 => Self::Subscribe,
            4 => Self::SubscribeMulti,
            5 => Self::Unsubscribe,
            6 => Self::UnsubscribeMulti,
            7 => Self::Control,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(value) => write!(f, "OTHER({value})"),
            known => f.write_str(known.as_str()),
        }
    }
}

/// Addressing and type information of a message.
///
/// The payload size is not stored here; it is always derived from the payload
/// the header travels with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    version: u8,
    /// Flag bits.
    pub flags: Flags,
    /// Sender.
    pub source: Uid,
    /// Receiver.
    pub dest: Uid,
    /// Request kind.
    pub kind: MessageType,
}

impl Header {
    /// Creates a header for the current protocol version with no flags set.
    #[must_use]
    pub const fn new(source: Uid, dest: Uid, kind: MessageType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: Flags::NONE,
            source,
            dest,
            kind,
        }
    }

    /// Returns the protocol version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }
}

/// Validates the header at the start of `bytes` and returns the declared
/// payload length.
///
/// `bytes` must hold at least [`HEADER_SIZE`] bytes.
pub(crate) fn declared_payload_len(bytes: &[u8]) -> Result<usize, DecodeError> {
    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: version,
        });
    }

    let declared = usize::from(u16::from_le_bytes([bytes[5], bytes[6]]));
    if declared > MAX_PAYLOAD_SIZE {
        return Err(DecodeError::PayloadTooLarge {
            declared,
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    Ok(declared)
}

/// A header together with its payload.
///
/// A `Message` can only be built with a payload that fits in a frame, so the
/// payload size written to the wire always matches the bytes that follow.
///
/// # Examples
///
/// ```
/// use smarthub::protocol::{Message, MessageType};
/// use smarthub::types::Uid;
///
/// let msg = Message::new(Uid::new(4), Uid::SERVER, MessageType::Post)
///     .with_payload("PERIPHERAL_S:temp:21.5")
///     .unwrap();
///
/// let bytes = msg.to_bytes();
/// assert_eq!(bytes.len(), 7 + 22);
/// assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a message with an empty payload and no flags.
    #[must_use]
    pub const fn new(source: Uid, dest: Uid, kind: MessageType) -> Self {
        Self {
            header: Header::new(source, dest, kind),
            payload: Vec::new(),
        }
    }

    /// Creates an init handshake carrying the device identity.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::PayloadTooLarge` if the identity does not fit.
    pub fn init(identity: &str) -> Result<Self, DecodeError> {
        Self::new(Uid::WEBSITE, Uid::SERVER, MessageType::Post)
            .with_flags(Flags::IS_INIT_MSG)
            .with_payload(identity)
    }

    /// Sets the header flags.
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Attaches a payload.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::PayloadTooLarge` if the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Result<Self, DecodeError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(DecodeError::PayloadTooLarge {
                declared: payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        self.payload = payload;
        Ok(self)
    }

    /// Returns the header.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the sender.
    #[must_use]
    pub const fn source(&self) -> Uid {
        self.header.source
    }

    /// Returns the receiver.
    #[must_use]
    pub const fn dest(&self) -> Uid {
        self.header.dest
    }

    /// Returns the request kind.
    #[must_use]
    pub const fn kind(&self) -> MessageType {
        self.header.kind
    }

    /// Returns the flag bits.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.header.flags
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Returns the payload size as written in the header.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // bounded by MAX_PAYLOAD_SIZE
    pub fn payload_size(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Returns the encoded length in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Writes header and payload into `dst`.
    pub fn write_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.header.version);
        dst.put_u8(self.header.flags.bits());
        dst.put_u8(self.header.source.value());
        dst.put_u8(self.header.dest.value());
        dst.put_u8(self.header.kind.as_u8());
        dst.put_u16_le(self.payload_size());
        dst.put_slice(&self.payload);
    }

    /// Serializes the message.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        self.write_to(&mut bytes);
        bytes
    }

    /// Parses one message from the start of `bytes`.
    ///
    /// Bytes after the declared payload are ignored.
    ///
    /// # Errors
    ///
    /// - `Truncated` if fewer than [`HEADER_SIZE`] bytes are available
    /// - `VersionMismatch` if the version byte is not [`PROTOCOL_VERSION`]
    /// - `PayloadTooLarge` if the declared payload exceeds the frame limit or
    ///   the bytes actually available
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                available: bytes.len(),
                needed: HEADER_SIZE,
            });
        }

        let declared = declared_payload_len(bytes)?;
        let available = bytes.len() - HEADER_SIZE;
        if declared > available {
            return Err(DecodeError::PayloadTooLarge {
                declared,
                limit: available,
            });
        }

        let header = Header {
            version: bytes[0],
            flags: Flags::from_bits(bytes[1]),
            source: Uid::new(bytes[2]),
            dest: Uid::new(bytes[3]),
            kind: MessageType::from(bytes[4]),
        };

        Ok(Self {
            header,
            payload: bytes[HEADER_SIZE..HEADER_SIZE + declared].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(version: u8, payload_size: u16) -> Vec<u8> {
        let size = payload_size.to_le_bytes();
        vec![version, 0, 2, 1, 1, size[0], size[1]]
    }

    #[test]
    fn message_type_wire_values() {
        let expected = [
            (MessageType::Get, 0),
            (MessageType::Post, 1),
            (MessageType::Ping, 2),
            (MessageType::Subscribe, 3),
            (MessageType::SubscribeMulti, 4),
            (MessageType::Unsubscribe, 5),
            (MessageType::UnsubscribeMulti, 6),
            (MessageType::Control, 7),
        ];
        for (kind, value) in expected {
            assert_eq!(kind.as_u8(), value);
            assert_eq!(MessageType::from(value), kind);
        }
        assert_eq!(MessageType::from(42), MessageType::Other(42));
        assert_eq!(MessageType::Other(42).as_u8(), 42);
    }

    #[test]
    fn header_layout_is_packed_little_endian() {
        let msg = Message::new(Uid::new(5), Uid::SERVER, MessageType::Subscribe)
            .with_flags(Flags::PING)
            .with_payload(vec![0xAA; 0x0102])
            .unwrap();
        let bytes = msg.to_bytes();

        assert_eq!(&bytes[..HEADER_SIZE], &[1, 0x20, 5, 1, 3, 0x02, 0x01]);
        assert_eq!(bytes.len(), HEADER_SIZE + 0x0102);
    }

    #[test]
    fn round_trip_at_size_boundaries() {
        for len in [0, 1, 255, 256, MAX_PAYLOAD_SIZE] {
            let msg = Message::new(Uid::new(9), Uid::new(3), MessageType::Control)
                .with_flags(Flags::from_bits(0x0F))
                .with_payload(vec![b'x'; len])
                .unwrap();
            assert_eq!(Message::from_bytes(&msg.to_bytes()).unwrap(), msg);
        }
    }

    #[test]
    fn unknown_type_round_trips() {
        let msg = Message::new(Uid::new(2), Uid::SERVER, MessageType::Other(200));
        let decoded = Message::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(decoded.kind(), MessageType::Other(200));
    }

    #[test]
    fn short_buffer_is_truncated() {
        for len in 0..HEADER_SIZE {
            let err = Message::from_bytes(&vec![1; len]).unwrap_err();
            assert_eq!(
                err,
                DecodeError::Truncated {
                    available: len,
                    needed: HEADER_SIZE
                }
            );
        }
    }

    #[test]
    fn oversized_declaration_is_rejected() {
        let mut bytes = raw_header(PROTOCOL_VERSION, 2042);
        bytes.extend(vec![0; 2042]);
        assert!(matches!(
            Message::from_bytes(&bytes),
            Err(DecodeError::PayloadTooLarge { declared: 2042, .. })
        ));
    }

    #[test]
    fn declaration_beyond_buffer_is_rejected() {
        let mut bytes = raw_header(PROTOCOL_VERSION, 10);
        bytes.extend(b"short");
        assert_eq!(
            Message::from_bytes(&bytes),
            Err(DecodeError::PayloadTooLarge {
                declared: 10,
                limit: 5
            })
        );
    }

    #[test]
    fn wrong_version_is_rejected() {
        let bytes = raw_header(2, 0);
        assert_eq!(
            Message::from_bytes(&bytes),
            Err(DecodeError::VersionMismatch {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let msg = Message::new(Uid::new(2), Uid::SERVER, MessageType::Ping);
        let mut bytes = msg.to_bytes();
        bytes.extend(b"garbage");
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn oversized_payload_cannot_be_attached() {
        let result = Message::new(Uid::new(2), Uid::SERVER, MessageType::Post)
            .with_payload(vec![0; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(result, Err(DecodeError::PayloadTooLarge { .. })));
    }

    #[test]
    fn init_message_sets_flag() {
        let msg = Message::init("kitchen_temp").unwrap();
        assert!(msg.flags().is_init());
        assert_eq!(msg.dest(), Uid::SERVER);
        assert_eq!(msg.payload_str(), "kitchen_temp");
    }
}
