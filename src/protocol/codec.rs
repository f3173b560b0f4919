// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Framing of messages on a byte stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DecodeError, ProtocolError};

use super::message::{HEADER_SIZE, Message, declared_payload_len};

/// Serializes a message; the result is `7 + payload_size` bytes long.
#[must_use]
pub fn encode(message: &Message) -> Vec<u8> {
    message.to_bytes()
}

/// Parses one message from a complete buffer.
///
/// # Errors
///
/// See [`Message::from_bytes`].
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    Message::from_bytes(bytes)
}

/// Stream codec for use with `tokio_util::codec::Framed`.
///
/// Partial frames are buffered until complete. A header that announces an
/// oversized payload or a foreign version is rejected as soon as its seven
/// bytes are in, without waiting for the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        }

        let frame_len = HEADER_SIZE + declared_payload_len(&src[..HEADER_SIZE])?;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        Ok(Some(Message::from_bytes(&frame)?))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => {
                let needed = if src.len() < HEADER_SIZE {
                    HEADER_SIZE
                } else {
                    HEADER_SIZE + declared_payload_len(&src[..HEADER_SIZE])?
                };
                Err(DecodeError::Truncated {
                    available: src.len(),
                    needed,
                }
                .into())
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(item.wire_len());
        item.write_to(dst);
        Ok(())
    }
}
