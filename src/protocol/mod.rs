// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary wire protocol spoken between client nodes and the hub.
//!
//! Each TCP connection carries exactly one request and at most one response.
//! A message is a packed 7-byte [`Header`] followed by up to
//! [`MAX_PAYLOAD_SIZE`] payload bytes.
//!
//! - [`Message`] / [`MessageType`] - the decoded form
//! - [`encode`] / [`decode`] - pure conversions to and from bytes
//! - [`MessageCodec`] - the same rules as a `tokio_util` stream codec

mod codec;
mod message;

pub use codec::{MessageCodec, decode, encode};
pub use message::{
    HEADER_SIZE, Header, MAX_MESSAGE_SIZE, MAX_PAYLOAD_SIZE, Message, MessageType,
    PROTOCOL_VERSION,
};
