// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub event types.

use crate::protocol::MessageType;
use crate::state::PeripheralReading;
use crate::types::Uid;

/// Events emitted by the dispatcher after a change has been persisted.
///
/// # Examples
///
/// ```
/// use smarthub::event::HubEvent;
/// use smarthub::types::Uid;
///
/// let event = HubEvent::DeviceRegistered {
///     uid: Uid::new(2),
///     name: "garden".to_string(),
/// };
/// assert_eq!(event.uid(), Uid::new(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A device completed its first handshake.
    DeviceRegistered {
        /// Assigned UID.
        uid: Uid,
        /// Device identity.
        name: String,
    },

    /// A device reported peripheral values.
    PeripheralsUpdated {
        /// Reporting device.
        uid: Uid,
        /// Well-formed readings, in payload order.
        readings: Vec<PeripheralReading>,
        /// Number of subscribers the readings were queued for.
        fanned_out: usize,
    },

    /// A device collected its mailbox.
    MailboxDrained {
        /// Collecting device.
        uid: Uid,
        /// Entries handed over.
        entries: usize,
        /// Entries left queued because they did not fit in one frame.
        remaining: usize,
    },

    /// A device subscribed to another one.
    Subscribed {
        /// Subscribing device.
        subscriber: Uid,
        /// Target device.
        target: Uid,
    },

    /// A device unsubscribed from another one.
    Unsubscribed {
        /// Unsubscribing device.
        subscriber: Uid,
        /// Target device.
        target: Uid,
    },

    /// A relayed payload was queued in a device's mailbox.
    Relayed {
        /// Sender.
        source: Uid,
        /// Recipient.
        dest: Uid,
        /// Type of the relayed message.
        kind: MessageType,
    },

    /// A CONTROL payload was pushed straight to the device.
    Pushed {
        /// Sender.
        source: Uid,
        /// Recipient.
        dest: Uid,
    },

    /// A relayed payload named a destination nobody owns.
    Undeliverable {
        /// Sender.
        source: Uid,
        /// Unknown recipient.
        dest: Uid,
    },
}

impl HubEvent {
    /// Returns the UID of the device the event is about.
    #[must_use]
    pub fn uid(&self) -> Uid {
        match self {
            Self::DeviceRegistered { uid, .. }
            | Self::PeripheralsUpdated { uid, .. }
            | Self::MailboxDrained { uid, .. } => *uid,
            Self::Subscribed { target, .. } | Self::Unsubscribed { target, .. } => *target,
            Self::Relayed { dest, .. } | Self::Pushed { dest, .. } | Self::Undeliverable { dest, .. } => {
                *dest
            }
        }
    }
}
