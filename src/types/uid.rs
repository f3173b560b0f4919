// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device identifier type.

use std::fmt;

/// One-byte identifier of a node on the hub network.
///
/// Two values are reserved: [`Uid::SERVER`] addresses the hub itself and
/// [`Uid::WEBSITE`] belongs to the virtual website consumer. Devices receive
/// identifiers starting at [`Uid::FIRST_ASSIGNABLE`].
///
/// # Examples
///
/// ```
/// use smarthub::types::Uid;
///
/// let uid = Uid::new(7);
/// assert!(uid.is_assignable());
/// assert!(!Uid::SERVER.is_assignable());
/// assert_eq!(uid.to_string(), "7");
/// ```
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Uid(u8);

impl Uid {
    /// The virtual website consumer.
    pub const WEBSITE: Self = Self(0);

    /// The hub itself.
    pub const SERVER: Self = Self(1);

    /// First identifier handed out to a device.
    pub const FIRST_ASSIGNABLE: Self = Self(2);

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns true if this identifier is outside the reserved range.
    #[must_use]
    pub const fn is_assignable(self) -> bool {
        self.0 >= Self::FIRST_ASSIGNABLE.0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::WEBSITE => write!(f, "Uid(website)"),
            Self::SERVER => write!(f, "Uid(server)"),
            Self(value) => write!(f, "Uid({value})"),
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Uid {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Uid> for u8 {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}
