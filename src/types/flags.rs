// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Header flag bits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask carried in the second byte of every header.
///
/// Only the high three bits have a meaning. The remaining bits are reserved:
/// they are preserved when a header is decoded and re-encoded but the hub
/// never looks at them.
///
/// # Examples
///
/// ```
/// use smarthub::types::Flags;
///
/// let flags = Flags::IS_INIT_MSG | Flags::from_bits(0x01);
/// assert!(flags.is_init());
/// assert!(!flags.is_error());
/// assert_eq!(flags.bits(), 0x41);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    /// No flag set.
    pub const NONE: Self = Self(0x00);

    /// The message reports an error condition.
    pub const ERROR: Self = Self(0x80);

    /// First message a device sends after boot.
    pub const IS_INIT_MSG: Self = Self(0x40);

    /// Keepalive marker.
    pub const PING: Self = Self(0x20);

    /// Wraps a raw flag byte, reserved bits included.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if the init-handshake bit is set.
    #[must_use]
    pub const fn is_init(self) -> bool {
        (self.0 & Self::IS_INIT_MSG.0) != 0
    }

    /// Returns true if the error bit is set.
    #[must_use]
    pub const fn is_error(self) -> bool {
        (self.0 & Self::ERROR.0) != 0
    }

    /// Returns true if the keepalive bit is set.
    #[must_use]
    pub const fn is_ping(self) -> bool {
        (self.0 & Self::PING.0) != 0
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#04x})", self.0)
    }
}
