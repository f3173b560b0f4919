// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small value types shared by the wire protocol and the device model.
//!
//! # Types
//!
//! - [`Uid`] - One-byte node identifier, with the reserved server and website values
//! - [`Flags`] - Header flag bitmask
//! - [`Lifecycle`] - Coarse device state (OFF/ON/ERROR/UNKNOWN)

mod flags;
mod lifecycle;
mod uid;

pub use flags::Flags;
pub use lifecycle::Lifecycle;
pub use uid::Uid;
