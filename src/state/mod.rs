// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state model.
//!
//! A [`DeviceRecord`] holds what the hub knows about one device: identity,
//! peripheral values, subscribers and the mailbox of entries waiting for the
//! next GET. Peripheral values arrive as `KIND:name:value` segments, parsed
//! into [`PeripheralReading`]s. [`Records`] wraps a store and serializes
//! updates per device.
//!
//! # Examples
//!
//! ```
//! use smarthub::state::{DeviceRecord, PeripheralReading};
//! use smarthub::types::Uid;
//!
//! let mut record = DeviceRecord::new(Uid::new(4), "garden");
//! let reading: PeripheralReading = "PERIPHERAL_S:temp:21.5".parse().unwrap();
//! record.apply_reading(&reading);
//!
//! assert_eq!(record.peripheral("temp"), Some("21.5"));
//! ```

mod device_record;
mod peripheral;
mod records;

pub use device_record::DeviceRecord;
pub use peripheral::{
    FIELD_SEPARATOR, PeripheralKind, PeripheralReading, RECORD_SEPARATOR, parse_readings,
    split_records,
};
pub use records::Records;
