// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Peripheral readings reported in POST payloads.

use std::fmt;
use std::str::FromStr;

use crate::error::RoutingError;

/// Separator between records in a payload.
pub const RECORD_SEPARATOR: char = ';';

/// Separator between the fields of one record.
pub const FIELD_SEPARATOR: char = ':';

/// Class of a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralKind {
    /// Read-only sensor value.
    Sensor,
    /// Value that can be driven by CONTROL messages.
    Control,
}

impl PeripheralKind {
    /// Returns the tag used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sensor => "PERIPHERAL_S",
            Self::Control => "PERIPHERAL_C",
        }
    }
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `KIND:name:value` record.
///
/// # Examples
///
/// ```
/// use smarthub::state::{PeripheralKind, PeripheralReading};
///
/// let reading: PeripheralReading = "PERIPHERAL_S:temp:21.5".parse().unwrap();
/// assert_eq!(reading.kind, PeripheralKind::Sensor);
/// assert_eq!(reading.name, "temp");
/// assert_eq!(reading.value, "21.5");
/// assert_eq!(reading.to_string(), "PERIPHERAL_S:temp:21.5");
///
/// assert!("temp:21.5".parse::<PeripheralReading>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralReading {
    /// Peripheral class.
    pub kind: PeripheralKind,
    /// Peripheral name, unique per device.
    pub name: String,
    /// Last reported value.
    pub value: String,
}

impl PeripheralReading {
    /// Creates a reading.
    #[must_use]
    pub fn new(kind: PeripheralKind, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a sensor reading.
    #[must_use]
    pub fn sensor(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(PeripheralKind::Sensor, name, value)
    }

    /// Creates a control reading.
    #[must_use]
    pub fn control(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(PeripheralKind::Control, name, value)
    }
}

impl fmt::Display for PeripheralReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.kind, self.name, self.value
        )
    }
}

impl FromStr for PeripheralReading {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RoutingError::MalformedPeripheralRecord(s.to_string());

        // Empty fields are dropped, so "A::B" counts as two tokens.
        let tokens: Vec<&str> = s
            .split(FIELD_SEPARATOR)
            .filter(|token| !token.is_empty())
            .collect();
        let [kind, name, value] = tokens.as_slice() else {
            return Err(malformed());
        };

        let kind = match *kind {
            "PERIPHERAL_S" => PeripheralKind::Sensor,
            "PERIPHERAL_C" => PeripheralKind::Control,
            _ => return Err(malformed()),
        };

        Ok(Self::new(kind, *name, *value))
    }
}

/// Splits a `;`-separated payload into its non-empty segments.
pub fn split_records(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|segment| !segment.is_empty())
}

/// Parses every segment of a POST payload.
///
/// Each item carries the raw segment next to the parse result so callers can
/// forward well-formed segments verbatim and report the others.
pub fn parse_readings(
    payload: &str,
) -> impl Iterator<Item = (&str, Result<PeripheralReading, RoutingError>)> {
    split_records(payload).map(|segment| (segment, segment.parse()))
}
