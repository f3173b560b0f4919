// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device lifecycle state.

use std::fmt;

/// Coarse lifecycle state of a device as tracked by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    /// Device is switched off.
    Off,
    /// Device is running.
    On,
    /// Device reported a fault.
    Error,
    /// Nothing is known yet.
    #[default]
    Unknown,
}

impl Lifecycle {
    /// Returns the upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert_eq!(Lifecycle::default(), Lifecycle::Unknown);
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Lifecycle::On).unwrap(), "\"ON\"");
        let back: Lifecycle = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(back, Lifecycle::Error);
        assert_eq!(back.to_string(), "ERROR");
    }
}
