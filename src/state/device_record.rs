// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted state of one device.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Lifecycle, Uid};

use super::peripheral::{PeripheralReading, RECORD_SEPARATOR};

fn default_kind() -> String {
    "Unknown".to_string()
}

/// Everything the hub knows about one device.
///
/// A record is loaded from the store at the start of an operation, mutated in
/// memory, and saved back as a whole. It is never edited in place on disk.
///
/// # Examples
///
/// ```
/// use smarthub::state::DeviceRecord;
/// use smarthub::types::Uid;
///
/// let mut record = DeviceRecord::new(Uid::new(5), "kitchen_temp");
/// record.push_mail("A");
/// record.push_mail("B");
/// assert_eq!(record.drain_mailbox(), vec!["A".to_string(), "B".to_string()]);
/// assert!(record.mailbox().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    uid: Uid,
    name: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    last_ip: Option<IpAddr>,
    #[serde(default)]
    last_contact: Option<DateTime<Utc>>,
    #[serde(default)]
    state: Lifecycle,
    #[serde(default)]
    peripherals: HashMap<String, String>,
    #[serde(default)]
    subscribers: BTreeSet<Uid>,
    #[serde(default)]
    mailbox: VecDeque<String>,
}

impl DeviceRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            kind: default_kind(),
            last_ip: None,
            last_contact: None,
            state: Lifecycle::Unknown,
            peripherals: HashMap::new(),
            subscribers: BTreeSet::new(),
            mailbox: VecDeque::new(),
        }
    }

    /// Returns the device UID.
    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Returns the device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the free-form device kind label.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Sets the device kind label.
    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    /// Returns the last address the device contacted the hub from.
    #[must_use]
    pub fn last_ip(&self) -> Option<IpAddr> {
        self.last_ip
    }

    /// Records the address the device is currently reachable at.
    pub fn set_last_ip(&mut self, ip: IpAddr) {
        self.last_ip = Some(ip);
    }

    /// Returns when the device last contacted the hub.
    #[must_use]
    pub fn last_contact(&self) -> Option<DateTime<Utc>> {
        self.last_contact
    }

    /// Stamps the record with the current time.
    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    /// Stamps the record with the given time.
    pub fn touch_at(&mut self, at: DateTime<Utc>) {
        self.last_contact = Some(at);
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Sets the lifecycle state.
    pub fn set_state(&mut self, state: Lifecycle) {
        self.state = state;
    }

    // ========== Peripherals ==========

    /// Returns the last known value of a peripheral.
    #[must_use]
    pub fn peripheral(&self, name: &str) -> Option<&str> {
        self.peripherals.get(name).map(String::as_str)
    }

    /// Returns all known peripheral values.
    #[must_use]
    pub fn peripherals(&self) -> &HashMap<String, String> {
        &self.peripherals
    }

    /// Stores a reading; a later reading for the same name replaces it.
    pub fn apply_reading(&mut self, reading: &PeripheralReading) {
        self.peripherals
            .insert(reading.name.clone(), reading.value.clone());
    }

    // ========== Subscribers ==========

    /// Returns the UIDs subscribed to this device.
    #[must_use]
    pub fn subscribers(&self) -> &BTreeSet<Uid> {
        &self.subscribers
    }

    /// Returns true if `uid` receives this device's updates.
    #[must_use]
    pub fn has_subscriber(&self, uid: Uid) -> bool {
        self.subscribers.contains(&uid)
    }

    /// Adds a subscriber. Returns false if it was already present.
    pub fn add_subscriber(&mut self, uid: Uid) -> bool {
        self.subscribers.insert(uid)
    }

    /// Removes a subscriber. Returns false if it was not present.
    pub fn remove_subscriber(&mut self, uid: Uid) -> bool {
        self.subscribers.remove(&uid)
    }

    // ========== Mailbox ==========

    /// Returns the queued entries, oldest first.
    #[must_use]
    pub fn mailbox(&self) -> &VecDeque<String> {
        &self.mailbox
    }

    /// Queues an entry for the next GET.
    pub fn push_mail(&mut self, entry: impl Into<String>) {
        self.mailbox.push_back(entry.into());
    }

    /// Removes and returns every queued entry, oldest first.
    pub fn drain_mailbox(&mut self) -> Vec<String> {
        self.mailbox.drain(..).collect()
    }

    /// Removes the oldest entries whose `;`-joined form fits in `limit` bytes
    /// and returns them joined.
    ///
    /// Entries that do not fit stay queued in order. An entry that alone is
    /// longer than `limit` is dropped rather than blocking the queue forever.
    pub fn drain_joined(&mut self, limit: usize) -> (String, usize) {
        let mut joined = String::new();
        let mut taken = 0;

        while let Some(entry) = self.mailbox.front() {
            let extra = if joined.is_empty() {
                entry.len()
            } else {
                entry.len() + RECORD_SEPARATOR.len_utf8()
            };

            if joined.len() + extra > limit {
                if taken == 0 && entry.len() > limit {
                    tracing::warn!(
                        device = %self.name,
                        len = entry.len(),
                        "Dropping mailbox entry larger than a frame"
                    );
                    self.mailbox.pop_front();
                    continue;
                }
                break;
            }

            if !joined.is_empty() {
                joined.push(RECORD_SEPARATOR);
            }
            if let Some(entry) = self.mailbox.pop_front() {
                joined.push_str(&entry);
                taken += 1;
            }
        }

        (joined, taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_empty() {
        let record = DeviceRecord::new(Uid::new(2), "garden_temp");
        assert_eq!(record.uid(), Uid::new(2));
        assert_eq!(record.name(), "garden_temp");
        assert_eq!(record.kind(), "Unknown");
        assert_eq!(record.state(), Lifecycle::Unknown);
        assert!(record.last_ip().is_none());
        assert!(record.last_contact().is_none());
        assert!(record.peripherals().is_empty());
        assert!(record.subscribers().is_empty());
        assert!(record.mailbox().is_empty());
    }

    #[test]
    fn last_reading_wins() {
        let mut record = DeviceRecord::new(Uid::new(2), "dev");
        record.apply_reading(&PeripheralReading::sensor("temp", "20.0"));
        record.apply_reading(&PeripheralReading::sensor("temp", "21.5"));
        assert_eq!(record.peripheral("temp"), Some("21.5"));
        assert_eq!(record.peripherals().len(), 1);
    }

    #[test]
    fn subscribers_are_a_set() {
        let mut record = DeviceRecord::new(Uid::new(2), "dev");
        assert!(record.add_subscriber(Uid::new(4)));
        assert!(!record.add_subscriber(Uid::new(4)));
        assert_eq!(record.subscribers().len(), 1);

        assert!(record.remove_subscriber(Uid::new(4)));
        assert!(!record.remove_subscriber(Uid::new(4)));
        assert!(record.subscribers().is_empty());
    }

    #[test]
    fn mailbox_is_fifo() {
        let mut record = DeviceRecord::new(Uid::new(2), "dev");
        for entry in ["A", "B", "C"] {
            record.push_mail(entry);
        }
        assert_eq!(record.drain_joined(usize::MAX), ("A;B;C".to_string(), 3));
        assert!(record.mailbox().is_empty());
        assert_eq!(record.drain_joined(usize::MAX), (String::new(), 0));
    }

    #[test]
    fn drain_joined_stops_at_limit() {
        let mut record = DeviceRecord::new(Uid::new(2), "dev");
        for entry in ["aaaa", "bbbb", "cccc"] {
            record.push_mail(entry);
        }

        // "aaaa;bbbb" is 9 bytes, adding ";cccc" would make 14.
        assert_eq!(record.drain_joined(12), ("aaaa;bbbb".to_string(), 2));
        assert_eq!(record.mailbox().len(), 1);
        assert_eq!(record.drain_joined(12), ("cccc".to_string(), 1));
    }

    #[test]
    fn drain_joined_drops_entry_that_never_fits() {
        let mut record = DeviceRecord::new(Uid::new(2), "dev");
        record.push_mail("x".repeat(20));
        record.push_mail("ok");

        assert_eq!(record.drain_joined(10), ("ok".to_string(), 1));
        assert!(record.mailbox().is_empty());
    }

    #[test]
    fn json_round_trip_keeps_everything() {
        let mut record = DeviceRecord::new(Uid::new(7), "hall_light");
        record.set_last_ip("192.168.1.42".parse().unwrap());
        record.touch();
        record.set_state(Lifecycle::On);
        record.apply_reading(&PeripheralReading::control("LED", "ON"));
        record.add_subscriber(Uid::WEBSITE);
        record.push_mail("garden:PERIPHERAL_S:temp:12.0");

        let json = serde_json::to_string(&record).unwrap();
        let back: DeviceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let back: DeviceRecord = serde_json::from_str(r#"{"uid":3,"name":"old"}"#).unwrap();
        assert_eq!(back.kind(), "Unknown");
        assert!(back.mailbox().is_empty());
    }
}
