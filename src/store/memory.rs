// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory store.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::registry::RegistrySnapshot;
use crate::state::DeviceRecord;

use super::{DeviceStore, validate_name};

/// Keeps records in process memory. Contents are lost on drop.
///
/// The store can be switched to read-only mode, in which every write fails;
/// this is how failing storage is simulated in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, DeviceRecord>>,
    registry: RwLock<Option<RegistrySnapshot>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only").into());
        }
        Ok(())
    }
}

impl DeviceStore for MemoryStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().contains_key(name))
    }

    fn load(&self, name: &str) -> Result<DeviceRecord, StoreError> {
        self.records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        validate_name(record.name())?;
        self.check_writable()?;
        self.records
            .write()
            .insert(record.name().to_string(), record.clone());
        Ok(())
    }

    fn load_registry(&self) -> Result<Option<RegistrySnapshot>, StoreError> {
        Ok(self.registry.read().clone())
    }

    fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.registry.write() = Some(snapshot.clone());
        Ok(())
    }
}
