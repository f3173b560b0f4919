// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistence of device records and of the registry.
//!
//! The hub treats storage as a keyed service behind the [`DeviceStore`]
//! trait. Two implementations are provided:
//!
//! - [`FileStore`] - one JSON document per device under a data directory
//! - [`MemoryStore`] - process-local maps, for tests and ephemeral hubs
//!
//! Stores do no locking of their own beyond what keeps a single call
//! consistent. Read-modify-write sequences are serialized by
//! [`Records`](crate::state::Records) and [`Registry`](crate::registry::Registry).

mod file;
mod memory;

use std::fmt::Debug;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::registry::RegistrySnapshot;
use crate::state::DeviceRecord;

/// Keyed persistence of device records.
pub trait DeviceStore: Send + Sync + Debug {
    /// Returns true if a record is stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing storage cannot be queried.
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Loads the record stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if there is none.
    fn load(&self, name: &str) -> Result<DeviceRecord, StoreError>;

    /// Stores `record` under its name, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be written.
    fn save(&self, record: &DeviceRecord) -> Result<(), StoreError>;

    /// Loads the registry snapshot, or `None` on a fresh store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a snapshot exists but cannot be read.
    fn load_registry(&self) -> Result<Option<RegistrySnapshot>, StoreError>;

    /// Replaces the registry snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the snapshot cannot be written.
    fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError>;
}

/// Checks that `name` can be used as a storage key.
///
/// # Errors
///
/// Returns `StoreError::InvalidName` for empty names, names starting with a
/// dot, and names containing path separators or control characters.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());

    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
