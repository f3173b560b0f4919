// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locked load, mutate, save access to device records.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::DeviceStore;

use super::DeviceRecord;

/// Serializes read-modify-write cycles on device records.
///
/// Each device name has its own lock. It is taken before the record is
/// loaded and released after it is saved, so two updates of the same device
/// never interleave while updates of different devices run in parallel.
/// A caller must not start an update from inside another update's closure.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use smarthub::state::{DeviceRecord, Records};
/// use smarthub::store::MemoryStore;
/// use smarthub::types::Uid;
///
/// # fn example() -> Result<(), smarthub::error::StoreError> {
/// let records = Records::new(Arc::new(MemoryStore::new()));
/// records.create(DeviceRecord::new(Uid::new(2), "dev"))?;
///
/// records.update("dev", |record| record.push_mail("hello"))?;
/// assert_eq!(records.read("dev")?.mailbox().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Records {
    store: Arc<dyn DeviceStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Records {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Returns true if a record exists under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store cannot be queried.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.store.exists(name)
    }

    /// Loads a copy of a record without taking its lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if there is no such record.
    pub fn read(&self, name: &str) -> Result<DeviceRecord, StoreError> {
        self.store.load(name)
    }

    /// Saves a new record, replacing any previous one with the same name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be written.
    pub fn create(&self, record: DeviceRecord) -> Result<(), StoreError> {
        let lock = self.lock_for(record.name());
        let _guard = lock.lock();
        self.store.save(&record)
    }

    /// Loads `name`, applies `f` and saves the result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if there is no such record, or any
    /// error from loading or saving. Nothing is saved if loading fails.
    pub fn update<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut DeviceRecord) -> R,
    ) -> Result<R, StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock();

        let mut record = self.store.load(name)?;
        let result = f(&mut record);
        self.store.save(&record)?;
        Ok(result)
    }

    /// Like [`update`](Self::update), but starts from `init()` when no record
    /// exists yet. The closure's second argument tells whether the record
    /// was just created.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if loading fails for another reason than a
    /// missing record, or if saving fails.
    pub fn upsert<R>(
        &self,
        name: &str,
        init: impl FnOnce() -> DeviceRecord,
        f: impl FnOnce(&mut DeviceRecord, bool) -> R,
    ) -> Result<R, StoreError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock();

        let (mut record, created) = match self.store.load(name) {
            Ok(record) => (record, false),
            Err(StoreError::NotFound(_)) => (init(), true),
            Err(e) => return Err(e),
        };
        let result = f(&mut record, created);
        self.store.save(&record)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Lifecycle, Uid};

    fn records() -> Records {
        Records::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn update_missing_record_fails() {
        let records = records();
        let result = records.update("ghost", |record| record.push_mail("x"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!records.exists("ghost").unwrap());
    }

    #[test]
    fn upsert_creates_then_updates() {
        let records = records();

        let created = records
            .upsert("dev", || DeviceRecord::new(Uid::new(2), "dev"), |_, created| created)
            .unwrap();
        assert!(created);

        let created = records
            .upsert(
                "dev",
                || DeviceRecord::new(Uid::new(99), "dev"),
                |record, created| {
                    record.push_mail("kept");
                    created
                },
            )
            .unwrap();
        assert!(!created);

        let record = records.read("dev").unwrap();
        assert_eq!(record.uid(), Uid::new(2));
        assert_eq!(record.mailbox().len(), 1);
    }

    #[test]
    fn lifecycle_written_through_update_is_persisted() {
        let records = records();
        records.create(DeviceRecord::new(Uid::new(2), "dev")).unwrap();

        records
            .update("dev", |record| record.set_state(Lifecycle::Error))
            .unwrap();
        assert_eq!(records.read("dev").unwrap().state(), Lifecycle::Error);
    }

    #[test]
    fn failed_save_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let records = Records::new(store.clone());
        records.create(DeviceRecord::new(Uid::new(2), "dev")).unwrap();

        store.set_read_only(true);
        assert!(records.update("dev", |record| record.push_mail("lost")).is_err());
        store.set_read_only(false);

        assert!(records.read("dev").unwrap().mailbox().is_empty());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let records = Arc::new(records());
        records.create(DeviceRecord::new(Uid::new(2), "dev")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let records = Arc::clone(&records);
                thread::spawn(move || {
                    for i in 0..25 {
                        records
                            .update("dev", |record| record.push_mail(format!("{t}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(records.read("dev").unwrap().mailbox().len(), 200);
    }
}
