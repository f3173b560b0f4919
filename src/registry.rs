// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device identity registry.
//!
//! The registry maps one-byte UIDs to durable device names and hands out new
//! UIDs. UID 1 is the hub itself and UID 0 is the website consumer, bound to
//! the name [`WEBSITE_NAME`]. Assignable UIDs start at 2 and are never reused.
//!
//! All mutation goes through a single lock. A new assignment is persisted
//! before it becomes visible, so a UID that was ever returned to a caller
//! survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::store::{DeviceStore, validate_name};
use crate::types::Uid;

/// Name bound to [`Uid::WEBSITE`].
pub const WEBSITE_NAME: &str = "website";

/// Persisted form of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Next UID to hand out. Kept wider than a UID so exhaustion is
    /// representable.
    pub next_uid: u16,
    /// Every known device, keyed by name.
    pub devices: BTreeMap<String, Uid>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(WEBSITE_NAME.to_string(), Uid::WEBSITE);
        Self {
            next_uid: u16::from(Uid::FIRST_ASSIGNABLE.value()),
            devices,
        }
    }
}

#[derive(Debug)]
struct Inner {
    next_uid: u16,
    by_name: HashMap<String, Uid>,
    by_uid: HashMap<Uid, String>,
}

impl Inner {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut inner = Self {
            next_uid: snapshot.next_uid,
            by_name: HashMap::with_capacity(snapshot.devices.len()),
            by_uid: HashMap::with_capacity(snapshot.devices.len()),
        };

        for (name, uid) in snapshot.devices {
            inner.insert(name, uid);
        }
        if !inner.by_uid.contains_key(&Uid::WEBSITE) {
            inner.insert(WEBSITE_NAME.to_string(), Uid::WEBSITE);
        }

        // Never hand out a UID that is already bound.
        let floor = inner
            .by_uid
            .keys()
            .map(|uid| u16::from(uid.value()) + 1)
            .max()
            .unwrap_or_default()
            .max(u16::from(Uid::FIRST_ASSIGNABLE.value()));
        inner.next_uid = inner.next_uid.max(floor);

        inner
    }

    fn insert(&mut self, name: String, uid: Uid) {
        self.by_uid.insert(uid, name.clone());
        self.by_name.insert(name, uid);
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            next_uid: self.next_uid,
            devices: self
                .by_name
                .iter()
                .map(|(name, uid)| (name.clone(), *uid))
                .collect(),
        }
    }
}

/// Name to UID mapping shared by every connection.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use smarthub::registry::Registry;
/// use smarthub::store::MemoryStore;
/// use smarthub::types::Uid;
///
/// # fn example() -> smarthub::Result<()> {
/// let registry = Registry::load(Arc::new(MemoryStore::new()))?;
///
/// let uid = registry.register("kitchen_temp")?;
/// assert_eq!(uid, Uid::new(2));
/// assert_eq!(registry.register("kitchen_temp")?, uid);
/// assert_eq!(registry.resolve_name(uid).as_deref(), Some("kitchen_temp"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Registry {
    store: Arc<dyn DeviceStore>,
    inner: Mutex<Inner>,
}

impl Registry {
    /// Restores the registry from `store`, seeding a fresh one if the store
    /// holds no snapshot yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read, or if a
    /// fresh snapshot cannot be written.
    pub fn load(store: Arc<dyn DeviceStore>) -> Result<Self> {
        let inner = if let Some(snapshot) = store.load_registry()? {
            let inner = Inner::from_snapshot(snapshot);
            tracing::info!(
                devices = inner.by_name.len(),
                next_uid = inner.next_uid,
                "Loaded device registry"
            );
            inner
        } else {
            let snapshot = RegistrySnapshot::default();
            store.save_registry(&snapshot)?;
            tracing::info!("Seeded empty device registry");
            Inner::from_snapshot(snapshot)
        };

        Ok(Self {
            store,
            inner: Mutex::new(inner),
        })
    }

    /// Returns the name bound to `uid`.
    #[must_use]
    pub fn resolve_name(&self, uid: Uid) -> Option<String> {
        self.inner.lock().by_uid.get(&uid).cloned()
    }

    /// Returns the UID bound to `name`.
    #[must_use]
    pub fn resolve_uid(&self, name: &str) -> Option<Uid> {
        self.inner.lock().by_name.get(name).copied()
    }

    /// Returns the UID for `name`, assigning the next free one if the name
    /// is new.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidName` if `name` cannot be stored,
    /// `RegistryError::Exhausted` once every UID is taken, or a store error
    /// if the updated snapshot cannot be persisted. In every error case the
    /// registry is left unchanged.
    pub fn register(&self, name: &str) -> Result<Uid> {
        let mut inner = self.inner.lock();
        if let Some(uid) = inner.by_name.get(name) {
            return Ok(*uid);
        }

        validate_name(name)?;
        let uid = u8::try_from(inner.next_uid)
            .map(Uid::new)
            .map_err(|_| RegistryError::Exhausted(name.to_string()))?;

        let mut snapshot = inner.snapshot();
        snapshot.next_uid = inner.next_uid + 1;
        snapshot.devices.insert(name.to_string(), uid);
        self.store.save_registry(&snapshot)?;

        inner.next_uid = snapshot.next_uid;
        inner.insert(name.to_string(), uid);
        drop(inner);

        tracing::info!(device = %name, uid = %uid, "Assigned UID");
        Ok(uid)
    }

    /// Returns the number of bound names, the website included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().by_name.len()
    }

    /// Returns true if no name is bound. Never the case after [`load`](Self::load).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_name.is_empty()
    }

    /// Returns the UID the next new device will get.
    #[must_use]
    pub fn next_uid(&self) -> u16 {
        self.inner.lock().next_uid
    }

    /// Returns a copy of the current mapping.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::error::{Error, StoreError};
    use crate::store::{FileStore, MemoryStore};

    fn registry() -> Registry {
        Registry::load(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn fresh_registry_binds_website() {
        let registry = registry();
        assert_eq!(registry.resolve_uid(WEBSITE_NAME), Some(Uid::WEBSITE));
        assert_eq!(registry.resolve_name(Uid::WEBSITE).as_deref(), Some("website"));
        assert_eq!(registry.resolve_name(Uid::SERVER), None);
        assert_eq!(registry.next_uid(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_assigns_increasing_uids() {
        let registry = registry();
        assert_eq!(registry.register("a").unwrap(), Uid::new(2));
        assert_eq!(registry.register("b").unwrap(), Uid::new(3));
        assert_eq!(registry.register("a").unwrap(), Uid::new(2));
        assert_eq!(registry.next_uid(), 4);
    }

    #[test]
    fn register_persists_before_commit() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::load(store.clone()).unwrap();

        store.set_read_only(true);
        assert!(matches!(registry.register("dev"), Err(Error::Store(_))));
        assert_eq!(registry.resolve_uid("dev"), None);
        assert_eq!(registry.next_uid(), 2);

        store.set_read_only(false);
        assert_eq!(registry.register("dev").unwrap(), Uid::new(2));
        let saved = store.load_registry().unwrap().unwrap();
        assert_eq!(saved.devices.get("dev"), Some(&Uid::new(2)));
        assert_eq!(saved.next_uid, 3);
    }

    #[test]
    fn invalid_names_are_refused() {
        let registry = registry();
        assert!(matches!(
            registry.register("../x"),
            Err(Error::Store(StoreError::InvalidName(_)))
        ));
        assert_eq!(registry.next_uid(), 2);
    }

    #[test]
    fn exhaustion_is_reported() {
        let registry = registry();
        for i in 2..=255 {
            registry.register(&format!("dev{i}")).unwrap();
        }
        assert_eq!(registry.resolve_uid("dev255"), Some(Uid::new(255)));
        assert!(matches!(
            registry.register("one_too_many"),
            Err(Error::Registry(RegistryError::Exhausted(_)))
        ));
        // Known names still resolve.
        assert_eq!(registry.register("dev2").unwrap(), Uid::new(2));
    }

    #[test]
    fn concurrent_registration_never_duplicates() {
        let registry = Arc::new(registry());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..20)
                        .map(|i| {
                            // Half the names collide across threads.
                            let name = if i % 2 == 0 {
                                format!("shared{i}")
                            } else {
                                format!("t{t}_dev{i}")
                            };
                            (name.clone(), registry.register(&name).unwrap())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut by_name: HashMap<String, Uid> = HashMap::new();
        for handle in handles {
            for (name, uid) in handle.join().unwrap() {
                let previous = by_name.insert(name, uid);
                assert!(previous.is_none_or(|p| p == uid));
            }
        }

        let distinct: HashSet<Uid> = by_name.values().copied().collect();
        assert_eq!(distinct.len(), by_name.len());
        // 10 shared names plus 8 * 10 private ones.
        assert_eq!(by_name.len(), 90);
        assert_eq!(registry.next_uid(), 92);
    }

    #[test]
    fn survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = Registry::load(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();
            registry.register("garden").unwrap();
            registry.register("porch").unwrap();
        }

        let registry = Registry::load(Arc::new(FileStore::open(dir.path()).unwrap())).unwrap();
        assert_eq!(registry.resolve_uid("garden"), Some(Uid::new(2)));
        assert_eq!(registry.resolve_uid("porch"), Some(Uid::new(3)));
        assert_eq!(registry.register("shed").unwrap(), Uid::new(4));
    }

    #[test]
    fn stale_counter_is_raised_on_load() {
        let store = Arc::new(MemoryStore::new());
        let mut snapshot = RegistrySnapshot::default();
        snapshot.devices.insert("x".to_string(), Uid::new(9));
        snapshot.next_uid = 2;
        store.save_registry(&snapshot).unwrap();

        let registry = Registry::load(store).unwrap();
        assert_eq!(registry.register("y").unwrap(), Uid::new(10));
    }
}
