// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON file store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::registry::RegistrySnapshot;
use crate::state::DeviceRecord;

use super::{DeviceStore, validate_name};

const REGISTRY_FILE: &str = "server.json";
const DEVICES_DIR: &str = "devices";

/// Stores each device as `<root>/devices/<name>.json` and the registry as
/// `<root>/server.json`.
///
/// Every write goes to a temporary sibling file that is then renamed over the
/// target, so a concurrent reader sees either the old or the new document.
///
/// # Examples
///
/// ```no_run
/// use smarthub::store::{DeviceStore, FileStore};
///
/// # fn example() -> Result<(), smarthub::error::StoreError> {
/// let store = FileStore::open("/var/lib/smarthub")?;
/// assert!(!store.exists("kitchen_temp")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    devices: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory tree if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directories cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let devices = root.join(DEVICES_DIR);
        fs::create_dir_all(&devices)?;

        tracing::debug!(root = %root.display(), "Opened file store");
        Ok(Self { root, devices })
    }

    /// Returns the data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.devices.join(format!("{name}.json")))
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl DeviceStore for FileStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.record_path(name)?.is_file())
    }

    fn load(&self, name: &str) -> Result<DeviceRecord, StoreError> {
        let path = self.record_path(name)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.name())?;
        let contents = serde_json::to_vec_pretty(record)?;
        Self::write_atomic(&path, &contents)
    }

    fn load_registry(&self) -> Result<Option<RegistrySnapshot>, StoreError> {
        let path = self.root.join(REGISTRY_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(snapshot)?;
        Self::write_atomic(&self.root.join(REGISTRY_FILE), &contents)
    }
}
