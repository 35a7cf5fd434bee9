use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{ResourceDescriptor, ResourceKey};
use crate::domain::VersionStamp;
use crate::error::CollectError;
use crate::store::Store;

/// Record of which versions of which resources exist on disk.
pub trait ResourceCatalog: Send + Sync {
    /// Most recently committed version for `key`, `None` if the resource was
    /// never committed.
    fn latest_version(&self, key: &ResourceKey) -> Result<Option<VersionStamp>, CollectError>;
    fn add_or_update(&self, descriptor: &ResourceDescriptor) -> Result<(), CollectError>;
    fn list(&self) -> Result<Vec<ResourceDescriptor>, CollectError>;
}

impl<T: ResourceCatalog + ?Sized> ResourceCatalog for &T {
    fn latest_version(&self, key: &ResourceKey) -> Result<Option<VersionStamp>, CollectError> {
        (**self).latest_version(key)
    }

    fn add_or_update(&self, descriptor: &ResourceDescriptor) -> Result<(), CollectError> {
        (**self).add_or_update(descriptor)
    }

    fn list(&self) -> Result<Vec<ResourceDescriptor>, CollectError> {
        (**self).list()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    resources: Vec<ResourceDescriptor>,
}

/// Catalog persisted as a single JSON document.
pub struct JsonCatalog {
    path: Utf8PathBuf,
    lock: Mutex<()>,
}

impl JsonCatalog {
    pub fn open(path: Utf8PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn load(&self) -> Result<CatalogFile, CollectError> {
        if !self.path.as_std_path().exists() {
            return Ok(CatalogFile::default());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| CollectError::CatalogRead(format!("{}: {err}", self.path)))?;
        serde_json::from_str(&content)
            .map_err(|err| CollectError::CatalogRead(format!("{}: {err}", self.path)))
    }

    fn save(&self, file: &CatalogFile) -> Result<(), CollectError> {
        let content = serde_json::to_vec_pretty(file)
            .map_err(|err| CollectError::CatalogWrite(err.to_string()))?;
        Store::write_bytes_atomic(&self.path, &content)
            .map_err(|err| CollectError::CatalogWrite(err.to_string()))
    }
}

impl ResourceCatalog for JsonCatalog {
    fn latest_version(&self, key: &ResourceKey) -> Result<Option<VersionStamp>, CollectError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CollectError::CatalogRead("catalog lock poisoned".to_string()))?;
        let file = self.load()?;
        Ok(file
            .resources
            .iter()
            .rev()
            .find(|descriptor| &descriptor.key() == key)
            .map(|descriptor| descriptor.data_version.clone()))
    }

    fn add_or_update(&self, descriptor: &ResourceDescriptor) -> Result<(), CollectError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CollectError::CatalogWrite("catalog lock poisoned".to_string()))?;
        let mut file = self.load()?;
        let key = descriptor.key();
        let mut record = descriptor.clone();
        record.recorded_at = Some(chrono::Utc::now().to_rfc3339());

        // The latest record for a key is the last one in the list.
        file.resources.retain(|existing| {
            !(existing.key() == key && existing.data_version == record.data_version)
        });
        debug!(resource = %key, version = %record.data_version, "committing resource");
        file.resources.push(record);
        self.save(&file)
    }

    fn list(&self) -> Result<Vec<ResourceDescriptor>, CollectError> {
        Ok(self.load()?.resources)
    }
}
