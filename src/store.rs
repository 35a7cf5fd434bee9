use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CollectError;

pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// On-disk layout rooted at the data root: versioned resource directories
/// (`collect/{source}/{dataset}/{version}`) next to the catalog file.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, CollectError> {
        let cwd =
            std::env::current_dir().map_err(|err| CollectError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| CollectError::Filesystem("invalid data root path".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn catalog_path(&self) -> Utf8PathBuf {
        self.root.join(CATALOG_FILE_NAME)
    }

    pub fn resource_dir(&self, location: &str) -> Utf8PathBuf {
        self.root.join(location)
    }

    pub fn metadata_dir(&self, location: &str) -> Utf8PathBuf {
        self.resource_dir(location).join("metadata")
    }

    pub fn ensure_root(&self) -> Result<(), CollectError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| CollectError::Filesystem(err.to_string()))
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), CollectError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| CollectError::Filesystem(format!("create {path}: {err}")))
    }

    /// Replaces `path` with `content` through a sibling temp file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CollectError> {
        let parent = path
            .parent()
            .ok_or_else(|| CollectError::Filesystem(format!("invalid destination {path}")))?;
        Self::ensure_dir(parent)?;
        let temp = tempfile::Builder::new()
            .prefix("stat-collect-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CollectError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content)
            .map_err(|err| CollectError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CollectError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
