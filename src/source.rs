use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DatasetId, MetadataType, VersionStamp};
use crate::error::CollectError;

/// Read side of a statistical API: freshness, shape and naming of a dataset.
pub trait MetadataClient: Send + Sync {
    /// Fails with `MetadataUnavailable` when the version document cannot be
    /// fetched and with `Parse` when it is malformed.
    fn fetch_version(&self, dataset: &DatasetId) -> Result<VersionStamp, CollectError>;
    /// Dimension identifiers in document order; empty when the dataset is not
    /// listed.
    fn fetch_columns(&self, dataset: &DatasetId) -> Result<Vec<String>, CollectError>;
    /// Human readable name; empty when the dataset is not listed.
    fn fetch_description(&self, dataset: &DatasetId) -> Result<String, CollectError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFetch {
    Saved(Utf8PathBuf),
    /// The id has no row in the metadata listing; nothing was downloaded.
    NotListed,
}

/// Write side of a statistical API: downloads into a target directory.
pub trait DataFetcher: Send + Sync {
    /// Downloads the primary payload and returns the written file.
    fn fetch_dataset(
        &self,
        dataset: &DatasetId,
        target: &Utf8Path,
    ) -> Result<Utf8PathBuf, CollectError>;
    /// Downloads one auxiliary structure document as `dim_{id}`.
    fn fetch_metadata_document(
        &self,
        id: &str,
        metadata_type: MetadataType,
        target: &Utf8Path,
    ) -> Result<MetadataFetch, CollectError>;
}

impl<T: MetadataClient + ?Sized> MetadataClient for &T {
    fn fetch_version(&self, dataset: &DatasetId) -> Result<VersionStamp, CollectError> {
        (**self).fetch_version(dataset)
    }

    fn fetch_columns(&self, dataset: &DatasetId) -> Result<Vec<String>, CollectError> {
        (**self).fetch_columns(dataset)
    }

    fn fetch_description(&self, dataset: &DatasetId) -> Result<String, CollectError> {
        (**self).fetch_description(dataset)
    }
}

impl<T: DataFetcher + ?Sized> DataFetcher for &T {
    fn fetch_dataset(
        &self,
        dataset: &DatasetId,
        target: &Utf8Path,
    ) -> Result<Utf8PathBuf, CollectError> {
        (**self).fetch_dataset(dataset, target)
    }

    fn fetch_metadata_document(
        &self,
        id: &str,
        metadata_type: MetadataType,
        target: &Utf8Path,
    ) -> Result<MetadataFetch, CollectError> {
        (**self).fetch_metadata_document(id, metadata_type, target)
    }
}
