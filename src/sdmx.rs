use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::config::SourceProfile;
use crate::domain::{DatasetId, DocumentFormat, MetadataType, VersionStamp};
use crate::error::CollectError;
use crate::fs_util::{gzip_bytes, is_gzip, validate_gzip, write_zip_entry};
use crate::index::DatasetIndex;
use crate::prettify::prettify;
use crate::source::{DataFetcher, MetadataClient, MetadataFetch};
use crate::store::Store;
use crate::transport::HttpTransport;
use crate::xml::XmlElement;

/// Client for SDMX 2.1 dissemination APIs (Eurostat and its Comext/Prodcom
/// variant).
pub struct SdmxClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    agency: String,
    indexes: Mutex<HashMap<MetadataType, Result<Arc<DatasetIndex>, CollectError>>>,
}

impl<T: HttpTransport> SdmxClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>, agency: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            agency: agency.into(),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_profile(transport: T, profile: &SourceProfile) -> Self {
        Self::new(transport, profile.base_url.clone(), profile.agency.clone())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn index_url(&self, metadata_type: MetadataType) -> String {
        format!("{}{}/{}/all", self.base_url, metadata_type, self.agency)
    }

    pub fn data_url(&self, dataset: &DatasetId) -> String {
        format!("{}data/{}/", self.base_url, dataset.as_str())
    }

    /// Listing of every artefact of `metadata_type`, fetched once per client.
    /// A failed fetch is remembered too and returned again without a new
    /// request.
    pub fn fetch_dataset_index(
        &self,
        metadata_type: MetadataType,
    ) -> Result<Arc<DatasetIndex>, CollectError> {
        if let Some(cached) = self
            .indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&metadata_type)
        {
            return cached.clone();
        }

        let result = self.load_index(metadata_type);
        if let Err(err) = &result {
            warn!(%metadata_type, "metadata index unavailable for this pass: {err}");
        }
        self.indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(metadata_type, result.clone());
        result
    }

    fn load_index(&self, metadata_type: MetadataType) -> Result<Arc<DatasetIndex>, CollectError> {
        let url = self.index_url(metadata_type);
        let mut query = vec![("detail", "allstubs"), ("completestub", "true")];
        if metadata_type.wants_lang() {
            query.push(("lang", "en"));
        }

        info!(%metadata_type, "fetching metadata index");
        let start = Instant::now();
        let body = self.transport.get(&url, &query)?;
        let text = decode_utf8(body, "metadata index")?;
        let index = Arc::new(DatasetIndex::from_xml(metadata_type, &text)?);
        info!(
            %metadata_type,
            entries = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched metadata index"
        );
        Ok(index)
    }

    /// Raw structure document referenced by `id`'s row in the listing, `None`
    /// when there is no such row.
    fn fetch_structure(
        &self,
        id: &str,
        metadata_type: MetadataType,
    ) -> Result<Option<String>, CollectError> {
        let index = self.fetch_dataset_index(metadata_type)?;
        let Some(entry) = index.find(id) else {
            warn!(id, %metadata_type, "no {metadata_type} found for id {id} in the index");
            return Ok(None);
        };
        let Some(url) = entry.structure_url.as_deref() else {
            warn!(id, %metadata_type, "index row for {id} has no structure URL");
            return Ok(None);
        };
        let body = self.transport.get(url, &[])?;
        decode_utf8(body, "structure document").map(Some)
    }
}

impl<T: HttpTransport> MetadataClient for SdmxClient<T> {
    fn fetch_version(&self, dataset: &DatasetId) -> Result<VersionStamp, CollectError> {
        let unavailable = |reason: String| CollectError::MetadataUnavailable {
            dataset: dataset.to_string(),
            reason,
        };
        let document = match self.fetch_structure(dataset.as_str(), MetadataType::Conceptscheme) {
            Ok(Some(document)) => document,
            Ok(None) => {
                return Err(unavailable(
                    "not listed in the conceptscheme index".to_string(),
                ));
            }
            Err(err) if err.is_transport() => return Err(unavailable(err.to_string())),
            Err(err) => return Err(err),
        };

        let root = XmlElement::parse(&document)?;
        let timestamp = header_timestamp(&root)
            .ok_or_else(|| CollectError::parse("conceptscheme header", "no prepared timestamp"))?;
        VersionStamp::from_timestamp(timestamp)
            .map_err(|err| CollectError::parse("conceptscheme header", err))
    }

    fn fetch_columns(&self, dataset: &DatasetId) -> Result<Vec<String>, CollectError> {
        let Some(document) = self.fetch_structure(dataset.as_str(), MetadataType::Conceptscheme)?
        else {
            return Ok(Vec::new());
        };
        let root = XmlElement::parse(&document)?;
        Ok(enumeration_ids(&root))
    }

    fn fetch_description(&self, dataset: &DatasetId) -> Result<String, CollectError> {
        let index = self.fetch_dataset_index(MetadataType::Dataflow)?;
        match index.find(dataset.as_str()) {
            Some(entry) => Ok(entry.name.trim().to_string()),
            None => {
                warn!(dataset = %dataset, "no dataflow found for {dataset}; description left empty");
                Ok(String::new())
            }
        }
    }
}

impl<T: HttpTransport> DataFetcher for SdmxClient<T> {
    fn fetch_dataset(
        &self,
        dataset: &DatasetId,
        target: &Utf8Path,
    ) -> Result<Utf8PathBuf, CollectError> {
        let url = self.data_url(dataset);
        info!(dataset = %dataset, "downloading dataset");
        let start = Instant::now();
        let body = self
            .transport
            .get(&url, &[("format", "SDMX-CSV"), ("compressed", "true")])?;

        let payload = if is_gzip(&body) {
            validate_gzip(&body)?;
            body
        } else {
            gzip_bytes(&body)?
        };
        let path = target.join(format!("{}.csv.gz", dataset.as_str()));
        Store::write_bytes_atomic(&path, &payload)?;
        info!(
            dataset = %dataset,
            bytes = payload.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "saved dataset to {path}"
        );
        Ok(path)
    }

    fn fetch_metadata_document(
        &self,
        id: &str,
        metadata_type: MetadataType,
        target: &Utf8Path,
    ) -> Result<MetadataFetch, CollectError> {
        let Some(document) = self.fetch_structure(id, metadata_type)? else {
            return Ok(MetadataFetch::NotListed);
        };
        let pretty = prettify(&document, DocumentFormat::Xml)?;
        let zip_path = target.join(format!("dim_{id}.zip"));
        write_zip_entry(&zip_path, &format!("dim_{id}.xml"), pretty.as_bytes())?;
        info!(id, %metadata_type, "saved {metadata_type} for {id} to {target}");
        Ok(MetadataFetch::Saved(zip_path))
    }
}

/// Preparation timestamp of a structure message: the header's `Prepared`
/// element, or failing that its third child.
pub fn header_timestamp(root: &XmlElement) -> Option<&str> {
    let header = root.children.first()?;
    header
        .child("Prepared")
        .or_else(|| header.children.get(2))
        .map(|element| element.text.trim())
        .filter(|text| !text.is_empty())
}

/// Codelist references of every `Enumeration`, in document order.
pub fn enumeration_ids(root: &XmlElement) -> Vec<String> {
    root.descendants("Enumeration")
        .into_iter()
        .filter_map(|enumeration| enumeration.children.first()?.attr("id"))
        .map(str::to_string)
        .collect()
}

fn decode_utf8(body: Vec<u8>, what: &str) -> Result<String, CollectError> {
    String::from_utf8(body).map_err(|err| CollectError::parse(what, err))
}
