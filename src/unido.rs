use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::SourceProfile;
use crate::domain::{DatasetId, MetadataType, VersionStamp};
use crate::error::CollectError;
use crate::prettify::to_json_pretty;
use crate::source::{DataFetcher, MetadataClient, MetadataFetch};
use crate::store::Store;
use crate::transport::HttpTransport;

/// Dataset description returned by `getDataset`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnidoDataset {
    pub id: Value,
    #[serde(default)]
    pub production_year: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub periods: Vec<Value>,
    #[serde(default)]
    pub countries: Vec<UnidoCode>,
    #[serde(default)]
    pub activities: Vec<UnidoCode>,
    #[serde(default)]
    pub variables: Vec<UnidoCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnidoCode {
    pub c: Value,
}

impl UnidoCode {
    pub fn code(&self) -> String {
        scalar_to_string(&self.c)
    }
}

impl UnidoDataset {
    pub fn production_year(&self) -> Option<VersionStamp> {
        self.production_year
            .as_ref()
            .filter(|value| !value.is_null())
            .map(|value| VersionStamp::new(scalar_to_string(value)))
            .filter(|stamp| !stamp.is_empty())
    }

    fn codes(items: &[UnidoCode]) -> Vec<String> {
        items.iter().map(UnidoCode::code).collect()
    }
}

pub struct UnidoClient<T: HttpTransport> {
    transport: T,
    base_url: String,
}

impl<T: HttpTransport> UnidoClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    pub fn from_profile(transport: T, profile: &SourceProfile) -> Self {
        Self::new(transport, profile.base_url.clone())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn dataset_url(&self, dataset: &str) -> String {
        format!("{}getDataset/{}", self.base_url, dataset)
    }

    fn data_url(&self) -> String {
        format!("{}getData", self.base_url)
    }

    /// Raw `getDataset` document.
    pub fn fetch_dataset_document(&self, dataset: &str) -> Result<Value, CollectError> {
        let body = self.transport.get(&self.dataset_url(dataset), &[])?;
        serde_json::from_slice(&body).map_err(|err| CollectError::parse("UNIDO dataset", err))
    }

    pub fn fetch_dataset_metadata(&self, dataset: &str) -> Result<UnidoDataset, CollectError> {
        let document = self.fetch_dataset_document(dataset)?;
        serde_json::from_value(document).map_err(|err| CollectError::parse("UNIDO dataset", err))
    }

    fn fetch_rows(
        &self,
        metadata: &UnidoDataset,
        country: &str,
        variable: &str,
        activities: &[String],
    ) -> Result<Vec<Value>, CollectError> {
        let request = json!({
            "datasetId": metadata.id,
            "countryCode": country,
            "variableCode": variable,
            "activityCodes": activities,
            "periods": metadata.periods,
        });
        let body = self.transport.post_json(&self.data_url(), &request)?;
        let mut response: Value = serde_json::from_slice(&body)
            .map_err(|err| CollectError::parse("UNIDO data", err))?;
        let Some(Value::Array(rows)) = response.get_mut("data").map(Value::take) else {
            return Err(CollectError::parse("UNIDO data", "response has no data array"));
        };

        Ok(rows
            .into_iter()
            .map(|mut row| {
                if let Value::Object(fields) = &mut row {
                    fields.insert("cc".to_string(), Value::String(country.to_string()));
                    fields.insert("vc".to_string(), Value::String(variable.to_string()));
                }
                row
            })
            .collect())
    }
}

impl<T: HttpTransport> MetadataClient for UnidoClient<T> {
    fn fetch_version(&self, dataset: &DatasetId) -> Result<VersionStamp, CollectError> {
        let metadata = match self.fetch_dataset_metadata(dataset.as_str()) {
            Ok(metadata) => metadata,
            Err(err @ CollectError::Parse { .. }) => return Err(err),
            Err(err) => {
                return Err(CollectError::MetadataUnavailable {
                    dataset: dataset.to_string(),
                    reason: err.to_string(),
                });
            }
        };
        metadata
            .production_year()
            .ok_or_else(|| CollectError::MetadataUnavailable {
                dataset: dataset.to_string(),
                reason: "no production_year".to_string(),
            })
    }

    fn fetch_columns(&self, dataset: &DatasetId) -> Result<Vec<String>, CollectError> {
        let metadata = self.fetch_dataset_metadata(dataset.as_str())?;
        Ok(UnidoDataset::codes(&metadata.variables))
    }

    fn fetch_description(&self, dataset: &DatasetId) -> Result<String, CollectError> {
        let metadata = self.fetch_dataset_metadata(dataset.as_str())?;
        Ok(metadata
            .name
            .or(metadata.description)
            .map(|text| text.trim().to_string())
            .unwrap_or_default())
    }
}

impl<T: HttpTransport> DataFetcher for UnidoClient<T> {
    fn fetch_dataset(
        &self,
        dataset: &DatasetId,
        target: &Utf8Path,
    ) -> Result<Utf8PathBuf, CollectError> {
        let metadata = self.fetch_dataset_metadata(dataset.as_str())?;
        let countries = UnidoDataset::codes(&metadata.countries);
        let variables = UnidoDataset::codes(&metadata.variables);
        let activities = UnidoDataset::codes(&metadata.activities);

        info!(
            dataset = %dataset,
            countries = countries.len(),
            variables = variables.len(),
            "downloading dataset"
        );
        let start = Instant::now();
        let mut rows = Vec::new();
        for country in &countries {
            for variable in &variables {
                let batch = self.fetch_rows(&metadata, country, variable, &activities)?;
                debug!(country = %country, variable = %variable, rows = batch.len(), "fetched data batch");
                rows.extend(batch);
            }
        }

        let path = target.join(format!("fact_{}.json", dataset.as_str()));
        Store::write_bytes_atomic(&path, to_json_pretty(&rows)?.as_bytes())?;
        info!(
            dataset = %dataset,
            rows = rows.len(),
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
        let document = self.fetch_dataset_document(id)?;
        let path = target.join(format!("dim_{id}.json"));
        Store::write_bytes_atomic(&path, to_json_pretty(&document)?.as_bytes())?;
        info!(id, %metadata_type, "saved dataset description to {path}");
        Ok(MetadataFetch::Saved(path))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}
