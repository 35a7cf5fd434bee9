use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CollectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Eurostat,
    Prodcom,
    Unido,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Eurostat => "eurostat",
            SourceKind::Prodcom => "prodcom",
            SourceKind::Unido => "unido",
        }
    }

    /// Eurostat and Prodcom both speak SDMX 2.1; they only differ in base URL.
    pub fn is_sdmx(&self) -> bool {
        matches!(self, SourceKind::Eurostat | SourceKind::Prodcom)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CollectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eurostat" => Ok(SourceKind::Eurostat),
            "prodcom" => Ok(SourceKind::Prodcom),
            "unido" => Ok(SourceKind::Unido),
            _ => Err(CollectError::UnknownSource(value.to_string())),
        }
    }
}

/// Category of structural document describing a dataset's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    Dataflow,
    Codelist,
    Conceptscheme,
}

impl MetadataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataType::Dataflow => "dataflow",
            MetadataType::Codelist => "codelist",
            MetadataType::Conceptscheme => "conceptscheme",
        }
    }

    /// Local name of the SDMX element listing one artefact of this type.
    pub fn element_name(&self) -> &'static str {
        match self {
            MetadataType::Dataflow => "Dataflow",
            MetadataType::Codelist => "Codelist",
            MetadataType::Conceptscheme => "ConceptScheme",
        }
    }

    /// Eurostat rejects `lang` on the dataflow and codelist listings.
    pub fn wants_lang(&self) -> bool {
        matches!(self, MetadataType::Conceptscheme)
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataType {
    type Err = CollectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dataflow" => Ok(MetadataType::Dataflow),
            "codelist" => Ok(MetadataType::Codelist),
            "conceptscheme" => Ok(MetadataType::Conceptscheme),
            _ => Err(CollectError::UnknownMetadataType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = CollectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .next()
                .map(|ch| ch.is_ascii_alphanumeric())
                .unwrap_or(false)
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(CollectError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for DatasetId {
    type Error = CollectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

/// Opaque freshness token of a remote dataset.
///
/// Only equality is meaningful: two stamps either match (nothing changed
/// upstream) or they do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStamp(String);

impl VersionStamp {
    pub const DATE_SENTINEL: &'static str = "00000000";
    pub const YEAR_SENTINEL: &'static str = "YYYY";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Derives a `YYYYMMDD` stamp from an SDMX header timestamp such as
    /// `2023-08-10T00:00:00Z`.
    pub fn from_timestamp(timestamp: &str) -> Result<Self, CollectError> {
        let date = timestamp.trim().split('T').next().unwrap_or_default();
        let stamp: String = date.chars().filter(|ch| *ch != '-').collect();
        if stamp.len() != 8 || !stamp.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(CollectError::InvalidVersion(timestamp.to_string()));
        }
        Ok(Self(stamp))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Xml,
    Json,
    Csv,
    Tsv,
    Other,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xml" => DocumentFormat::Xml,
            "json" => DocumentFormat::Json,
            "csv" => DocumentFormat::Csv,
            "tsv" => DocumentFormat::Tsv,
            _ => DocumentFormat::Other,
        }
    }
}
