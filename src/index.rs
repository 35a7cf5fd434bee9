use std::io::Write;

use serde::Serialize;

use crate::domain::MetadataType;
use crate::error::CollectError;
use crate::xml::XmlElement;

/// One row of a metadata listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub id: String,
    #[serde(rename = "agencyID")]
    pub agency_id: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "structureURL")]
    pub structure_url: Option<String>,
    pub name: String,
}

/// Tabular form of an SDMX `allstubs` listing for one metadata type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetIndex {
    metadata_type: MetadataType,
    entries: Vec<IndexEntry>,
}

impl DatasetIndex {
    pub fn new(metadata_type: MetadataType, entries: Vec<IndexEntry>) -> Self {
        Self {
            metadata_type,
            entries,
        }
    }

    pub fn from_xml(metadata_type: MetadataType, xml: &str) -> Result<Self, CollectError> {
        let root = XmlElement::parse(xml)?;
        let entries = root
            .descendants(metadata_type.element_name())
            .into_iter()
            .filter_map(|element| {
                let id = element.attr("id")?.to_string();
                Some(IndexEntry {
                    id,
                    agency_id: element.attr("agencyID").map(str::to_string),
                    version: element.attr("version").map(str::to_string),
                    structure_url: element.attr("structureURL").map(str::to_string),
                    name: preferred_name(element),
                })
            })
            .collect();
        Ok(Self::new(metadata_type, entries))
    }

    pub fn metadata_type(&self) -> MetadataType {
        self.metadata_type
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Writes `id,agencyID,version,structureURL,name` rows.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), CollectError> {
        let mut csv = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        for entry in &self.entries {
            csv.serialize(entry)
                .map_err(|err| CollectError::Filesystem(err.to_string()))?;
        }
        csv.flush()
            .map_err(|err| CollectError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn preferred_name(element: &XmlElement) -> String {
    let names: Vec<&XmlElement> = element.children_named("Name").collect();
    names
        .iter()
        .find(|name| name.attr("lang") == Some("en"))
        .or(names.first())
        .map(|name| name.text.trim().to_string())
        .unwrap_or_default()
}
