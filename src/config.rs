use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorDefaults, ResourceDescriptor};
use crate::domain::{DatasetId, MetadataType, SourceKind, VersionStamp};
use crate::error::CollectError;

pub const CONFIG_FILE_NAME: &str = "stat-collect.json";

const EUROSTAT_WASTE_DATASETS: &[&str] = &[
    "ENPS_ENV_WASGENH",
    "ENPS_ENV_WASGENM",
    "ENPS_ENV_WASTRT",
    "ENPS_ENV_WAT_ABS",
    "ENPS_ENV_WAT_CAT",
    "ENV_WASBAT",
    "ENV_WASELEE",
    "ENV_WASELEEOS",
    "ENV_WASELV",
    "ENV_WASELVT",
    "ENV_WASFLOW",
    "ENV_WASFW",
    "ENV_WASGEN",
    "ENV_WASMUN",
    "ENV_WASOPER",
    "ENV_WASPAC",
    "ENV_WASPACR",
    "ENV_WASPB",
    "ENV_WASPCB",
    "ENV_WASSHIP",
    "ENV_WASTRDMP",
    "ENV_WASTRT",
    "ENV_WW_SPD",
];

const PRODCOM_DATASETS: &[&str] = &["DS-056120"];

const UNIDO_DATASETS: &[&str] = &["INDSTAT", "IDSB"];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Shorthand(String),
    Detailed(SourceEntryObject),
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SourceEntryObject {
    pub source: String,
    #[serde(default)]
    pub datasets: Option<Vec<String>>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub metadata_types: Option<Vec<MetadataType>>,
    #[serde(default)]
    pub name_template: Option<String>,
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub location_template: Option<String>,
    #[serde(default)]
    pub comment_template: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
}

/// Everything needed to collect the datasets of one source. Immutable once
/// resolved.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub kind: SourceKind,
    pub base_url: String,
    pub agency: String,
    pub datasets: Vec<DatasetId>,
    pub metadata_types: Vec<MetadataType>,
    pub name_template: String,
    pub schema_name: String,
    pub task_name: String,
    pub stage: String,
    pub location_template: String,
    pub comment_template: String,
    pub created_by: String,
    pub license: String,
    pub license_url: String,
    pub sentinel: VersionStamp,
}

/// Static configuration of a single dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub source: SourceKind,
    pub dataset: DatasetId,
    pub base_url: String,
    pub metadata_types: Vec<MetadataType>,
}

impl SourceProfile {
    pub fn builtin(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Eurostat => Self {
                kind,
                base_url: "https://ec.europa.eu/eurostat/api/dissemination/sdmx/2.1/".to_string(),
                agency: "ESTAT".to_string(),
                datasets: builtin_ids(EUROSTAT_WASTE_DATASETS),
                metadata_types: default_sdmx_metadata_types(),
                name_template: "eurostat_waste_{dataset}".to_string(),
                schema_name: "None".to_string(),
                task_name: "eurostat_waste_collect".to_string(),
                stage: "collect".to_string(),
                location_template: "collect/eurostat/{dataset}/{version}".to_string(),
                comment_template: "Data and metadata collected from eurostat for dataset {dataset}"
                    .to_string(),
                created_by: "Albert K. Osei-Owusu".to_string(),
                license: "Open Data Commons Public Domain Dedication (CC-BY 4.0)".to_string(),
                license_url: "https://creativecommons.org/licenses/by-sa/4.0/legalcode"
                    .to_string(),
                sentinel: VersionStamp::new(VersionStamp::DATE_SENTINEL),
            },
            SourceKind::Prodcom => Self {
                kind,
                base_url: "https://ec.europa.eu/eurostat/api/comext/dissemination/sdmx/2.1/"
                    .to_string(),
                agency: "ESTAT".to_string(),
                datasets: builtin_ids(PRODCOM_DATASETS),
                metadata_types: default_sdmx_metadata_types(),
                name_template: "prodcom_{dataset}".to_string(),
                schema_name: "None".to_string(),
                task_name: "prodcom_collect".to_string(),
                stage: "collect".to_string(),
                location_template: "collect/prodcom/{dataset}/{version}".to_string(),
                comment_template: "Data and metadata collected from prodcom for dataset {dataset}"
                    .to_string(),
                created_by: "Albert K. Osei-Owusu".to_string(),
                license: "Open Data Commons Public Domain Dedication (CC-BY 4.0)".to_string(),
                license_url: "https://creativecommons.org/licenses/by-sa/4.0/legalcode"
                    .to_string(),
                sentinel: VersionStamp::new(VersionStamp::DATE_SENTINEL),
            },
            SourceKind::Unido => Self {
                kind,
                base_url: "https://stat.unido.org/portal/dataset/".to_string(),
                agency: "UNIDO".to_string(),
                datasets: builtin_ids(UNIDO_DATASETS),
                metadata_types: Vec::new(),
                name_template: "{dataset}".to_string(),
                schema_name: "None".to_string(),
                task_name: "unido".to_string(),
                stage: "collect".to_string(),
                location_template: "collect/unido/{dataset}/{version}".to_string(),
                comment_template: "Data collected from UNIDO for {dataset}".to_string(),
                created_by: "Cæcilia Lind Skov-Jensen".to_string(),
                license: "Creative Commons Attribution 4.0 International License".to_string(),
                license_url: "https://stat.unido.org/terms-and-conditions".to_string(),
                sentinel: VersionStamp::new(VersionStamp::YEAR_SENTINEL),
            },
        }
    }

    pub fn dataset_specs(&self) -> Vec<DatasetSpec> {
        self.datasets
            .iter()
            .map(|dataset| DatasetSpec {
                source: self.kind,
                dataset: dataset.clone(),
                base_url: self.base_url.clone(),
                metadata_types: self.metadata_types.clone(),
            })
            .collect()
    }

    /// Fresh descriptor for `dataset`, carrying the sentinel version.
    pub fn descriptor_for(&self, dataset: &DatasetId) -> ResourceDescriptor {
        ResourceDescriptor::new(DescriptorDefaults {
            name: render(&self.name_template, dataset),
            schema_name: &self.schema_name,
            task_name: &self.task_name,
            stage: &self.stage,
            location_template: render(&self.location_template, dataset),
            comment: render(&self.comment_template, dataset),
            created_by: &self.created_by,
            license: &self.license,
            license_url: &self.license_url,
            version: self.sentinel.clone(),
        })
    }

    fn apply(&mut self, entry: SourceEntryObject) -> Result<(), CollectError> {
        if let Some(datasets) = entry.datasets {
            self.datasets = datasets
                .iter()
                .map(|value| value.parse())
                .collect::<Result<Vec<_>, CollectError>>()?;
        }
        if let Some(base_url) = entry.base_url {
            self.base_url = normalize_base_url(&base_url);
        }
        if let Some(metadata_types) = entry.metadata_types {
            self.metadata_types = metadata_types;
        }
        if let Some(value) = entry.name_template {
            self.name_template = value;
        }
        if let Some(value) = entry.task_name {
            self.task_name = value;
        }
        if let Some(value) = entry.location_template {
            self.location_template = value;
        }
        if let Some(value) = entry.comment_template {
            self.comment_template = value;
        }
        if let Some(value) = entry.created_by {
            self.created_by = value;
        }
        if let Some(value) = entry.license {
            self.license = value;
        }
        if let Some(value) = entry.license_url {
            self.license_url = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), CollectError> {
        for template in [
            &self.name_template,
            &self.location_template,
            &self.comment_template,
        ] {
            validate_template(template)?;
        }
        if !self.location_template.contains("{version}") {
            return Err(CollectError::ConfigParse(format!(
                "location template for {} must contain {{version}}: {}",
                self.kind, self.location_template
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_root: Option<Utf8PathBuf>,
    pub sources: Vec<SourceProfile>,
}

impl ResolvedConfig {
    pub fn source(&self, kind: SourceKind) -> Option<&SourceProfile> {
        self.sources.iter().find(|profile| profile.kind == kind)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves `path`, then `./stat-collect.json`, then the per-user config
    /// file, and finally the built-in profiles.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CollectError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CollectError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CollectError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CollectError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let entries = if config.sources.is_empty() {
            vec![
                SourceEntry::Shorthand("eurostat".to_string()),
                SourceEntry::Shorthand("prodcom".to_string()),
                SourceEntry::Shorthand("unido".to_string()),
            ]
        } else {
            config.sources
        };

        let sources = entries
            .into_iter()
            .map(|entry| {
                let profile = match entry {
                    SourceEntry::Shorthand(value) => SourceProfile::builtin(value.parse()?),
                    SourceEntry::Detailed(obj) => {
                        let mut profile = SourceProfile::builtin(obj.source.parse()?);
                        profile.apply(obj)?;
                        profile
                    }
                };
                profile.validate()?;
                Ok(profile)
            })
            .collect::<Result<Vec<_>, CollectError>>()?;

        if sources.is_empty() {
            return Err(CollectError::MissingConfig);
        }

        Ok(ResolvedConfig {
            schema_version,
            data_root: config.data_root.map(Utf8PathBuf::from),
            sources,
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "stat-collect")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

pub fn default_sdmx_metadata_types() -> Vec<MetadataType> {
    vec![
        MetadataType::Dataflow,
        MetadataType::Codelist,
        MetadataType::Conceptscheme,
    ]
}

fn builtin_ids(values: &[&str]) -> Vec<DatasetId> {
    values
        .iter()
        .filter_map(|value| value.parse().ok())
        .collect()
}

fn render(template: &str, dataset: &DatasetId) -> String {
    template.replace("{dataset}", dataset.as_str())
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn validate_template(template: &str) -> Result<(), CollectError> {
    let placeholder = Regex::new(r"\{([^{}]*)\}")
        .map_err(|err| CollectError::ConfigParse(err.to_string()))?;
    for capture in placeholder.captures_iter(template) {
        let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        if name != "dataset" && name != "version" {
            return Err(CollectError::ConfigParse(format!(
                "unknown placeholder {{{name}}} in template {template}"
            )));
        }
    }
    Ok(())
}
