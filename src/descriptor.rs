use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::VersionStamp;

/// Catalog lookup key of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub name: String,
    pub stage: String,
    pub task_name: String,
}

impl ResourceKey {
    pub fn new(
        name: impl Into<String>,
        stage: impl Into<String>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            task_name: task_name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.stage, self.task_name)
    }
}

/// Catalog record describing one versioned dataset artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub schema_name: String,
    pub task_name: String,
    pub stage: String,
    pub location: String,
    pub comment: String,
    pub created_by: String,
    pub license: String,
    pub license_url: String,
    pub data_version: VersionStamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
    #[serde(skip)]
    location_template: String,
}

pub struct DescriptorDefaults<'a> {
    pub name: String,
    pub schema_name: &'a str,
    pub task_name: &'a str,
    pub stage: &'a str,
    pub location_template: String,
    pub comment: String,
    pub created_by: &'a str,
    pub license: &'a str,
    pub license_url: &'a str,
    pub version: VersionStamp,
}

impl ResourceDescriptor {
    pub fn new(defaults: DescriptorDefaults<'_>) -> Self {
        let mut descriptor = Self {
            name: defaults.name,
            schema_name: defaults.schema_name.to_string(),
            task_name: defaults.task_name.to_string(),
            stage: defaults.stage.to_string(),
            location: String::new(),
            comment: defaults.comment,
            created_by: defaults.created_by.to_string(),
            license: defaults.license.to_string(),
            license_url: defaults.license_url.to_string(),
            data_version: defaults.version.clone(),
            recorded_at: None,
            location_template: defaults.location_template,
        };
        descriptor.set_version(defaults.version);
        descriptor
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, &self.stage, &self.task_name)
    }

    /// Sets the data version and re-renders the storage location from the
    /// `{version}` template.
    pub fn set_version(&mut self, version: VersionStamp) {
        self.location = self
            .location_template
            .replace("{version}", version.as_str());
        self.data_version = version;
    }

    pub fn set_description(&mut self, description: &str) {
        let trimmed = description.trim();
        if !trimmed.is_empty() {
            self.comment = trimmed.to_string();
        }
    }
}
