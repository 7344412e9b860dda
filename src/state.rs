//! YAML resource documents exchanged with the command line and the state diff shown to users.

use colored::*;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};
use std::fs::File;
use std::io::Write;

use crate::error::{ProviderError, ProviderResult};
use crate::resource_data::ResourceData;
use crate::resources::ResourceKind;

/// One resource instance as written by users and printed back after an operation.
///
/// ```yaml
/// type: tanzu-mission-control_backup_schedule
/// id: attached/attached/prod/nightly
/// attributes:
///   name: nightly
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceDocument {
    pub fn from_file(path: &str) -> ProviderResult<Self> {
        let file = File::open(path).map_err(ProviderError::Io)?;
        let doc = serde_yaml::from_reader(file).map_err(ProviderError::Serialization)?;
        Ok(doc)
    }

    pub fn from_yaml(text: &str) -> ProviderResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn kind(&self) -> ProviderResult<ResourceKind> {
        self.resource_type.parse()
    }

    /// Resource data restricted to the attributes `kind` declares.
    pub fn to_resource_data(&self, kind: ResourceKind) -> ResourceData {
        ResourceData::new(self.id.clone(), self.attributes.clone()).with_schema(kind.schema_keys())
    }

    pub fn from_state(kind: ResourceKind, data: &ResourceData) -> Self {
        ResourceDocument {
            resource_type: kind.type_name().to_string(),
            id: data.id().to_string(),
            attributes: data.attributes().clone(),
        }
    }

    pub fn to_yaml(&self) -> ProviderResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_to(&self, path: &str) -> ProviderResult<()> {
        let yaml = self.to_yaml()?;
        let mut file = File::create(path)?;
        file.write_all(yaml.as_bytes())?;
        debug!("Wrote {} state to {}", self.resource_type, path);
        Ok(())
    }
}

/// Colored unified diff of two YAML renderings, or `None` when they are equal.
pub fn render_diff(before: &str, after: &str) -> Option<String> {
    let diff = TextDiff::from_lines(before, after);
    let mut unified = diff.unified_diff();
    let unified = unified.context_radius(3).header("configured", "state");

    let mut out = String::new();
    for hunk in unified.iter_hunks() {
        out.push_str(&format!("{}\n", hunk.header().to_string().cyan()));
        for change in hunk.iter_changes() {
            let line = change.value().trim_end();
            match change.tag() {
                ChangeTag::Delete => out.push_str(&format!("{}\n", format!("- {}", line).red())),
                ChangeTag::Insert => out.push_str(&format!("{}\n", format!("+ {}", line).green())),
                ChangeTag::Equal => out.push_str(&format!("  {}\n", line)),
            }
        }
    }
    (!out.is_empty()).then_some(out)
}
