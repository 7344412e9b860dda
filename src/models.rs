//! API model types shared by several resource families.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::scope::ScopedFullName;

/// Full name of a scoped TMC object. Each family fills the subset of
/// fields its API uses; unset fields are not transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullNameModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&ScopedFullName> for FullNameModel {
    fn from(scoped: &ScopedFullName) -> Self {
        match scoped {
            ScopedFullName::Cluster(n) => FullNameModel {
                org_id: n.org_id.clone(),
                management_cluster_name: Some(n.management_cluster_name.clone()),
                provisioner_name: Some(n.provisioner_name.clone()),
                cluster_name: Some(n.cluster_name.clone()),
                name: Some(n.name.clone()),
                ..Default::default()
            },
            ScopedFullName::ClusterGroup(n) => FullNameModel {
                org_id: n.org_id.clone(),
                cluster_group_name: Some(n.cluster_group_name.clone()),
                name: Some(n.name.clone()),
                ..Default::default()
            },
            ScopedFullName::Provider(n) => FullNameModel {
                provider_name: Some(n.provider_name.clone()),
                name: Some(n.name.clone()),
                ..Default::default()
            },
            ScopedFullName::Unknown => FullNameModel::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub match_labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}
