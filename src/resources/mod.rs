/*!
    Terraform resources and data sources backed by TMC.

    Each family module declares its API model, its path mapping and its
    CRUD handlers. This module holds what they share: the provider context,
    endpoint construction for cluster and cluster-group scoped objects, the `meta`
    block mapping and dispatch by Terraform type name.
*/

pub mod backup_schedule;
pub mod git_repository;
pub mod helm_feature;
pub mod inspections;
pub mod target_location;

use log::warn;
use std::fmt;
use std::str::FromStr;

use crate::client::TmcClient;
use crate::config::{PollSettings, ProviderConfig};
use crate::converter::PathNode;
use crate::error::{Diagnostics, ProviderError, ProviderResult};
use crate::resource_data::ResourceData;
use crate::scope::{parse_import_id, resolve_scope, ScopeKind, ScopedFullName};

pub const NAME_KEY: &str = "name";
pub const META_KEY: &str = "meta";
pub const SPEC_KEY: &str = "spec";
pub const STATUS_KEY: &str = "status";

pub const DESCRIPTION_KEY: &str = "description";
pub const LABELS_KEY: &str = "labels";
pub const ANNOTATIONS_KEY: &str = "annotations";
pub const UID_KEY: &str = "uid";
pub const RESOURCE_VERSION_KEY: &str = "resource_version";

/// What every CRUD handler needs from the configured provider.
pub struct ProviderContext {
    pub client: TmcClient,
    pub poll: PollSettings,
}

impl ProviderContext {
    pub fn new(config: &ProviderConfig) -> Self {
        ProviderContext {
            client: TmcClient::new(config),
            poll: config.poll_settings(),
        }
    }

    pub fn with_client(client: TmcClient, poll: PollSettings) -> Self {
        ProviderContext { client, poll }
    }
}

/// The `meta` block shared by every TMC object.
pub fn meta_block() -> PathNode {
    PathNode::block([
        (DESCRIPTION_KEY, PathNode::leaf("meta.description")),
        (LABELS_KEY, PathNode::map("meta.labels.*")),
        (ANNOTATIONS_KEY, PathNode::map("meta.annotations.*")),
        (UID_KEY, PathNode::leaf("meta.uid")),
        (RESOURCE_VERSION_KEY, PathNode::leaf("meta.resourceVersion")),
    ])
}

pub fn required_name(data: &ResourceData) -> ProviderResult<String> {
    match data.get_str(NAME_KEY) {
        Some(name) => Ok(name.to_string()),
        None => {
            let mut diags = Diagnostics::new();
            diags.push(NAME_KEY, "name is required");
            Err(ProviderError::Validation(diags))
        }
    }
}

/// Scope for operations on existing state: from the attributes when
/// present, otherwise rebuilt from the resource ID (after an import).
pub fn scope_from_state(data: &ResourceData, allowed: &[ScopeKind]) -> ProviderResult<ScopedFullName> {
    if let Some(name) = data.get_str(NAME_KEY) {
        let scoped = resolve_scope(data, name, allowed);
        if !scoped.is_unknown() {
            return Ok(scoped);
        }
    }
    parse_import_id(data.id(), allowed)
}

/// Rejects changes to attributes that address the remote object.
pub fn ensure_unchanged(data: &ResourceData, keys: &[&str]) -> ProviderResult<()> {
    let mut diags = Diagnostics::new();
    for key in keys {
        if data.has_change(key) {
            diags.push(*key, "cannot be changed in place, the resource must be replaced");
        }
    }
    diags.into_result()
}

/// Collection URL and query parameters of a cluster or cluster-group
/// scoped object kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedEndpoint {
    pub collection: String,
    pub query: Vec<(&'static str, String)>,
}

impl ScopedEndpoint {
    /// `suffix` is the path below the cluster or cluster group, e.g.
    /// `dataprotection/schedules`.
    pub fn for_scope(scoped: &ScopedFullName, suffix: &str) -> ProviderResult<Self> {
        match scoped {
            ScopedFullName::Cluster(n) => Ok(ScopedEndpoint {
                collection: format!("/v1alpha1/clusters/{}/{}", n.cluster_name, suffix),
                query: vec![
                    ("fullName.managementClusterName", n.management_cluster_name.clone()),
                    ("fullName.provisionerName", n.provisioner_name.clone()),
                ],
            }),
            ScopedFullName::ClusterGroup(n) => Ok(ScopedEndpoint {
                collection: format!("/v1alpha1/clustergroups/{}/{}", n.cluster_group_name, suffix),
                query: Vec::new(),
            }),
            other => Err(ProviderError::UnknownScope {
                allowed: format!("cluster, cluster_group (got {})", other),
            }),
        }
    }

    pub fn item(&self, name: &str) -> String {
        format!("{}/{}", self.collection, name)
    }

    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

/// Terraform type names served by this provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    BackupSchedule,
    TargetLocation,
    GitRepository,
    HelmFeature,
    Inspections,
}

impl ResourceKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::RESOURCE_NAME,
            ResourceKind::TargetLocation => target_location::RESOURCE_NAME,
            ResourceKind::GitRepository => git_repository::RESOURCE_NAME,
            ResourceKind::HelmFeature => helm_feature::RESOURCE_NAME,
            ResourceKind::Inspections => inspections::DATA_SOURCE_NAME,
        }
    }

    /// Top-level attributes a handler may write.
    pub fn schema_keys(self) -> &'static [&'static str] {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::SCHEMA_KEYS,
            ResourceKind::TargetLocation => target_location::SCHEMA_KEYS,
            ResourceKind::GitRepository => git_repository::SCHEMA_KEYS,
            ResourceKind::HelmFeature => helm_feature::SCHEMA_KEYS,
            ResourceKind::Inspections => inspections::SCHEMA_KEYS,
        }
    }

    pub fn is_data_source(self) -> bool {
        matches!(self, ResourceKind::Inspections)
    }

    fn read_only(self, operation: &str) -> ProviderError {
        ProviderError::Config(format!("{} is a data source and does not support {}", self, operation))
    }

    pub async fn create(self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::create(ctx, data).await,
            ResourceKind::TargetLocation => target_location::create(ctx, data).await,
            ResourceKind::GitRepository => git_repository::create(ctx, data).await,
            ResourceKind::HelmFeature => helm_feature::create(ctx, data).await,
            ResourceKind::Inspections => Err(self.read_only("create")),
        }
    }

    pub async fn read(self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::read(ctx, data).await,
            ResourceKind::TargetLocation => target_location::read(ctx, data).await,
            ResourceKind::GitRepository => git_repository::read(ctx, data).await,
            ResourceKind::HelmFeature => helm_feature::read(ctx, data).await,
            ResourceKind::Inspections => inspections::read(ctx, data).await,
        }
    }

    pub async fn update(self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::update(ctx, data).await,
            ResourceKind::TargetLocation => target_location::update(ctx, data).await,
            ResourceKind::GitRepository => git_repository::update(ctx, data).await,
            ResourceKind::HelmFeature => {
                warn!("{} has no updatable attributes, refreshing state instead", self);
                helm_feature::read(ctx, data).await
            }
            ResourceKind::Inspections => Err(self.read_only("update")),
        }
    }

    pub async fn delete(self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::delete(ctx, data).await,
            ResourceKind::TargetLocation => target_location::delete(ctx, data).await,
            ResourceKind::GitRepository => git_repository::delete(ctx, data).await,
            ResourceKind::HelmFeature => helm_feature::delete(ctx, data).await,
            ResourceKind::Inspections => Err(self.read_only("delete")),
        }
    }

    pub async fn import(self, ctx: &ProviderContext, data: &mut ResourceData, id: &str) -> ProviderResult<()> {
        match self {
            ResourceKind::BackupSchedule => backup_schedule::import(ctx, data, id).await,
            ResourceKind::TargetLocation => target_location::import(ctx, data, id).await,
            ResourceKind::HelmFeature => helm_feature::import(ctx, data, id).await,
            ResourceKind::GitRepository => Err(ProviderError::Config(format!("{} does not support import", self))),
            ResourceKind::Inspections => Err(self.read_only("import")),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for ResourceKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ResourceKind::BackupSchedule,
            ResourceKind::TargetLocation,
            ResourceKind::GitRepository,
            ResourceKind::HelmFeature,
            ResourceKind::Inspections,
        ]
        .into_iter()
        .find(|k| k.type_name() == s)
        .ok_or_else(|| ProviderError::Config(format!("unknown resource type {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ClusterFullName, ClusterGroupFullName};
    use serde_json::json;

    #[test]
    fn test_endpoint_for_cluster_scope() {
        let scoped = ScopedFullName::Cluster(ClusterFullName {
            management_cluster_name: "attached".into(),
            provisioner_name: "attached".into(),
            cluster_name: "prod".into(),
            name: "nightly".into(),
            org_id: None,
        });
        let endpoint = ScopedEndpoint::for_scope(&scoped, "dataprotection/schedules").unwrap();
        assert_eq!(endpoint.item("nightly"), "/v1alpha1/clusters/prod/dataprotection/schedules/nightly");
        assert_eq!(
            endpoint.query_pairs(),
            vec![("fullName.managementClusterName", "attached"), ("fullName.provisionerName", "attached")]
        );
    }

    #[test]
    fn test_endpoint_for_cluster_group_scope() {
        let scoped = ScopedFullName::ClusterGroup(ClusterGroupFullName {
            cluster_group_name: "default".into(),
            name: "nightly".into(),
            org_id: None,
        });
        let endpoint = ScopedEndpoint::for_scope(&scoped, "dataprotection/schedules").unwrap();
        assert_eq!(endpoint.collection, "/v1alpha1/clustergroups/default/dataprotection/schedules");
        assert!(endpoint.query.is_empty());
    }

    #[test]
    fn test_endpoint_rejects_unknown_scope() {
        assert!(ScopedEndpoint::for_scope(&ScopedFullName::Unknown, "x").is_err());
    }

    #[test]
    fn test_scope_from_state_falls_back_to_id() {
        let mut data = ResourceData::from_value("", json!({})).unwrap();
        data.set_id("default/nightly");
        let scoped = scope_from_state(&data, &[ScopeKind::Cluster, ScopeKind::ClusterGroup]).unwrap();
        assert_eq!(scoped.kind(), Some(ScopeKind::ClusterGroup));
    }

    #[test]
    fn test_resource_kind_from_type_name() {
        for kind in [
            ResourceKind::BackupSchedule,
            ResourceKind::TargetLocation,
            ResourceKind::GitRepository,
            ResourceKind::HelmFeature,
            ResourceKind::Inspections,
        ] {
            assert_eq!(kind.type_name().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("tanzu-mission-control_cluster".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_ensure_unchanged_reports_every_key() {
        let mut data = ResourceData::from_value("", json!({"name": "a", "scope": []})).unwrap();
        data.set("name", json!("b")).unwrap();
        data.set("scope", json!([{"cluster": []}])).unwrap();
        match ensure_unchanged(&data, &["name", "scope"]).unwrap_err() {
            ProviderError::Validation(diags) => assert_eq!(diags.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }
}
