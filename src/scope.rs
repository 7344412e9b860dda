/*!
    Scope resolution for scoped TMC resources.

    Every scoped resource carries a `scope` block with one sub-block per addressing
    scheme (`cluster`, `cluster_group`, `provider`). The resolver picks the populated
    sub-block, builds the matching full name and stamps the resource name onto it.
*/

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::converter::value::{block_object, get_string, is_populated};
use crate::error::{ProviderError, ProviderResult};
use crate::resource_data::ResourceData;

pub const SCOPE_KEY: &str = "scope";

pub const CLUSTER_NAME_KEY: &str = "cluster_name";
pub const MANAGEMENT_CLUSTER_NAME_KEY: &str = "management_cluster_name";
pub const PROVISIONER_NAME_KEY: &str = "provisioner_name";
pub const CLUSTER_GROUP_NAME_KEY: &str = "cluster_group_name";
pub const PROVIDER_NAME_KEY: &str = "provider_name";
pub const CREDENTIAL_NAME_KEY: &str = "credential_name";
pub const ASSIGNED_GROUP_NAME_KEY: &str = "assigned_group_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Cluster,
    ClusterGroup,
    Provider,
}

impl ScopeKind {
    pub fn block_key(self) -> &'static str {
        match self {
            ScopeKind::Cluster => "cluster",
            ScopeKind::ClusterGroup => "cluster_group",
            ScopeKind::Provider => "provider",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.block_key())
    }
}

/// Anything that addresses exactly one remote resource instance.
pub trait FullName {
    fn kind(&self) -> ScopeKind;
    fn name(&self) -> &str;
    /// `/`-joined identity, the Terraform resource ID.
    fn resource_id(&self) -> String;
    /// Identity attributes as they appear inside the scope sub-block.
    fn identity(&self) -> Map<String, Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFullName {
    pub management_cluster_name: String,
    pub provisioner_name: String,
    pub cluster_name: String,
    pub name: String,
    pub org_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterGroupFullName {
    pub cluster_group_name: String,
    pub name: String,
    pub org_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFullName {
    pub provider_name: String,
    pub name: String,
    pub credential_name: String,
    pub assigned_group_name: String,
}

impl FullName for ClusterFullName {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Cluster
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_id(&self) -> String {
        [
            self.management_cluster_name.as_str(),
            self.provisioner_name.as_str(),
            self.cluster_name.as_str(),
            self.name.as_str(),
        ]
        .join("/")
    }

    fn identity(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(CLUSTER_NAME_KEY.into(), json!(self.cluster_name));
        m.insert(MANAGEMENT_CLUSTER_NAME_KEY.into(), json!(self.management_cluster_name));
        m.insert(PROVISIONER_NAME_KEY.into(), json!(self.provisioner_name));
        m
    }
}

impl FullName for ClusterGroupFullName {
    fn kind(&self) -> ScopeKind {
        ScopeKind::ClusterGroup
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_id(&self) -> String {
        format!("{}/{}", self.cluster_group_name, self.name)
    }

    fn identity(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(CLUSTER_GROUP_NAME_KEY.into(), json!(self.cluster_group_name));
        m
    }
}

impl FullName for ProviderFullName {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Provider
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_id(&self) -> String {
        format!("{}/{}", self.provider_name, self.name)
    }

    fn identity(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(PROVIDER_NAME_KEY.into(), json!(self.provider_name));
        if !self.credential_name.is_empty() {
            m.insert(CREDENTIAL_NAME_KEY.into(), json!(self.credential_name));
        }
        if !self.assigned_group_name.is_empty() {
            m.insert(ASSIGNED_GROUP_NAME_KEY.into(), json!(self.assigned_group_name));
        }
        m
    }
}

/// The resolved address of a scoped resource, or `Unknown` when no allowed
/// scope sub-block was populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedFullName {
    Cluster(ClusterFullName),
    ClusterGroup(ClusterGroupFullName),
    Provider(ProviderFullName),
    Unknown,
}

impl ScopedFullName {
    fn as_full_name(&self) -> Option<&dyn FullName> {
        match self {
            ScopedFullName::Cluster(n) => Some(n),
            ScopedFullName::ClusterGroup(n) => Some(n),
            ScopedFullName::Provider(n) => Some(n),
            ScopedFullName::Unknown => None,
        }
    }

    pub fn kind(&self) -> Option<ScopeKind> {
        self.as_full_name().map(|n| n.kind())
    }

    pub fn name(&self) -> &str {
        self.as_full_name().map_or("", |n| n.name())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ScopedFullName::Unknown)
    }

    pub fn resource_id(&self) -> String {
        self.as_full_name().map(|n| n.resource_id()).unwrap_or_default()
    }

    /// Turns the unknown sentinel into the configuration error users see.
    pub fn require(self, allowed: &[ScopeKind]) -> ProviderResult<Self> {
        match self {
            ScopedFullName::Unknown => Err(ProviderError::UnknownScope {
                allowed: allowed_list(allowed),
            }),
            resolved => Ok(resolved),
        }
    }
}

impl fmt::Display for ScopedFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_full_name() {
            Some(n) => write!(f, "{} {}", n.kind(), n.resource_id()),
            None => f.write_str("unknown scope"),
        }
    }
}

fn allowed_list(allowed: &[ScopeKind]) -> String {
    allowed.iter().map(|k| k.block_key()).collect::<Vec<_>>().join(", ")
}

/// Reads the `scope` attribute of `data` and resolves it for `name`.
pub fn resolve_scope(data: &ResourceData, name: &str, allowed: &[ScopeKind]) -> ScopedFullName {
    resolve_scope_value(data.get(SCOPE_KEY), name, allowed)
}

/// First allowed variant, in declared order, whose sub-block is populated wins.
pub fn resolve_scope_value(scope: Option<&Value>, name: &str, allowed: &[ScopeKind]) -> ScopedFullName {
    let Some(scope) = scope.and_then(block_object) else {
        return ScopedFullName::Unknown;
    };
    let populated: Vec<(ScopeKind, &Map<String, Value>)> = allowed
        .iter()
        .filter_map(|kind| {
            scope
                .get(kind.block_key())
                .and_then(block_object)
                .filter(|b| b.values().any(is_populated))
                .map(|b| (*kind, b))
        })
        .collect();

    let Some((kind, block)) = populated.first() else {
        return ScopedFullName::Unknown;
    };
    if populated.len() > 1 {
        let ignored: Vec<&str> = populated[1..].iter().map(|(k, _)| k.block_key()).collect();
        warn!(
            "Scope of {} sets more than one of [{}]; using {} and ignoring {:?}",
            name,
            allowed_list(allowed),
            kind,
            ignored
        );
    }

    match kind {
        ScopeKind::Cluster => ScopedFullName::Cluster(ClusterFullName {
            management_cluster_name: get_string(block, MANAGEMENT_CLUSTER_NAME_KEY),
            provisioner_name: get_string(block, PROVISIONER_NAME_KEY),
            cluster_name: get_string(block, CLUSTER_NAME_KEY),
            name: name.to_string(),
            org_id: None,
        }),
        ScopeKind::ClusterGroup => ScopedFullName::ClusterGroup(ClusterGroupFullName {
            cluster_group_name: get_string(block, CLUSTER_GROUP_NAME_KEY),
            name: name.to_string(),
            org_id: None,
        }),
        ScopeKind::Provider => ScopedFullName::Provider(ProviderFullName {
            provider_name: get_string(block, PROVIDER_NAME_KEY),
            name: name.to_string(),
            credential_name: get_string(block, CREDENTIAL_NAME_KEY),
            assigned_group_name: get_string(block, ASSIGNED_GROUP_NAME_KEY),
        }),
    }
}

/// The single-variant scope block for state, `{variant: [{identity}]}`.
pub fn flatten_scope(scoped: &ScopedFullName) -> Value {
    let mut fragment = Map::new();
    if let Some(n) = scoped.as_full_name() {
        fragment.insert(
            n.kind().block_key().to_string(),
            Value::Array(vec![Value::Object(n.identity())]),
        );
    }
    Value::Object(fragment)
}

/// Writes the flattened scope into the `scope` attribute.
pub fn set_scope(data: &mut ResourceData, scoped: &ScopedFullName) -> ProviderResult<()> {
    data.set(SCOPE_KEY, Value::Array(vec![flatten_scope(scoped)]))
}

/// Rebuilds a full name from an import ID by its segment count:
/// four segments address a cluster, two a cluster group or provider.
pub fn parse_import_id(id: &str, allowed: &[ScopeKind]) -> ProviderResult<ScopedFullName> {
    let invalid = |reason: String| ProviderError::InvalidId {
        id: id.to_string(),
        reason,
    };
    let parts: Vec<&str> = id.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid("empty segment".into()));
    }
    match parts.as_slice() {
        [mgmt, prov, cluster, name] if allowed.contains(&ScopeKind::Cluster) => {
            Ok(ScopedFullName::Cluster(ClusterFullName {
                management_cluster_name: mgmt.to_string(),
                provisioner_name: prov.to_string(),
                cluster_name: cluster.to_string(),
                name: name.to_string(),
                org_id: None,
            }))
        }
        [group, name] if allowed.contains(&ScopeKind::ClusterGroup) => {
            Ok(ScopedFullName::ClusterGroup(ClusterGroupFullName {
                cluster_group_name: group.to_string(),
                name: name.to_string(),
                org_id: None,
            }))
        }
        [provider, name] if allowed.contains(&ScopeKind::Provider) => {
            Ok(ScopedFullName::Provider(ProviderFullName {
                provider_name: provider.to_string(),
                name: name.to_string(),
                ..Default::default()
            }))
        }
        _ => Err(invalid(format!(
            "expected {} separated by '/'",
            expected_shapes(allowed)
        ))),
    }
}

fn expected_shapes(allowed: &[ScopeKind]) -> String {
    allowed
        .iter()
        .map(|k| match k {
            ScopeKind::Cluster => "managementClusterName/provisionerName/clusterName/name",
            ScopeKind::ClusterGroup => "clusterGroupName/name",
            ScopeKind::Provider => "providerName/name",
        })
        .collect::<Vec<_>>()
        .join(" or ")
}
