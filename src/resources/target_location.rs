//! Data protection target location (`tanzu-mission-control_target_location`),
//! a backup storage location owned by a credential provider.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::converter::{Block, PathNode, SchemaConverter};
use crate::error::{Diagnostics, ProviderError, ProviderResult, ResultExt};
use crate::models::{FullNameModel, ObjectMeta};
use crate::poller::{wait_for_phase, Phase};
use crate::resource_data::ResourceData;
use crate::scope::{parse_import_id, resolve_scope, set_scope, ScopeKind, ScopedFullName, SCOPE_KEY};

use super::{ensure_unchanged, meta_block, required_name, scope_from_state, ProviderContext, META_KEY, NAME_KEY, SPEC_KEY, STATUS_KEY};

pub const RESOURCE_NAME: &str = "tanzu-mission-control_target_location";
pub const SCOPES: &[ScopeKind] = &[ScopeKind::Provider];

pub const TARGET_PROVIDER_KEY: &str = "target_provider";
pub const CREDENTIAL_KEY: &str = "credential";
pub const CA_CERT_KEY: &str = "ca_cert";
pub const REGION_KEY: &str = "region";
pub const BUCKET_KEY: &str = "bucket";
pub const S3_FORCE_PATH_STYLE_KEY: &str = "s3_force_path_style";
pub const PUBLIC_URL_KEY: &str = "public_url";
pub const ASSIGNED_GROUPS_KEY: &str = "assigned_groups";
pub const CLUSTER_KEY: &str = "cluster";
pub const CLUSTER_GROUP_KEY: &str = "cluster_group";

pub const SCHEMA_KEYS: &[&str] = &[NAME_KEY, SCOPE_KEY, META_KEY, SPEC_KEY, STATUS_KEY];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullNameModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ObjectMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<TargetLocationSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TargetLocationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLocationSpec {
    /// `AWS` or `AZURE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_force_path_style: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assigned_groups: Vec<AssignedGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Either a cluster or a cluster group allowed to use the location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignedGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<AssignedCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustergroup: Option<AssignedClusterGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignedClusterGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLocationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<LocationPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_info: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationPhase {
    Pending,
    Creating,
    Ready,
    Error,
    Updating,
    Deleting,
    #[default]
    #[serde(rename = "PHASE_UNSPECIFIED", other)]
    Unspecified,
}

impl Phase for LocationPhase {
    fn is_terminal(&self) -> bool {
        matches!(self, LocationPhase::Ready | LocationPhase::Error)
    }

    fn is_failure(&self) -> bool {
        matches!(self, LocationPhase::Error)
    }

    fn name(&self) -> &'static str {
        match self {
            LocationPhase::Unspecified => "PHASE_UNSPECIFIED",
            LocationPhase::Pending => "PENDING",
            LocationPhase::Creating => "CREATING",
            LocationPhase::Ready => "READY",
            LocationPhase::Error => "ERROR",
            LocationPhase::Updating => "UPDATING",
            LocationPhase::Deleting => "DELETING",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationRequest<'a> {
    backup_location: &'a TargetLocation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationResponse {
    #[serde(default)]
    backup_location: TargetLocation,
}

pub fn converter() -> SchemaConverter<TargetLocation> {
    SchemaConverter::new(Block::new([
        (NAME_KEY, PathNode::leaf("fullName.name")),
        (META_KEY, meta_block()),
        (
            SPEC_KEY,
            PathNode::block([
                (TARGET_PROVIDER_KEY, PathNode::leaf("spec.targetProvider")),
                (CREDENTIAL_KEY, PathNode::block([(NAME_KEY, PathNode::leaf("spec.credential.name"))])),
                (CA_CERT_KEY, PathNode::leaf("spec.caCert")),
                (REGION_KEY, PathNode::leaf("spec.region")),
                (BUCKET_KEY, PathNode::leaf("spec.bucket")),
                (S3_FORCE_PATH_STYLE_KEY, PathNode::leaf("spec.s3ForcePathStyle")),
                (PUBLIC_URL_KEY, PathNode::leaf("spec.publicUrl")),
                (
                    ASSIGNED_GROUPS_KEY,
                    PathNode::repeated([
                        (
                            CLUSTER_KEY,
                            PathNode::block([
                                ("management_cluster_name", PathNode::leaf("spec.assignedGroups[].cluster.managementClusterName")),
                                ("provisioner_name", PathNode::leaf("spec.assignedGroups[].cluster.provisionerName")),
                                ("cluster_name", PathNode::leaf("spec.assignedGroups[].cluster.name")),
                            ]),
                        ),
                        (
                            CLUSTER_GROUP_KEY,
                            PathNode::block([("cluster_group_name", PathNode::leaf("spec.assignedGroups[].clustergroup.name"))]),
                        ),
                    ]),
                ),
            ]),
        ),
        (
            STATUS_KEY,
            PathNode::block([
                ("phase", PathNode::leaf("status.phase")),
                ("phase_info", PathNode::leaf("status.phaseInfo")),
            ]),
        ),
    ]))
}

pub fn validate(location: &TargetLocation) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let spec = location.spec.clone().unwrap_or_default();
    if spec.target_provider.as_deref().map_or(true, str::is_empty) {
        diags.push("spec.target_provider", "target provider is required");
    }
    if spec.credential.and_then(|c| c.name).map_or(true, |n| n.is_empty()) {
        diags.push("spec.credential.name", "credential name is required");
    }
    for (i, group) in spec.assigned_groups.iter().enumerate() {
        if group.cluster.is_some() == group.clustergroup.is_some() {
            diags.push(
                format!("spec.assigned_groups.{}", i),
                "exactly one of cluster or cluster_group must be set",
            );
        }
    }
    diags
}

fn collection(scoped: &ScopedFullName) -> ProviderResult<String> {
    match scoped {
        ScopedFullName::Provider(n) => Ok(format!("/v1alpha1/dataprotection/providers/{}/backuplocations", n.provider_name)),
        other => Err(ProviderError::UnknownScope {
            allowed: format!("provider (got {})", other),
        }),
    }
}

fn describe(scoped: &ScopedFullName) -> String {
    format!("target location {}", scoped.resource_id())
}

pub fn build_model(data: &ResourceData, scoped: &ScopedFullName) -> ProviderResult<TargetLocation> {
    let mut location = converter().convert_to_model(data, &[STATUS_KEY])?;
    location.full_name = Some(FullNameModel::from(scoped));
    location.status = None;
    Ok(location)
}

async fn fetch(ctx: &ProviderContext, scoped: &ScopedFullName) -> ProviderResult<TargetLocation> {
    let path = format!("{}/{}", collection(scoped)?, scoped.name());
    let response: LocationResponse = ctx.client.get_json(&path, &[]).await?;
    Ok(response.backup_location)
}

async fn wait_until_ready(ctx: &ProviderContext, scoped: &ScopedFullName) -> ProviderResult<LocationPhase> {
    wait_for_phase(&describe(scoped), ctx.poll, move || async move {
        let location = fetch(ctx, scoped).await?;
        Ok(location.status.and_then(|s| s.phase).unwrap_or_default())
    })
    .await
}

fn write_state(data: &mut ResourceData, scoped: &ScopedFullName, location: &TargetLocation) -> ProviderResult<()> {
    converter().fill_from_model(location, data)?;
    set_scope(data, scoped)?;
    data.set_id(scoped.resource_id());
    Ok(())
}

pub async fn create(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let name = required_name(data)?;
    let scoped = resolve_scope(data, &name, SCOPES).require(SCOPES)?;
    let context = describe(&scoped);
    let location = build_model(data, &scoped).context(&context)?;
    validate(&location).into_result().context(&context)?;

    info!("Creating {}", context);
    let _: LocationResponse = ctx
        .client
        .post_json(&collection(&scoped)?, &LocationRequest { backup_location: &location })
        .await
        .context(&context)?;
    data.set_id(scoped.resource_id());

    wait_until_ready(ctx, &scoped).await.context(&context)?;
    read(ctx, data).await
}

pub async fn read(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_from_state(data, SCOPES)?;
    match fetch(ctx, &scoped).await {
        Ok(location) => write_state(data, &scoped, &location).context(describe(&scoped)),
        Err(e) if e.is_not_found() => {
            warn!("{} no longer exists, removing it from state", describe(&scoped));
            data.clear();
            Ok(())
        }
        Err(e) => Err(e.context(describe(&scoped))),
    }
}

pub async fn update(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    ensure_unchanged(data, &[NAME_KEY, SCOPE_KEY])?;
    let name = required_name(data)?;
    let scoped = resolve_scope(data, &name, SCOPES).require(SCOPES)?;
    let context = describe(&scoped);
    let desired = build_model(data, &scoped).context(&context)?;
    validate(&desired).into_result().context(&context)?;

    let mut current = fetch(ctx, &scoped).await.context(&context)?;
    current.spec = desired.spec;
    let mut meta = current.meta.unwrap_or_default();
    if let Some(desired_meta) = desired.meta {
        meta.description = desired_meta.description;
        meta.labels = desired_meta.labels;
    }
    current.meta = Some(meta);
    current.status = None;

    info!("Updating {}", context);
    let path = format!("{}/{}", collection(&scoped)?, name);
    let _: LocationResponse = ctx
        .client
        .put_json(&path, &LocationRequest { backup_location: &current })
        .await
        .context(&context)?;

    wait_until_ready(ctx, &scoped).await.context(&context)?;
    read(ctx, data).await
}

pub async fn delete(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_from_state(data, SCOPES)?;
    let path = format!("{}/{}", collection(&scoped)?, scoped.name());
    info!("Deleting {}", describe(&scoped));
    match ctx.client.delete(&path, &[]).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => warn!("{} was already deleted", describe(&scoped)),
        Err(e) => return Err(e.context(describe(&scoped))),
    }
    data.clear();
    Ok(())
}

/// Imports by `providerName/name`.
pub async fn import(ctx: &ProviderContext, data: &mut ResourceData, id: &str) -> ProviderResult<()> {
    let scoped = parse_import_id(id, SCOPES)?;
    let location = fetch(ctx, &scoped).await.context(describe(&scoped))?;
    write_state(data, &scoped, &location)
}
