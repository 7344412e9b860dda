//! Flux Helm feature (`tanzu-mission-control_helm_feature`).
//!
//! A singleton per cluster or cluster group, always named `helm`. Creating the
//! resource enables the feature and deleting it disables it.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::converter::{Block, ConvertError, PathNode, SchemaConverter};
use crate::error::{ProviderError, ProviderResult, ResultExt};
use crate::models::{FullNameModel, ObjectMeta};
use crate::resource_data::ResourceData;
use crate::scope::{parse_import_id, resolve_scope, set_scope, ScopeKind, ScopedFullName, SCOPE_KEY};

use super::{meta_block, ProviderContext, ScopedEndpoint, META_KEY, STATUS_KEY};

pub const RESOURCE_NAME: &str = "tanzu-mission-control_helm_feature";
pub const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster, ScopeKind::ClusterGroup];
pub const HELM_NAME: &str = "helm";

pub const SCHEMA_KEYS: &[&str] = &[SCOPE_KEY, META_KEY, STATUS_KEY];

const HELM_PATH: &str = "fluxcd/helm";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmFeature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullNameModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ObjectMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HelmStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Serialize)]
struct HelmRequest<'a> {
    helm: &'a HelmFeature,
}

#[derive(Debug, Deserialize)]
struct HelmListResponse {
    #[serde(default)]
    helms: Vec<HelmFeature>,
}

pub fn converter() -> SchemaConverter<HelmFeature> {
    SchemaConverter::new(Block::new([
        (META_KEY, meta_block()),
        (STATUS_KEY, PathNode::block([("phase", PathNode::leaf("status.phase"))])),
    ]))
}

fn describe(scoped: &ScopedFullName) -> String {
    format!("helm feature {}", scoped.resource_id())
}

/// Scope from the attributes, or from the ID after an import.
fn scope_of(data: &ResourceData) -> ProviderResult<ScopedFullName> {
    let scoped = resolve_scope(data, HELM_NAME, SCOPES);
    if !scoped.is_unknown() {
        return Ok(scoped);
    }
    let scoped = parse_import_id(data.id(), SCOPES)?;
    if scoped.name() != HELM_NAME {
        return Err(ProviderError::InvalidId {
            id: data.id().to_string(),
            reason: format!("the helm feature is always named {:?}", HELM_NAME),
        });
    }
    Ok(scoped)
}

pub async fn create(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = resolve_scope(data, HELM_NAME, SCOPES).require(SCOPES)?;
    let context = describe(&scoped);
    let mut helm = match converter().convert_to_model(data, &[STATUS_KEY]) {
        Ok(helm) => helm,
        Err(ConvertError::NoData) => HelmFeature::default(),
        Err(e) => return Err(ProviderError::from(e).context(context)),
    };
    helm.full_name = Some(FullNameModel::from(&scoped));

    let endpoint = ScopedEndpoint::for_scope(&scoped, HELM_PATH)?;
    info!("Enabling {}", context);
    let _: serde_json::Value = ctx
        .client
        .post_json(&endpoint.collection, &HelmRequest { helm: &helm })
        .await
        .context(&context)?;
    data.set_id(scoped.resource_id());
    read(ctx, data).await
}

pub async fn read(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_of(data)?;
    let endpoint = ScopedEndpoint::for_scope(&scoped, HELM_PATH)?;
    let found = ctx
        .client
        .get_json::<HelmListResponse>(&endpoint.collection, &endpoint.query_pairs())
        .await
        .map(|list| list.helms.into_iter().next());
    match found {
        Ok(Some(helm)) => {
            converter().fill_from_model(&helm, data).context(describe(&scoped))?;
            set_scope(data, &scoped)?;
            data.set_id(scoped.resource_id());
            Ok(())
        }
        Ok(None) => {
            warn!("{} is not enabled, removing it from state", describe(&scoped));
            data.clear();
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            warn!("{} is not enabled, removing it from state", describe(&scoped));
            data.clear();
            Ok(())
        }
        Err(e) => Err(e.context(describe(&scoped))),
    }
}

pub async fn delete(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_of(data)?;
    let endpoint = ScopedEndpoint::for_scope(&scoped, HELM_PATH)?;
    info!("Disabling {}", describe(&scoped));
    match ctx.client.delete(&endpoint.collection, &endpoint.query_pairs()).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => warn!("{} was already disabled", describe(&scoped)),
        Err(e) => return Err(e.context(describe(&scoped))),
    }
    data.clear();
    Ok(())
}

/// Imports by `managementClusterName/provisionerName/clusterName/helm` or
/// `clusterGroupName/helm`.
pub async fn import(ctx: &ProviderContext, data: &mut ResourceData, id: &str) -> ProviderResult<()> {
    data.set_id(id);
    read(ctx, data).await?;
    if data.is_cleared() {
        return Err(ProviderError::NotFound(format!("helm feature {} is not enabled", id)));
    }
    Ok(())
}
