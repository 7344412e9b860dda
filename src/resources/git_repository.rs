//! Flux git repository source (`tanzu-mission-control_git_repository`).
//!
//! Repositories are namespaced, so the resource ID carries the namespace
//! between the scope identity and the name. They are reconciled by Flux
//! itself and are not polled.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::converter::{Block, PathNode, SchemaConverter};
use crate::error::{Diagnostics, ProviderError, ProviderResult, ResultExt};
use crate::models::{FullNameModel, ObjectMeta};
use crate::resource_data::ResourceData;
use crate::scope::{resolve_scope, set_scope, ScopeKind, ScopedFullName, SCOPE_KEY};

use super::{ensure_unchanged, meta_block, required_name, ProviderContext, ScopedEndpoint, META_KEY, NAME_KEY, SPEC_KEY};

pub const RESOURCE_NAME: &str = "tanzu-mission-control_git_repository";
pub const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster, ScopeKind::ClusterGroup];

pub const NAMESPACE_NAME_KEY: &str = "namespace_name";
pub const URL_KEY: &str = "url";
pub const SECRET_REF_KEY: &str = "secret_ref";
pub const INTERVAL_KEY: &str = "interval";
pub const GIT_IMPLEMENTATION_KEY: &str = "git_implementation";
pub const REF_KEY: &str = "ref";

pub const SCHEMA_KEYS: &[&str] = &[NAME_KEY, NAMESPACE_NAME_KEY, SCOPE_KEY, META_KEY, SPEC_KEY];

const DEFAULT_INTERVAL: &str = "5m";
const GIT_IMPLEMENTATIONS: &[&str] = &["GO_GIT", "LIB_GIT2"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullNameModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ObjectMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<GitRepositorySpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name of a source secret in the same namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_implementation: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<RepositoryRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Serialize)]
struct RepositoryRequest<'a> {
    repository: &'a GitRepository,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    #[serde(default)]
    repository: GitRepository,
}

pub fn converter() -> SchemaConverter<GitRepository> {
    SchemaConverter::new(Block::new([
        (NAME_KEY, PathNode::leaf("fullName.name")),
        (NAMESPACE_NAME_KEY, PathNode::leaf("fullName.namespaceName")),
        (META_KEY, meta_block()),
        (
            SPEC_KEY,
            PathNode::block([
                (URL_KEY, PathNode::leaf("spec.url")),
                (SECRET_REF_KEY, PathNode::leaf("spec.secretRef")),
                (INTERVAL_KEY, PathNode::leaf("spec.interval")),
                (GIT_IMPLEMENTATION_KEY, PathNode::leaf("spec.gitImplementation")),
                (
                    REF_KEY,
                    PathNode::block([
                        ("branch", PathNode::leaf("spec.ref.branch")),
                        ("tag", PathNode::leaf("spec.ref.tag")),
                        ("semver", PathNode::leaf("spec.ref.semver")),
                        ("commit", PathNode::leaf("spec.ref.commit")),
                    ]),
                ),
            ]),
        ),
    ]))
}

pub fn validate(repository: &GitRepository) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let spec = repository.spec.clone().unwrap_or_default();
    match spec.url.as_deref() {
        None | Some("") => diags.push("spec.url", "repository URL is required"),
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://") || url.starts_with("ssh://")) => {
            diags.push("spec.url", format!("{:?} must use the http, https or ssh scheme", url))
        }
        Some(_) => {}
    }
    if let Some(implementation) = spec.git_implementation.as_deref() {
        if !GIT_IMPLEMENTATIONS.contains(&implementation) {
            diags.push(
                "spec.git_implementation",
                format!("{:?} is not one of {}", implementation, GIT_IMPLEMENTATIONS.join(", ")),
            );
        }
    }
    diags
}

/// Resource ID with the namespace inserted before the name.
pub fn repository_id(scoped: &ScopedFullName, namespace: &str) -> String {
    match scoped {
        ScopedFullName::Cluster(n) => [
            n.management_cluster_name.as_str(),
            n.provisioner_name.as_str(),
            n.cluster_name.as_str(),
            namespace,
            n.name.as_str(),
        ]
        .join("/"),
        ScopedFullName::ClusterGroup(n) => format!("{}/{}/{}", n.cluster_group_name, namespace, n.name),
        _ => String::new(),
    }
}

struct Target {
    scoped: ScopedFullName,
    namespace: String,
    endpoint: ScopedEndpoint,
}

impl Target {
    fn from_data(data: &ResourceData) -> ProviderResult<Self> {
        let name = required_name(data)?;
        let Some(namespace) = data.get_str(NAMESPACE_NAME_KEY).map(str::to_string) else {
            let mut diags = Diagnostics::new();
            diags.push(NAMESPACE_NAME_KEY, "namespace name is required");
            return Err(ProviderError::Validation(diags));
        };
        let scoped = resolve_scope(data, &name, SCOPES).require(SCOPES)?;
        let endpoint = ScopedEndpoint::for_scope(&scoped, &format!("namespaces/{}/fluxcd/gitrepositories", namespace))?;
        Ok(Target {
            scoped,
            namespace,
            endpoint,
        })
    }

    fn id(&self) -> String {
        repository_id(&self.scoped, &self.namespace)
    }

    fn describe(&self) -> String {
        format!("git repository {}", self.id())
    }

    fn item(&self) -> String {
        self.endpoint.item(self.scoped.name())
    }

    fn full_name(&self) -> FullNameModel {
        FullNameModel {
            namespace_name: Some(self.namespace.clone()),
            ..FullNameModel::from(&self.scoped)
        }
    }
}

pub fn build_model(data: &ResourceData) -> ProviderResult<GitRepository> {
    let target = Target::from_data(data)?;
    let mut repository = converter().convert_to_model(data, &[])?;
    repository.full_name = Some(target.full_name());
    let spec = repository.spec.get_or_insert_with(Default::default);
    if spec.interval.is_none() {
        spec.interval = Some(DEFAULT_INTERVAL.to_string());
    }
    Ok(repository)
}

async fn fetch(ctx: &ProviderContext, target: &Target) -> ProviderResult<GitRepository> {
    let response: RepositoryResponse = ctx
        .client
        .get_json(&target.item(), &target.endpoint.query_pairs())
        .await?;
    Ok(response.repository)
}

pub async fn create(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let target = Target::from_data(data)?;
    let repository = build_model(data).context(target.describe())?;
    validate(&repository).into_result().context(target.describe())?;

    info!("Creating {}", target.describe());
    let _: RepositoryResponse = ctx
        .client
        .post_json(&target.endpoint.collection, &RepositoryRequest { repository: &repository })
        .await
        .context(target.describe())?;
    data.set_id(target.id());
    read(ctx, data).await
}

pub async fn read(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let target = Target::from_data(data)?;
    match fetch(ctx, &target).await {
        Ok(repository) => {
            converter().fill_from_model(&repository, data).context(target.describe())?;
            set_scope(data, &target.scoped)?;
            data.set_id(target.id());
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            warn!("{} no longer exists, removing it from state", target.describe());
            data.clear();
            Ok(())
        }
        Err(e) => Err(e.context(target.describe())),
    }
}

pub async fn update(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    ensure_unchanged(data, &[NAME_KEY, NAMESPACE_NAME_KEY, SCOPE_KEY])?;
    let target = Target::from_data(data)?;
    let desired = build_model(data).context(target.describe())?;
    validate(&desired).into_result().context(target.describe())?;

    let mut current = fetch(ctx, &target).await.context(target.describe())?;
    current.spec = desired.spec;
    let mut meta = current.meta.unwrap_or_default();
    if let Some(desired_meta) = desired.meta {
        meta.description = desired_meta.description;
        meta.labels = desired_meta.labels;
    }
    current.meta = Some(meta);

    info!("Updating {}", target.describe());
    let _: RepositoryResponse = ctx
        .client
        .put_json(&target.item(), &RepositoryRequest { repository: &current })
        .await
        .context(target.describe())?;
    read(ctx, data).await
}

pub async fn delete(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let target = Target::from_data(data)?;
    info!("Deleting {}", target.describe());
    match ctx.client.delete(&target.item(), &target.endpoint.query_pairs()).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => warn!("{} was already deleted", target.describe()),
        Err(e) => return Err(e.context(target.describe())),
    }
    data.clear();
    Ok(())
}
