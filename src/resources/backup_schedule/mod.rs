/*!
    Backup schedule resource (`tanzu-mission-control_backup_schedule`).

    Schedules live under a cluster or a cluster group. Create and update wait for
    the data protection controller to accept the schedule: `ENABLED` or `PAUSED`
    settle the wait, `FAILEDVALIDATION` fails it.
*/

pub mod model;

use log::{info, warn};
use serde_json::json;

use crate::converter::{Block, PathNode, SchemaConverter};
use crate::error::{Diagnostics, ProviderResult, ResultExt};
use crate::models::FullNameModel;
use crate::poller::wait_for_phase;
use crate::resource_data::ResourceData;
use crate::scope::{parse_import_id, resolve_scope, set_scope, ScopeKind, ScopedFullName, SCOPE_KEY};

use super::{
    ensure_unchanged, meta_block, required_name, scope_from_state, ProviderContext, ScopedEndpoint, META_KEY,
    NAME_KEY, SPEC_KEY, STATUS_KEY,
};
pub use model::{BackupSchedule, BackupScheduleSpec, BackupTemplate, Schedule, SchedulePhase};
use model::{ScheduleRequest, ScheduleResponse};

pub const RESOURCE_NAME: &str = "tanzu-mission-control_backup_schedule";
pub const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster, ScopeKind::ClusterGroup];

const SCHEDULES_PATH: &str = "dataprotection/schedules";

pub const BACKUP_SCOPE_KEY: &str = "backup_scope";
pub const FULL_CLUSTER: &str = "FULL_CLUSTER";
pub const SET_NAMESPACES: &str = "SET_NAMESPACES";
pub const LABEL_SELECTOR: &str = "LABEL_SELECTOR";

pub const PAUSED_KEY: &str = "paused";
pub const SCHEDULE_KEY: &str = "schedule";
pub const RATE_KEY: &str = "rate";
pub const TEMPLATE_KEY: &str = "template";
pub const INCLUDED_NAMESPACES_KEY: &str = "included_namespaces";
pub const EXCLUDED_NAMESPACES_KEY: &str = "excluded_namespaces";
pub const INCLUDED_RESOURCES_KEY: &str = "included_resources";
pub const EXCLUDED_RESOURCES_KEY: &str = "excluded_resources";
pub const INCLUDE_CLUSTER_RESOURCES_KEY: &str = "include_cluster_resources";
pub const BACKUP_TTL_KEY: &str = "backup_ttl";
pub const SNAPSHOT_VOLUMES_KEY: &str = "snapshot_volumes";
pub const STORAGE_LOCATION_KEY: &str = "storage_location";
pub const VOLUME_SNAPSHOT_LOCATIONS_KEY: &str = "volume_snapshot_locations";
pub const FS_BACKUP_KEY: &str = "default_volumes_to_fs_backup";
pub const CSI_SNAPSHOT_TIMEOUT_KEY: &str = "csi_snapshot_timeout";
pub const ORDERED_RESOURCES_KEY: &str = "ordered_resources";
pub const LABEL_SELECTOR_KEY: &str = "label_selector";
pub const OR_LABEL_SELECTOR_KEY: &str = "or_label_selector";
pub const MATCH_LABELS_KEY: &str = "match_labels";
pub const MATCH_EXPRESSION_KEY: &str = "match_expression";
pub const PHASE_KEY: &str = "phase";
pub const PHASE_INFO_KEY: &str = "phase_info";

pub const SCHEMA_KEYS: &[&str] = &[NAME_KEY, SCOPE_KEY, BACKUP_SCOPE_KEY, META_KEY, SPEC_KEY, STATUS_KEY];

fn label_selector_block(prefix: &str) -> Vec<(&'static str, PathNode)> {
    vec![
        (MATCH_LABELS_KEY, PathNode::map(&format!("{}.matchLabels.*", prefix))),
        (
            MATCH_EXPRESSION_KEY,
            PathNode::repeated([
                ("key", PathNode::leaf(&format!("{}.matchExpressions[].key", prefix))),
                ("operator", PathNode::leaf(&format!("{}.matchExpressions[].operator", prefix))),
                ("values", PathNode::leaf(&format!("{}.matchExpressions[].values", prefix))),
            ]),
        ),
    ]
}

pub fn converter() -> SchemaConverter<BackupSchedule> {
    SchemaConverter::new(Block::new([
        (NAME_KEY, PathNode::leaf("fullName.name")),
        (META_KEY, meta_block()),
        (
            SPEC_KEY,
            PathNode::block([
                (PAUSED_KEY, PathNode::leaf("spec.paused")),
                (SCHEDULE_KEY, PathNode::block([(RATE_KEY, PathNode::leaf("spec.schedule.rate"))])),
                (
                    TEMPLATE_KEY,
                    PathNode::block([
                        (INCLUDED_NAMESPACES_KEY, PathNode::leaf("spec.template.includedNamespaces")),
                        (EXCLUDED_NAMESPACES_KEY, PathNode::list("spec.template.excludedNamespaces[]")),
                        (INCLUDED_RESOURCES_KEY, PathNode::leaf("spec.template.includedResources")),
                        (EXCLUDED_RESOURCES_KEY, PathNode::leaf("spec.template.excludedResources")),
                        (INCLUDE_CLUSTER_RESOURCES_KEY, PathNode::leaf("spec.template.includeClusterResources")),
                        (BACKUP_TTL_KEY, PathNode::leaf("spec.template.ttl")),
                        (SNAPSHOT_VOLUMES_KEY, PathNode::leaf("spec.template.snapshotVolumes")),
                        (STORAGE_LOCATION_KEY, PathNode::leaf("spec.template.storageLocation")),
                        (VOLUME_SNAPSHOT_LOCATIONS_KEY, PathNode::leaf("spec.template.volumeSnapshotLocations")),
                        (FS_BACKUP_KEY, PathNode::leaf("spec.template.defaultVolumesToFsBackup")),
                        (CSI_SNAPSHOT_TIMEOUT_KEY, PathNode::leaf("spec.template.csiSnapshotTimeout")),
                        (ORDERED_RESOURCES_KEY, PathNode::map("spec.template.orderedResources.*")),
                        (LABEL_SELECTOR_KEY, PathNode::block(label_selector_block("spec.template.labelSelector"))),
                        (
                            OR_LABEL_SELECTOR_KEY,
                            PathNode::repeated(label_selector_block("spec.template.orLabelSelectors[]")),
                        ),
                    ]),
                ),
            ]),
        ),
        (
            STATUS_KEY,
            PathNode::block([
                (PHASE_KEY, PathNode::leaf("status.phase")),
                (PHASE_INFO_KEY, PathNode::leaf("status.phaseInfo")),
            ]),
        ),
    ]))
}

/// Checks the template against the declared backup scope, collecting every violation.
pub fn validate(backup_scope: Option<&str>, schedule: &BackupSchedule) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let spec = schedule.spec.clone().unwrap_or_default();
    if spec.schedule.as_ref().and_then(|s| s.rate.as_deref()).map_or(true, str::is_empty) {
        diags.push("spec.schedule.rate", "a cron schedule rate must be set");
    }
    let template = spec.template.unwrap_or_default();
    let has_namespaces = !template.included_namespaces.is_empty();
    let has_selector = template.has_label_selector();
    let namespaces_attr = "spec.template.included_namespaces";
    let selector_attr = "spec.template.label_selector";

    match backup_scope {
        Some(FULL_CLUSTER) => {
            if has_namespaces {
                diags.push(namespaces_attr, format!("must not be set when {} is {}", BACKUP_SCOPE_KEY, FULL_CLUSTER));
            }
            if has_selector {
                diags.push(selector_attr, format!("must not be set when {} is {}", BACKUP_SCOPE_KEY, FULL_CLUSTER));
            }
        }
        Some(SET_NAMESPACES) => {
            if !has_namespaces {
                diags.push(namespaces_attr, format!("must be set when {} is {}", BACKUP_SCOPE_KEY, SET_NAMESPACES));
            }
            if has_selector {
                diags.push(selector_attr, format!("must not be set when {} is {}", BACKUP_SCOPE_KEY, SET_NAMESPACES));
            }
        }
        Some(LABEL_SELECTOR) => {
            if !has_selector {
                diags.push(
                    selector_attr,
                    format!("a label selector or OR label selector must be set when {} is {}", BACKUP_SCOPE_KEY, LABEL_SELECTOR),
                );
            }
            if has_namespaces {
                diags.push(namespaces_attr, format!("must not be set when {} is {}", BACKUP_SCOPE_KEY, LABEL_SELECTOR));
            }
        }
        Some(other) => diags.push(
            BACKUP_SCOPE_KEY,
            format!("{:?} is not one of {}, {}, {}", other, FULL_CLUSTER, SET_NAMESPACES, LABEL_SELECTOR),
        ),
        None => diags.push(BACKUP_SCOPE_KEY, "backup scope is required"),
    }
    diags
}

/// The backup scope implied by a schedule read back from TMC.
pub fn infer_backup_scope(schedule: &BackupSchedule) -> &'static str {
    let template = schedule.spec.as_ref().and_then(|s| s.template.as_ref());
    match template {
        Some(t) if t.has_label_selector() => LABEL_SELECTOR,
        Some(t) if !t.included_namespaces.is_empty() => SET_NAMESPACES,
        _ => FULL_CLUSTER,
    }
}

fn describe(scoped: &ScopedFullName) -> String {
    format!("backup schedule {}", scoped.resource_id())
}

/// Builds the request model: generic conversion plus the resolved full name.
pub fn build_model(data: &ResourceData, scoped: &ScopedFullName) -> ProviderResult<BackupSchedule> {
    let mut schedule = converter().convert_to_model(data, &[STATUS_KEY])?;
    schedule.full_name = Some(FullNameModel::from(scoped));
    schedule.status = None;
    Ok(schedule)
}

async fn fetch(ctx: &ProviderContext, scoped: &ScopedFullName) -> ProviderResult<BackupSchedule> {
    let endpoint = ScopedEndpoint::for_scope(scoped, SCHEDULES_PATH)?;
    let response: ScheduleResponse = ctx
        .client
        .get_json(&endpoint.item(scoped.name()), &endpoint.query_pairs())
        .await?;
    Ok(response.schedule)
}

async fn wait_until_settled(ctx: &ProviderContext, scoped: &ScopedFullName) -> ProviderResult<SchedulePhase> {
    wait_for_phase(&describe(scoped), ctx.poll, move || async move {
        let schedule = fetch(ctx, scoped).await?;
        Ok(schedule.status.and_then(|s| s.phase).unwrap_or_default())
    })
    .await
}

fn write_state(data: &mut ResourceData, scoped: &ScopedFullName, schedule: &BackupSchedule) -> ProviderResult<()> {
    converter().fill_from_model(schedule, data)?;
    set_scope(data, scoped)?;
    if data.get_str(BACKUP_SCOPE_KEY).is_none() {
        data.set(BACKUP_SCOPE_KEY, json!(infer_backup_scope(schedule)))?;
    }
    data.set_id(scoped.resource_id());
    Ok(())
}

pub async fn create(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let name = required_name(data)?;
    let scoped = resolve_scope(data, &name, SCOPES).require(SCOPES)?;
    let context = describe(&scoped);
    let schedule = build_model(data, &scoped).context(&context)?;
    validate(data.get_str(BACKUP_SCOPE_KEY), &schedule).into_result().context(&context)?;

    let endpoint = ScopedEndpoint::for_scope(&scoped, SCHEDULES_PATH)?;
    info!("Creating {}", context);
    let _: ScheduleResponse = ctx
        .client
        .post_json(&endpoint.collection, &ScheduleRequest { schedule: &schedule })
        .await
        .context(&context)?;
    data.set_id(scoped.resource_id());

    wait_until_settled(ctx, &scoped).await.context(&context)?;
    read(ctx, data).await
}

pub async fn read(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_from_state(data, SCOPES)?;
    match fetch(ctx, &scoped).await {
        Ok(schedule) => write_state(data, &scoped, &schedule).context(describe(&scoped)),
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
    validate(data.get_str(BACKUP_SCOPE_KEY), &desired).into_result().context(&context)?;

    let mut current = fetch(ctx, &scoped).await.context(&context)?;
    current.spec = desired.spec;
    let mut meta = current.meta.unwrap_or_default();
    if let Some(desired_meta) = desired.meta {
        meta.description = desired_meta.description;
        meta.labels = desired_meta.labels;
        meta.annotations = desired_meta.annotations;
    }
    current.meta = Some(meta);
    current.status = None;

    let endpoint = ScopedEndpoint::for_scope(&scoped, SCHEDULES_PATH)?;
    info!("Updating {}", context);
    let _: ScheduleResponse = ctx
        .client
        .put_json(&endpoint.item(&name), &ScheduleRequest { schedule: &current })
        .await
        .context(&context)?;

    wait_until_settled(ctx, &scoped).await.context(&context)?;
    read(ctx, data).await
}

pub async fn delete(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = scope_from_state(data, SCOPES)?;
    let endpoint = ScopedEndpoint::for_scope(&scoped, SCHEDULES_PATH)?;
    info!("Deleting {}", describe(&scoped));
    match ctx
        .client
        .delete(&endpoint.item(scoped.name()), &endpoint.query_pairs())
        .await
    {
        Ok(()) => {}
        Err(e) if e.is_not_found() => warn!("{} was already deleted", describe(&scoped)),
        Err(e) => return Err(e.context(describe(&scoped))),
    }
    data.clear();
    Ok(())
}

/// Imports by `managementClusterName/provisionerName/clusterName/name` or
/// `clusterGroupName/name`.
pub async fn import(ctx: &ProviderContext, data: &mut ResourceData, id: &str) -> ProviderResult<()> {
    let scoped = parse_import_id(id, SCOPES)?;
    let schedule = fetch(ctx, &scoped).await.context(describe(&scoped))?;
    write_state(data, &scoped, &schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelSelector;
    use serde_json::Value;

    fn data(v: Value) -> ResourceData {
        ResourceData::from_value("", v).unwrap()
    }

    fn with_template(template: BackupTemplate) -> BackupSchedule {
        BackupSchedule {
            spec: Some(BackupScheduleSpec {
                schedule: Some(Schedule {
                    rate: Some("0 2 * * *".into()),
                }),
                template: Some(template),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_namespaces_requires_included_namespaces() {
        let diags = validate(Some(SET_NAMESPACES), &with_template(BackupTemplate::default()));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().unwrap().attribute, "spec.template.included_namespaces");
    }

    #[test]
    fn test_validation_collects_every_violation() {
        let template = BackupTemplate {
            included_namespaces: vec!["app".into()],
            label_selector: Some(LabelSelector {
                match_labels: [("app".to_string(), "web".to_string())].into_iter().collect(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut schedule = with_template(template);
        schedule.spec.as_mut().unwrap().schedule = None;
        let diags = validate(Some(FULL_CLUSTER), &schedule);
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn test_label_selector_scope_accepts_or_selectors() {
        let template = BackupTemplate {
            or_label_selectors: vec![LabelSelector {
                match_labels: [("tier".to_string(), "db".to_string())].into_iter().collect(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(validate(Some(LABEL_SELECTOR), &with_template(template)).is_empty());
    }

    #[test]
    fn test_unknown_backup_scope_is_reported() {
        let diags = validate(Some("EVERYTHING"), &with_template(BackupTemplate::default()));
        assert_eq!(diags.iter().next().unwrap().attribute, BACKUP_SCOPE_KEY);
    }

    #[test]
    fn test_infer_backup_scope() {
        assert_eq!(infer_backup_scope(&BackupSchedule::default()), FULL_CLUSTER);
        let namespaces = with_template(BackupTemplate {
            included_namespaces: vec!["a".into()],
            ..Default::default()
        });
        assert_eq!(infer_backup_scope(&namespaces), SET_NAMESPACES);
    }

    #[test]
    fn test_build_model_for_cluster_scope() {
        let d = data(json!({
            "name": "nightly",
            "backup_scope": "FULL_CLUSTER",
            "scope": [{"cluster": [{
                "cluster_name": "prod",
                "management_cluster_name": "attached",
                "provisioner_name": "attached"
            }]}],
            "spec": [{
                "schedule": [{"rate": "0 2 * * *"}],
                "template": [{"backup_ttl": "86400s", "excluded_namespaces": ["kube-system"]}]
            }],
            "status": [{"phase": "ENABLED"}]
        }));
        let scoped = resolve_scope(&d, "nightly", SCOPES);
        let schedule = build_model(&d, &scoped).unwrap();
        let full_name = schedule.full_name.clone().unwrap();
        assert_eq!(full_name.name.as_deref(), Some("nightly"));
        assert_eq!(full_name.cluster_name.as_deref(), Some("prod"));
        assert_eq!(full_name.cluster_group_name, None);
        let spec = schedule.spec.clone().unwrap();
        let template = spec.template.unwrap();
        assert_eq!(spec.schedule.unwrap().rate.as_deref(), Some("0 2 * * *"));
        assert_eq!(template.ttl.as_deref(), Some("86400s"));
        assert_eq!(template.excluded_namespaces, vec!["kube-system"]);
        assert!(schedule.status.is_none());
        assert!(validate(Some(FULL_CLUSTER), &schedule).is_empty());
        assert_eq!(scoped.resource_id(), "attached/attached/prod/nightly");
    }

    #[test]
    fn test_or_label_selectors_map_per_element() {
        let d = data(json!({
            "name": "sel",
            "spec": [{"template": [{"or_label_selector": [
                {"match_labels": {"app": "a"}},
                {"match_expression": [{"key": "tier", "operator": "In", "values": ["db", "cache"]}]}
            ]}]}]
        }));
        let schedule = converter().convert_to_model(&d, &[]).unwrap();
        let selectors = schedule.spec.unwrap().template.unwrap().or_label_selectors;
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[0].match_labels.get("app").map(String::as_str), Some("a"));
        assert!(selectors[0].match_expressions.is_empty());
        assert!(selectors[1].match_labels.is_empty());
        assert_eq!(selectors[1].match_expressions[0].values, vec!["db", "cache"]);
    }
}
