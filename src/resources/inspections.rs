//! Cluster inspection scans data source (`tanzu-mission-control_inspections`).
//!
//! The list attribute is not declared by hand: it is the single-inspection block
//! projected under the response's `scans[]`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::converter::{Block, PathNode, SchemaConverter};
use crate::error::{ProviderResult, ResultExt};
use crate::models::FullNameModel;
use crate::resource_data::ResourceData;
use crate::scope::{resolve_scope, set_scope, ScopeKind, ScopedFullName, SCOPE_KEY};

use super::{ProviderContext, ScopedEndpoint, NAME_KEY, STATUS_KEY};

pub const DATA_SOURCE_NAME: &str = "tanzu-mission-control_inspections";
pub const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster];

pub const INSPECTIONS_KEY: &str = "inspections";
pub const TOTAL_COUNT_KEY: &str = "total_count";
pub const OFFSET_KEY: &str = "offset";
pub const INSPECTION_TYPE_KEY: &str = "inspection_type";
pub const REPORT_KEY: &str = "report";

pub const SCHEMA_KEYS: &[&str] = &[SCOPE_KEY, NAME_KEY, OFFSET_KEY, INSPECTIONS_KEY, TOTAL_COUNT_KEY];

const SCANS_PATH: &str = "inspection/scans";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullNameModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<InspectionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InspectionStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionSpec {
    /// `CIS`, `CONFORMANCE` or `LITE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

/// One page of scans. Counts are strings on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scans: Vec<Inspection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<String>,
}

pub fn inspection_converter() -> SchemaConverter<Inspection> {
    SchemaConverter::new(Block::new([
        ("management_cluster_name", PathNode::leaf("fullName.managementClusterName")),
        ("provisioner_name", PathNode::leaf("fullName.provisionerName")),
        ("cluster_name", PathNode::leaf("fullName.clusterName")),
        (NAME_KEY, PathNode::leaf("fullName.name")),
        (INSPECTION_TYPE_KEY, PathNode::leaf("spec.inspectionType")),
        (
            STATUS_KEY,
            PathNode::block([
                ("phase", PathNode::leaf("status.phase")),
                ("phase_info", PathNode::leaf("status.phaseInfo")),
                (REPORT_KEY, PathNode::leaf("status.report")),
            ]),
        ),
    ]))
}

pub fn list_converter() -> SchemaConverter<InspectionList> {
    SchemaConverter::new(Block::new([
        (INSPECTIONS_KEY, inspection_converter().nested_list("scans")),
        (TOTAL_COUNT_KEY, PathNode::number_as_string("totalCount")),
    ]))
}

/// Data source ID: the cluster identity without a resource name.
fn cluster_id(scoped: &ScopedFullName) -> String {
    match scoped {
        ScopedFullName::Cluster(n) => format!("{}/{}/{}", n.management_cluster_name, n.provisioner_name, n.cluster_name),
        other => other.resource_id(),
    }
}

fn search_params(data: &ResourceData, endpoint: &ScopedEndpoint) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = endpoint
        .query
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    if let Some(name) = data.get_str(NAME_KEY) {
        query.push(("searchScope.name".into(), name.to_string()));
    }
    match data.get_ok(OFFSET_KEY) {
        Some(Value::Number(n)) => query.push(("pagination.offset".into(), n.to_string())),
        Some(Value::String(s)) => query.push(("pagination.offset".into(), s.clone())),
        _ => {}
    }
    query
}

pub async fn read(ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
    let scoped = resolve_scope(data, "", SCOPES).require(SCOPES)?;
    let context = format!("inspections of cluster {}", cluster_id(&scoped));
    let endpoint = ScopedEndpoint::for_scope(&scoped, SCANS_PATH)?;
    let params = search_params(data, &endpoint);
    let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let list: InspectionList = match ctx.client.get_json(&endpoint.collection, &pairs).await {
        Ok(list) => list,
        Err(e) if e.is_not_found() => {
            warn!("No inspections found for cluster {}", cluster_id(&scoped));
            InspectionList::default()
        }
        Err(e) => return Err(e.context(context)),
    };
    debug!("Fetched {} inspections for cluster {}", list.scans.len(), cluster_id(&scoped));

    list_converter().fill_from_model(&list, data).context(&context)?;
    set_scope(data, &scoped)?;
    data.set_id(cluster_id(&scoped));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TmcClient;
    use crate::config::PollSettings;
    use mockito::Matcher;
    use serde_json::json;

    fn scope() -> Value {
        json!([{"cluster": [{
            "management_cluster_name": "attached",
            "provisioner_name": "attached",
            "cluster_name": "prod"
        }]}])
    }

    #[test]
    fn test_list_fill_uses_nested_projection() {
        let list = InspectionList {
            scans: vec![
                Inspection {
                    full_name: Some(FullNameModel {
                        cluster_name: Some("prod".into()),
                        name: Some("scan-1".into()),
                        ..Default::default()
                    }),
                    status: Some(InspectionStatus {
                        phase: Some("COMPLETE".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Inspection::default(),
            ],
            total_count: Some("2".into()),
        };
        let filled = list_converter().fill_map(&list).unwrap();
        assert_eq!(filled[TOTAL_COUNT_KEY], json!(2));
        assert_eq!(
            filled[INSPECTIONS_KEY],
            json!([
                {"cluster_name": "prod", "name": "scan-1", "status": [{"phase": "COMPLETE"}]},
                {}
            ])
        );
    }

    #[test]
    fn test_list_convert_turns_count_into_string() {
        let attrs = json!({
            "inspections": [{"name": "scan-1", "inspection_type": "CIS"}],
            "total_count": 1
        });
        let list = list_converter()
            .convert_map_to_model(attrs.as_object().unwrap(), &[])
            .unwrap();
        assert_eq!(list.total_count.as_deref(), Some("1"));
        assert_eq!(list.scans[0].spec.as_ref().unwrap().inspection_type.as_deref(), Some("CIS"));
    }

    #[tokio::test]
    async fn test_read_pages_with_offset() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/v1alpha1/clusters/prod/inspection/scans")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("fullName.managementClusterName".into(), "attached".into()),
                Matcher::UrlEncoded("fullName.provisionerName".into(), "attached".into()),
                Matcher::UrlEncoded("pagination.offset".into(), "20".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "scans": [{
                        "fullName": {"managementClusterName": "attached", "provisionerName": "attached", "clusterName": "prod", "name": "scan-21"},
                        "spec": {"inspectionType": "LITE"},
                        "status": {"phase": "COMPLETE"}
                    }],
                    "totalCount": "21"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = TmcClient::with_urls(&server.url(), &server.url(), "api-token");
        client.set_access_token("t").await;
        let ctx = ProviderContext::with_client(client, PollSettings::default());
        let mut data = ResourceData::from_value("", json!({"scope": scope(), "offset": 20}))
            .unwrap()
            .with_schema(SCHEMA_KEYS);
        read(&ctx, &mut data).await.unwrap();

        assert_eq!(data.id(), "attached/attached/prod");
        assert_eq!(data.get(TOTAL_COUNT_KEY), Some(&json!(21)));
        let inspections = data.get(INSPECTIONS_KEY).and_then(Value::as_array).unwrap();
        assert_eq!(inspections.len(), 1);
        assert_eq!(inspections[0]["name"], json!("scan-21"));
        assert_eq!(inspections[0]["inspection_type"], json!("LITE"));
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_without_scans_unsets_previous_results() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/v1alpha1/clusters/prod/inspection/scans")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = TmcClient::with_urls(&server.url(), &server.url(), "api-token");
        client.set_access_token("t").await;
        let ctx = ProviderContext::with_client(client, PollSettings::default());
        let mut data = ResourceData::from_value(
            "",
            json!({"scope": scope(), "inspections": [{"name": "stale-scan"}], "total_count": 1}),
        )
        .unwrap();
        read(&ctx, &mut data).await.unwrap();
        assert!(data.get(INSPECTIONS_KEY).is_none());
        assert!(data.get(TOTAL_COUNT_KEY).is_none());
        assert_eq!(data.id(), "attached/attached/prod");
    }
}
