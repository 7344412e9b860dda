use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{FullNameModel, LabelSelector, ObjectMeta};
use crate::poller::Phase;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullNameModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ObjectMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<BackupScheduleSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupScheduleStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<BackupTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Cron expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTemplate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_cluster_resources: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or_label_selectors: Vec<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_volumes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_locations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_volumes_to_fs_backup: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csi_snapshot_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub ordered_resources: HashMap<String, String>,
}

impl BackupTemplate {
    pub fn has_label_selector(&self) -> bool {
        self.label_selector.as_ref().is_some_and(|s| !s.is_empty())
            || self.or_label_selectors.iter().any(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SchedulePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_info: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulePhase {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "CREATING")]
    Creating,
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "FAILEDVALIDATION")]
    FailedValidation,
    #[serde(rename = "DELETING")]
    Deleting,
    #[default]
    #[serde(rename = "PHASE_UNSPECIFIED", other)]
    Unspecified,
}

impl Phase for SchedulePhase {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulePhase::Enabled | SchedulePhase::Paused | SchedulePhase::FailedValidation
        )
    }

    fn is_failure(&self) -> bool {
        matches!(self, SchedulePhase::FailedValidation)
    }

    fn name(&self) -> &'static str {
        match self {
            SchedulePhase::Unspecified => "PHASE_UNSPECIFIED",
            SchedulePhase::Pending => "PENDING",
            SchedulePhase::Creating => "CREATING",
            SchedulePhase::Enabled => "ENABLED",
            SchedulePhase::Paused => "PAUSED",
            SchedulePhase::FailedValidation => "FAILEDVALIDATION",
            SchedulePhase::Deleting => "DELETING",
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ScheduleRequest<'a> {
    pub schedule: &'a BackupSchedule,
}

#[derive(Debug, Deserialize)]
pub(super) struct ScheduleResponse {
    #[serde(default)]
    pub schedule: BackupSchedule,
}
