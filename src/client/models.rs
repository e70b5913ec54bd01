//! JSON models of the OME REST resources the provider consumes.
//!
//! Field names follow the server's PascalCase wire format. Unknown fields
//! are ignored and absent ones default, since OME omits members freely
//! between releases.

use serde::{Deserialize, Serialize};

/// Capability code of the advanced-license feature a baseline target needs.
pub const CAPABILITY_ADVANCED_LICENSE: i64 = 33;

/// Template view type of compliance templates.
pub const COMPLIANCE_VIEW_TYPE_ID: i64 = 1;

/// Target type id of a single device.
pub const TARGET_TYPE_DEVICE_ID: i64 = 1;

/// Target type name of a single device.
pub const TARGET_TYPE_DEVICE_NAME: &str = "DEVICE";

/// Job status id of a completed job.
pub const JOB_STATUS_SUCCESS: i64 = 2060;

/// Job status id of a running job.
pub const JOB_STATUS_RUNNING: i64 = 2050;

/// Notification type sent on every scheduled run.
pub const NOTIFY_ON_SCHEDULE: &str = "NOTIFY_ON_SCHEDULE";

/// Notification type sent only when devices drift.
pub const NOTIFY_ON_NON_COMPLIANCE: &str = "NOTIFY_ON_NON_COMPLIANCE";

/// An OData collection page.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    /// Link to the next page, relative to the appliance root.
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Body of a session creation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRequest<'a> {
    /// Account name.
    pub user_name: &'a str,
    /// Account password.
    pub password: &'a str,
    /// Always `API`.
    pub session_type: &'a str,
}

/// A created session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionInfo {
    /// Session id, used to delete the session.
    pub id: String,
}

/// A managed device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Device {
    /// Device id.
    pub id: i64,
    /// Vendor service tag.
    pub device_service_tag: String,
    /// Display name.
    pub device_name: String,
    /// Capability codes held by the device.
    pub device_capabilities: Vec<i64>,
}

impl Device {
    /// Whether the device may be a baseline target.
    pub fn has_advanced_license(&self) -> bool {
        self.device_capabilities
            .contains(&CAPABILITY_ADVANCED_LICENSE)
    }
}

/// A configuration template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Template {
    /// Template id.
    pub id: i64,
    /// Template name.
    pub name: String,
    /// View type (compliance, deployment, ...).
    pub view_type_id: i64,
}

/// Type descriptor of a baseline target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetType {
    /// Type id.
    pub id: i64,
    /// Type name.
    pub name: String,
}

/// A device (or group) a baseline is measured against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaselineTarget {
    /// Device id.
    pub id: i64,
    /// Target type.
    #[serde(rename = "Type")]
    pub target_type: TargetType,
}

impl BaselineTarget {
    /// A single-device target.
    pub fn device(id: i64) -> Self {
        Self {
            id,
            target_type: TargetType {
                id: TARGET_TYPE_DEVICE_ID,
                name: TARGET_TYPE_DEVICE_NAME.to_string(),
            },
        }
    }
}

/// Cron schedule of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Schedule {
    /// Cron expression.
    pub cron: String,
}

/// Notification settings of a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NotificationSettings {
    /// [`NOTIFY_ON_SCHEDULE`] or [`NOTIFY_ON_NON_COMPLIANCE`].
    pub notification_type: String,
    /// Recipients.
    pub email_addresses: Vec<String>,
    /// Schedule, when one is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Report format, upper case on the wire.
    pub output_format: String,
}

/// Create/update request body of a baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaselinePayload {
    /// Present on update only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Baseline name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Reference template id.
    pub template_id: i64,
    /// Devices to measure.
    pub baseline_targets: Vec<BaselineTarget>,
    /// Present iff scheduling is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<NotificationSettings>,
}

/// A baseline as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Baseline {
    /// Baseline id.
    pub id: i64,
    /// Baseline name.
    pub name: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Reference template id.
    pub template_id: i64,
    /// Reference template name.
    pub template_name: Option<String>,
    /// Id of the job that evaluates compliance; 0 until assigned.
    pub task_id: i64,
    /// Targets, always as ids.
    pub baseline_targets: Vec<BaselineTarget>,
    /// Notification settings, when scheduling is on.
    pub notification_settings: Option<NotificationSettings>,
}

impl Baseline {
    /// Target device ids in server order.
    pub fn target_ids(&self) -> Vec<i64> {
        self.baseline_targets.iter().map(|t| t.id).collect()
    }
}

/// Status of a job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobStatus {
    /// Status id.
    pub id: i64,
    /// Status name.
    pub name: String,
}

/// A server-side job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    /// Job id.
    pub id: i64,
    /// Status of the last run.
    pub last_run_status: JobStatus,
}

impl Job {
    /// Whether the last run completed successfully.
    pub fn succeeded(&self) -> bool {
        self.last_run_status.id == JOB_STATUS_SUCCESS
    }

    /// Whether the job is running now.
    pub fn is_running(&self) -> bool {
        self.last_run_status.id == JOB_STATUS_RUNNING
    }
}

/// One execution of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecutionHistory {
    /// Execution id; newer executions have larger ids.
    pub id: i64,
}

/// A detail record of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecutionHistoryDetail {
    /// Detail id.
    pub id: i64,
    /// Free-form message.
    pub value: String,
}

/// Compliance of one device against a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeviceComplianceReport {
    /// Device id.
    pub id: i64,
    /// Device name.
    pub device_name: String,
    /// Service tag.
    pub service_tag: String,
    /// Model.
    pub model: String,
    /// Device type code.
    pub device_type: i64,
    /// `COMPLIANT`, `NOT_COMPLIANT`, ...
    pub compliance_status: String,
    /// Time of the inventory the report was computed from.
    pub inventory_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_baseline_decodes_with_missing_members() {
        let baseline: Baseline = serde_json::from_value(json!({
            "Id": 5,
            "Name": "b1",
            "TemplateId": 7,
            "BaselineTargets": [{"Id": 10, "Type": {"Id": 1, "Name": "DEVICE"}}],
            "@odata.id": "/api/TemplateService/Baselines(5)"
        }))
        .unwrap();

        assert_eq!(baseline.task_id, 0);
        assert_eq!(baseline.target_ids(), vec![10]);
        assert!(baseline.notification_settings.is_none());
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = BaselinePayload {
            id: None,
            name: "b1".into(),
            description: String::new(),
            template_id: 7,
            baseline_targets: vec![BaselineTarget::device(10)],
            notification_settings: None,
        };
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire["TemplateId"], 7);
        assert_eq!(wire["BaselineTargets"][0]["Type"]["Name"], "DEVICE");
        assert!(wire.get("Id").is_none());
        assert!(wire.get("NotificationSettings").is_none());
    }

    #[test]
    fn test_collection_next_link() {
        let page: Collection<Device> = serde_json::from_value(json!({
            "value": [{"Id": 1, "DeviceServiceTag": "SVC1", "DeviceCapabilities": [33]}],
            "@odata.nextLink": "/api/DeviceService/Devices?$skip=1"
        }))
        .unwrap();

        assert!(page.value[0].has_advanced_license());
        assert_eq!(
            page.next_link.as_deref(),
            Some("/api/DeviceService/Devices?$skip=1")
        );
    }

    #[test]
    fn test_job_status_helpers() {
        let mut job = Job::default();
        job.last_run_status.id = JOB_STATUS_RUNNING;
        assert!(job.is_running());
        assert!(!job.succeeded());
        job.last_run_status.id = JOB_STATUS_SUCCESS;
        assert!(job.succeeded());
    }
}
