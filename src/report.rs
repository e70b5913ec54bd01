//! The `ome_configuration_report_info` data source: per-device compliance
//! of a baseline.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::models::DeviceComplianceReport;
use crate::client::OmeApi;
use crate::error::OmeError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::strip_nulls;

/// Data source type name.
pub const DATA_SOURCE_TYPE: &str = "ome_configuration_report_info";

/// What the user asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReportQuery {
    /// Baseline to report on.
    pub baseline_name: String,
    /// Also fetch attribute-level compliance of every device.
    pub fetch_attributes: bool,
}

impl ReportQuery {
    /// Decode the host's config document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(strip_nulls(value))
    }
}

/// Compliance of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCompliance {
    /// Device id.
    pub device_id: i64,
    /// Service tag.
    pub device_servicetag: String,
    /// Device name.
    pub device_name: String,
    /// Model.
    pub model: String,
    /// Device type code.
    pub device_type: i64,
    /// `COMPLIANT`, `NOT_COMPLIANT`, ...
    pub compliance_status: String,
    /// Time of the inventory the report was computed from.
    pub inventory_time: String,
    /// JSON text, empty unless attributes were requested and available.
    pub device_compliance_details: String,
}

impl From<DeviceComplianceReport> for DeviceCompliance {
    fn from(report: DeviceComplianceReport) -> Self {
        Self {
            device_id: report.id,
            device_servicetag: report.service_tag,
            device_name: report.device_name,
            model: report.model,
            device_type: report.device_type,
            compliance_status: report.compliance_status,
            inventory_time: report.inventory_time,
            device_compliance_details: String::new(),
        }
    }
}

/// The data source's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceReport {
    /// Baseline id.
    pub id: i64,
    /// Baseline name, as queried.
    pub baseline_name: String,
    /// Whether attribute details were fetched.
    pub fetch_attributes: bool,
    /// One row per device.
    pub compliance_report_device: Vec<DeviceCompliance>,
}

/// Read the compliance report of the named baseline.
#[instrument(skip(api))]
pub async fn read_report(
    api: &dyn OmeApi,
    baseline_name: &str,
    fetch_attributes: bool,
) -> Result<ComplianceReport, OmeError> {
    let baseline = api
        .baseline_by_name(baseline_name)
        .await?
        .ok_or_else(|| OmeError::UnknownBaseline(baseline_name.to_string()))?;

    let mut devices = Vec::new();
    for report in api.compliance_reports(baseline.id).await? {
        let device_id = report.id;
        let mut device = DeviceCompliance::from(report);
        if fetch_attributes {
            match api.device_compliance_details(baseline.id, device_id).await {
                Ok(details) => device.device_compliance_details = details.to_string(),
                Err(err) if err.is_not_found() => {
                    debug!(device_id, "no attribute details for device");
                },
                Err(err) => return Err(err),
            }
        }
        devices.push(device);
    }

    Ok(ComplianceReport {
        id: baseline.id,
        baseline_name: baseline_name.to_string(),
        fetch_attributes,
        compliance_report_device: devices,
    })
}

/// Schema of the `ome_configuration_report_info` data source.
pub fn schema() -> Schema {
    let device = AttributeType::object([
        ("device_id", AttributeType::Int64),
        ("device_servicetag", AttributeType::String),
        ("device_name", AttributeType::String),
        ("model", AttributeType::String),
        ("device_type", AttributeType::Int64),
        ("compliance_status", AttributeType::String),
        ("inventory_time", AttributeType::String),
        ("device_compliance_details", AttributeType::String),
    ]);

    Schema::v0()
        .with_description("Device compliance against a configuration baseline")
        .with_attribute(
            "id",
            Attribute::computed_int64().with_description("Baseline id"),
        )
        .with_attribute("baseline_name", Attribute::required_string())
        .with_attribute(
            "fetch_attributes",
            Attribute::optional_bool()
                .with_description("Include attribute-level compliance details")
                .with_default(json!(false)),
        )
        .with_attribute(
            "compliance_report_device",
            Attribute::new(AttributeType::list(device), AttributeFlags::computed()),
        )
}
