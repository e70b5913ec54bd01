//! Access to the OME REST service.
//!
//! [`OmeApi`] is the surface the reconciliation engine consumes. It is
//! object-safe so the engine can run against the live appliance
//! ([`http::OmeClient`]) or the in-memory [`fake::FakeOme`].
//!
//! [`Connector`] opens authenticated handles. One handle backs one host
//! operation; see [`crate::session`].

pub mod fake;
pub mod http;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OmeError;
use models::{
    Baseline, BaselinePayload, Device, DeviceComplianceReport, ExecutionHistory,
    ExecutionHistoryDetail, Job, Template,
};

/// Operations the provider performs against an authenticated OME session.
#[async_trait]
pub trait OmeApi: Send + Sync {
    /// Fetch one device by id.
    async fn device(&self, id: i64) -> Result<Device, OmeError>;

    /// Fetch every device carrying the given service tag.
    async fn devices_by_service_tag(&self, tag: &str) -> Result<Vec<Device>, OmeError>;

    /// Fetch one template by id. A missing template is `Ok(None)`.
    async fn template_by_id(&self, id: i64) -> Result<Option<Template>, OmeError>;

    /// Find a template by exact name.
    async fn template_by_name(&self, name: &str) -> Result<Option<Template>, OmeError>;

    /// Submit a new baseline.
    async fn create_baseline(&self, payload: &BaselinePayload) -> Result<Baseline, OmeError>;

    /// Replace an existing baseline.
    async fn update_baseline(&self, id: i64, payload: &BaselinePayload)
        -> Result<Baseline, OmeError>;

    /// Remove baselines by id.
    async fn delete_baselines(&self, ids: &[i64]) -> Result<(), OmeError>;

    /// Fetch one baseline by id.
    async fn baseline(&self, id: i64) -> Result<Baseline, OmeError>;

    /// Find a baseline by exact name.
    async fn baseline_by_name(&self, name: &str) -> Result<Option<Baseline>, OmeError>;

    /// Fetch a job by id.
    async fn job(&self, id: i64) -> Result<Job, OmeError>;

    /// Executions of a job.
    async fn execution_histories(&self, job_id: i64) -> Result<Vec<ExecutionHistory>, OmeError>;

    /// Detail records of one execution.
    async fn execution_history_details(
        &self,
        job_id: i64,
        history_id: i64,
    ) -> Result<Vec<ExecutionHistoryDetail>, OmeError>;

    /// Per-device compliance of a baseline.
    async fn compliance_reports(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<DeviceComplianceReport>, OmeError>;

    /// Attribute-level compliance detail of one device, as raw JSON.
    async fn device_compliance_details(
        &self,
        baseline_id: i64,
        device_id: i64,
    ) -> Result<serde_json::Value, OmeError>;

    /// End the session. Idempotent; failures are not reported.
    async fn close(&self);
}

/// Opens authenticated [`OmeApi`] handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Authenticate and return a handle, or fail with
    /// [`OmeError::AuthFailed`].
    async fn open(&self) -> Result<Arc<dyn OmeApi>, OmeError>;
}
