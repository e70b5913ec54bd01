//! Test harness for [`ProviderService`] implementations.
//!
//! Drives a provider directly, without a gRPC server. Combined with
//! [`FakeOme`](crate::client::fake::FakeOme) it runs the whole baseline
//! lifecycle in memory.
//!
//! # Example
//!
//! ```ignore
//! use ome_provider::client::fake::FakeOme;
//! use ome_provider::testing::ProviderTester;
//! use ome_provider::OmeProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_baseline() {
//!     let fake = FakeOme::new()
//!         .with_device(10, "SVC1", &[33])
//!         .with_compliance_template(7, "tpl1");
//!     let tester = ProviderTester::new(OmeProvider::with_connector(fake.clone()));
//!     tester.configure(json!({"host": "ome.lab", "username": "admin", "password": "pw"}))
//!         .await
//!         .unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("ome_configuration_baseline", json!({
//!             "baseline_name": "b1",
//!             "ref_template_name": "tpl1",
//!             "device_servicetags": ["SVC1"]
//!         }))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["ref_template_id"], 7);
//! }
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ResourceState};

/// Wraps a provider and exposes its operations with test-friendly
/// signatures.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Tester for `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate the provider configuration. Fails on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider. Fails on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration. Fails on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Raw diagnostics of a resource configuration.
    pub async fn resource_diagnostics(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.provider
            .validate_resource_config(resource_type, config)
            .await
    }

    /// Plan a creation. `config` doubles as the proposed state.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan an update. `config` doubles as the proposed state.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    /// Plan a deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource. A `Null` state means it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import a resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// plan, create, then read. Returns the state after the read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        Ok(self.read(resource_type, created.state).await?.state)
    }

    /// plan, update, then read. Returns the state after the read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        Ok(self.read(resource_type, updated.state).await?.state)
    }

    /// plan a deletion, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }
}

/// Failure of a tester call that reports diagnostics.
#[derive(Debug, Error)]
pub enum TestError {
    /// Error diagnostics were returned.
    #[error("operation failed with diagnostics: {}", summaries(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn summaries(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.attribute {
            Some(attribute) => format!("{} (at {})", d.summary, attribute),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan changes nothing.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan updates in place.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if no change has that path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "Expected an error containing '{}', got: {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some warning diagnostic contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_warning_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| !d.is_error() && d.summary.contains(substring)),
        "Expected a warning containing '{}', got: {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::RESOURCE_TYPE;
    use crate::client::fake::FakeOme;
    use crate::provider::OmeProvider;
    use serde_json::json;

    fn provider_config() -> Value {
        json!({"host": "ome.lab", "username": "admin", "password": "pw"})
    }

    async fn configured(fake: &FakeOme) -> ProviderTester<OmeProvider> {
        let tester = ProviderTester::new(OmeProvider::with_connector(fake.clone()));
        tester.configure(provider_config()).await.unwrap();
        tester
    }

    #[tokio::test]
    async fn test_tester_exposes_types() {
        let tester = ProviderTester::new(OmeProvider::new());
        assert_eq!(tester.resource_types(), vec![RESOURCE_TYPE.to_string()]);
        assert_eq!(
            tester.data_source_types(),
            vec!["ome_configuration_report_info".to_string()]
        );
    }

    #[tokio::test]
    async fn test_validate_reports_diagnostics() {
        let tester = ProviderTester::new(OmeProvider::new());

        let err = tester
            .validate_resource_config(
                RESOURCE_TYPE,
                json!({
                    "baseline_name": "b1",
                    "ref_template_id": 7,
                    "device_ids": [10],
                    "device_servicetags": ["SVC1"]
                }),
            )
            .await
            .unwrap_err();

        let TestError::Diagnostics(diagnostics) = err else {
            panic!("expected diagnostics");
        };
        assert_error_contains(&diagnostics, "mutually exclusive");
    }

    #[tokio::test]
    async fn test_lifecycle_delete_removes_baseline() {
        let fake = FakeOme::new()
            .with_device(10, "SVC1", &[33])
            .with_compliance_template(7, "tpl1");
        let tester = configured(&fake).await;

        let state = tester
            .lifecycle_create(
                RESOURCE_TYPE,
                json!({
                    "baseline_name": "b1",
                    "ref_template_id": 7,
                    "device_ids": [10]
                }),
            )
            .await
            .unwrap();
        let id = state["id"].as_i64().unwrap();

        tester.lifecycle_delete(RESOURCE_TYPE, state).await.unwrap();

        assert!(fake.stored_baseline(id).is_none());
    }

    #[test]
    fn test_error_display_lists_attributes() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("cron"),
            Diagnostic::error("Second error"),
        ]);

        let display = err.to_string();
        assert!(display.contains("First error (at cron)"));
        assert!(display.contains("Second error"));
    }

    #[test]
    #[should_panic(expected = "Expected no changes")]
    fn test_assert_plan_no_changes_fails() {
        let plan = PlanResult::with_changes(
            json!({}),
            vec![crate::types::AttributeChange::added("cron", json!("0 0 * * *"))],
            false,
        );
        assert_plan_no_changes(&plan);
    }
}
