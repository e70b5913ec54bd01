//! The OME provider: host operations routed to the baseline reconciler and
//! the compliance report reader.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::baseline::{
    self, intent, targets, BaselineReconciler, BaselineState, IdentifierMode, NotificationIntent,
    TemplateSelector,
};
use crate::client::http::HttpConnector;
use crate::client::Connector;
use crate::config::ProviderConfig;
use crate::error::{OmeError, ProviderError};
use crate::report::{self, ReportQuery};
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::session;
use crate::types::{AttributeChange, ImportedResource, PlanResult, ResourceState};
use crate::validation;

/// Provider for OpenManage Enterprise configuration baselines.
pub struct OmeProvider {
    connector: RwLock<Option<Arc<dyn Connector>>>,
    injected: Option<Arc<dyn Connector>>,
}

impl Default for OmeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OmeProvider {
    /// A provider that connects to the appliance named in `Configure`.
    pub fn new() -> Self {
        Self {
            connector: RwLock::new(None),
            injected: None,
        }
    }

    /// A provider that opens its sessions through `connector` once
    /// configured, whatever the configured host.
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: RwLock::new(None),
            injected: Some(Arc::new(connector)),
        }
    }

    async fn connector(&self) -> Result<Arc<dyn Connector>, ProviderError> {
        self.connector.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider is not configured".to_string())
        })
    }

    async fn reconciler(&self) -> Result<BaselineReconciler, ProviderError> {
        Ok(BaselineReconciler::new(self.connector().await?))
    }
}

fn ensure_resource(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == baseline::RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

fn warnings_to_diagnostics(warnings: Vec<OmeError>) -> Vec<Diagnostic> {
    warnings
        .into_iter()
        .map(|w| Diagnostic::warning(w.to_string()))
        .collect()
}

fn applied_state(applied: baseline::Applied) -> Result<ResourceState, ProviderError> {
    Ok(ResourceState::new(applied.state.to_value()?)
        .with_diagnostics(warnings_to_diagnostics(applied.warnings)))
}

/// Checks on a baseline declaration beyond attribute types.
fn baseline_diagnostics(config: &BaselineState) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = intent::violations(NotificationIntent::from(config))
        .into_iter()
        .map(|(err, attribute)| Diagnostic::error(err.to_string()).with_attribute(attribute))
        .collect();

    match targets::identifier_mode(&config.device_ids, &config.device_servicetags) {
        Ok(IdentifierMode::None) => diagnostics.push(
            Diagnostic::error(OmeError::NoTargetDevices.to_string()).with_attribute("device_ids"),
        ),
        Ok(_) => {},
        Err(err) => {
            diagnostics.push(Diagnostic::error(err.to_string()).with_attribute("device_servicetags"))
        },
    }

    if let Err(err) =
        TemplateSelector::from_config(config.ref_template_id, config.ref_template_name.as_deref())
    {
        diagnostics.push(Diagnostic::error(err.to_string()).with_attribute("ref_template_id"));
    }

    if config.job_retry_count <= 0 {
        diagnostics.push(
            Diagnostic::error("job_retry_count must be positive").with_attribute("job_retry_count"),
        );
    }
    if config.sleep_interval <= 0 {
        diagnostics.push(
            Diagnostic::error("sleep_interval must be positive").with_attribute("sleep_interval"),
        );
    }

    diagnostics
}

/// `planned` with the order of `prior` when both hold the same members.
fn keep_order<T: Eq + std::hash::Hash + Clone>(prior: &[T], planned: &[T]) -> Vec<T> {
    let a: HashSet<&T> = prior.iter().collect();
    let b: HashSet<&T> = planned.iter().collect();
    if a == b {
        prior.to_vec()
    } else {
        planned.to_vec()
    }
}

fn values_equal(schema: &Schema, name: &str, before: &Value, after: &Value) -> bool {
    let is_set = schema
        .attribute(name)
        .is_some_and(|attr| attr.attr_type.is_set());
    match (is_set, before.as_array(), after.as_array()) {
        (true, Some(b), Some(a)) => {
            let b: HashSet<String> = b.iter().map(Value::to_string).collect();
            let a: HashSet<String> = a.iter().map(Value::to_string).collect();
            a == b
        },
        _ => before == after,
    }
}

/// Derive the planned baseline state and its attribute changes.
fn plan_baseline(
    prior: Option<BaselineState>,
    proposed: BaselineState,
) -> Result<PlanResult, ProviderError> {
    let schema = baseline::schema();
    let user_set = |name: &str| {
        schema
            .attribute(name)
            .is_some_and(|attr| attr.flags.optional || attr.flags.required)
    };

    let Some(prior) = prior else {
        let planned = BaselineState {
            id: None,
            task_id: None,
            ..proposed
        };
        let planned_value = planned.to_value()?;
        let mut changes: Vec<AttributeChange> = planned_value
            .as_object()
            .into_iter()
            .flatten()
            .filter(|(name, value)| !value.is_null() && user_set(name.as_str()))
            .map(|(name, value)| AttributeChange::added(name.clone(), value.clone()))
            .collect();
        changes.push(AttributeChange::new("id", None, None));
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        return Ok(PlanResult::with_changes(planned_value, changes, false));
    };

    let mut planned = BaselineState {
        id: prior.id,
        task_id: prior.task_id,
        ..proposed
    };
    if planned.ref_template_id.is_none() && planned.ref_template_name == prior.ref_template_name {
        planned.ref_template_id = prior.ref_template_id;
    }
    if planned.ref_template_name.is_none() && planned.ref_template_id == prior.ref_template_id {
        planned.ref_template_name = prior.ref_template_name.clone();
    }
    planned.device_ids = keep_order(&prior.device_ids, &planned.device_ids);
    planned.device_servicetags = keep_order(&prior.device_servicetags, &planned.device_servicetags);
    planned.email_addresses = keep_order(&prior.email_addresses, &planned.email_addresses);

    let before = prior.to_value()?;
    let after = planned.to_value()?;
    let mut changes = Vec::new();
    let mut requires_replace = false;
    if let (Some(before), Some(after)) = (before.as_object(), after.as_object()) {
        for (name, new_value) in after {
            if !user_set(name.as_str()) {
                continue;
            }
            let old_value = before.get(name).unwrap_or(&Value::Null);
            if values_equal(&schema, name, old_value, new_value) {
                continue;
            }
            if schema.attribute(name).is_some_and(|attr| attr.force_new) {
                requires_replace = true;
            }
            changes.push(AttributeChange::modified(
                name.clone(),
                old_value.clone(),
                new_value.clone(),
            ));
        }
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));

    if changes.is_empty() {
        return Ok(PlanResult::no_change(after));
    }
    Ok(PlanResult::with_changes(after, changes, requires_replace))
}

#[async_trait::async_trait]
impl ProviderService for OmeProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(baseline::RESOURCE_TYPE, baseline::schema())
            .with_data_source(report::DATA_SOURCE_TYPE, report::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }
        diagnostics.extend(ProviderConfig::from_value(config)?.validate());
        Ok(diagnostics)
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        let diagnostics = config.validate();
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let connector: Arc<dyn Connector> = match &self.injected {
            Some(connector) => Arc::clone(connector),
            None => Arc::new(HttpConnector::new(config.clone())),
        };
        *self.connector.write().await = Some(connector);
        info!(host = %config.host, port = config.port, "provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.connector.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        ensure_resource(resource_type)?;
        let mut diagnostics = validation::validate(&baseline::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }
        let declared = BaselineState::from_value(config)?;
        diagnostics.extend(baseline_diagnostics(&declared));
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        ensure_resource(resource_type)?;
        let prior = prior_state
            .filter(|v| !v.is_null())
            .map(BaselineState::from_value)
            .transpose()?;

        if proposed_state.is_null() {
            let changes = prior
                .iter()
                .map(|p| AttributeChange::new("id", p.id.map(Value::from), None))
                .collect();
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let declared = if config.is_null() {
            BaselineState::from_value(proposed_state.clone())?
        } else {
            BaselineState::from_value(config)?
        };
        intent::validate(NotificationIntent::from(&declared))?;
        if targets::identifier_mode(&declared.device_ids, &declared.device_servicetags)?
            == IdentifierMode::None
        {
            return Err(OmeError::NoTargetDevices.into());
        }
        match &prior {
            None => TemplateSelector::from_config(
                declared.ref_template_id,
                declared.ref_template_name.as_deref(),
            )?,
            Some(_) => TemplateSelector::from_state(
                declared.ref_template_id,
                declared.ref_template_name.as_deref(),
            )?,
        };

        plan_baseline(prior, BaselineState::from_value(proposed_state)?)
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        ensure_resource(resource_type)?;
        let planned = BaselineState::from_value(planned_state)?;
        let applied = self.reconciler().await?.create(planned).await?;
        applied_state(applied)
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        ensure_resource(resource_type)?;
        if current_state.is_null() {
            return Ok(ResourceState::removed());
        }
        let current = BaselineState::from_value(current_state)?;
        match self.reconciler().await?.read(current).await? {
            Some(applied) => applied_state(applied),
            None => {
                info!("baseline no longer exists");
                Ok(ResourceState::removed())
            },
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceState, ProviderError> {
        ensure_resource(resource_type)?;
        let prior = BaselineState::from_value(prior_state)?;
        let planned = BaselineState::from_value(planned_state)?;
        let applied = self.reconciler().await?.update(prior, planned).await?;
        applied_state(applied)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        ensure_resource(resource_type)?;
        let current = BaselineState::from_value(current_state)?;
        Ok(self.reconciler().await?.delete(current).await?)
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        ensure_resource(resource_type)?;
        let applied = self.reconciler().await?.import(id).await?;
        for warning in &applied.warnings {
            warn!(baseline = id, %warning, "import warning");
        }
        Ok(vec![ImportedResource::new(
            baseline::RESOURCE_TYPE,
            applied.state.to_value()?,
        )])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if data_source_type != report::DATA_SOURCE_TYPE {
            return Err(ProviderError::UnknownResource(data_source_type.to_string()));
        }
        Ok(validation::validate(&report::schema(), &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        if data_source_type != report::DATA_SOURCE_TYPE {
            return Err(ProviderError::UnknownResource(data_source_type.to_string()));
        }
        let query = ReportQuery::from_value(config)?;
        if query.baseline_name.is_empty() {
            return Err(ProviderError::Validation("baseline_name is required".to_string()));
        }

        let connector = self.connector().await?;
        let report = session::scoped(connector.as_ref(), |api| async move {
            report::read_report(api.as_ref(), &query.baseline_name, query.fetch_attributes).await
        })
        .await?;
        Ok(serde_json::to_value(report)?)
    }
}
