//! The `ome_configuration_baseline` resource.
//!
//! [`BaselineReconciler`] drives one host operation from start to finish:
//!
//! 1. check the declared intent ([`intent`], plus the identifier and
//!    template selection rules), before any server call
//! 2. open a session ([`crate::session`])
//! 3. on update, refuse to proceed while the baseline's job is running
//! 4. resolve the reference template ([`template`]) and targets ([`targets`])
//! 5. assemble and submit the request ([`payload`])
//! 6. follow the resulting job ([`job`])
//! 7. synthesize the state to persist ([`state`])
//!
//! Reads only refresh the state from the server.

pub mod intent;
pub mod job;
pub mod payload;
pub mod state;
pub mod targets;
pub mod template;

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use crate::client::{Connector, OmeApi};
use crate::error::OmeError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::session;

pub use intent::NotificationIntent;
pub use job::PollSettings;
pub use state::{BaselineState, Synthesis};
pub use targets::IdentifierMode;
pub use template::TemplateSelector;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "ome_configuration_baseline";

/// Result of an apply, read or import.
#[derive(Debug)]
pub struct Applied {
    /// State to persist.
    pub state: BaselineState,
    /// Non-fatal problems to surface to the host.
    pub warnings: Vec<OmeError>,
}

/// Checks that need nothing but the user's configuration.
///
/// Returns the identifier form and the template selector on success.
pub fn check_config(config: &BaselineState) -> Result<(IdentifierMode, TemplateSelector), OmeError> {
    intent::validate(NotificationIntent::from(config))?;
    let mode = targets::identifier_mode(&config.device_ids, &config.device_servicetags)?;
    let selector = TemplateSelector::from_config(
        config.ref_template_id,
        config.ref_template_name.as_deref(),
    )?;
    Ok((mode, selector))
}

/// Runs baseline operations against OME.
#[derive(Clone)]
pub struct BaselineReconciler {
    connector: Arc<dyn Connector>,
}

impl BaselineReconciler {
    /// Reconciler opening sessions through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Create the baseline described by `plan`.
    #[instrument(skip_all, fields(name = %plan.baseline_name))]
    pub async fn create(&self, plan: BaselineState) -> Result<Applied, OmeError> {
        let (mode, selector) = check_config(&plan)?;
        if mode == IdentifierMode::None {
            return Err(OmeError::NoTargetDevices);
        }

        session::scoped(self.connector.as_ref(), |api| async move {
            let submitted = submit(api.as_ref(), &plan, &selector, None).await?;
            let applied = finish(api.as_ref(), submitted, &plan, mode).await?;
            info!(id = ?applied.state.id, "baseline created");
            Ok(applied)
        })
        .await
    }

    /// Refresh `prior` from the server. `None` when the baseline is gone.
    #[instrument(skip_all, fields(id = ?prior.id))]
    pub async fn read(&self, prior: BaselineState) -> Result<Option<Applied>, OmeError> {
        let Some(id) = prior.id else {
            return Ok(None);
        };

        session::scoped(self.connector.as_ref(), |api| async move {
            let server = match api.baseline(id).await {
                Ok(server) => server,
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => return Err(err),
            };
            let mode = state::form_for_read(&prior);
            let synthesis = state::synthesize(api.as_ref(), &server, &prior, mode).await;
            Ok(Some(Applied {
                state: synthesis.state,
                warnings: synthesis.warnings,
            }))
        })
        .await
    }

    /// Update the baseline recorded in `prior` to match `plan`.
    #[instrument(skip_all, fields(id = ?prior.id))]
    pub async fn update(
        &self,
        prior: BaselineState,
        plan: BaselineState,
    ) -> Result<Applied, OmeError> {
        intent::validate(NotificationIntent::from(&plan))?;
        let mode = targets::identifier_mode(&plan.device_ids, &plan.device_servicetags)?;
        if mode == IdentifierMode::None {
            return Err(OmeError::NoTargetDevices);
        }
        let selector =
            TemplateSelector::from_state(plan.ref_template_id, plan.ref_template_name.as_deref())?;
        let id = prior
            .id
            .ok_or_else(|| OmeError::UnknownBaseline(prior.baseline_name.clone()))?;

        session::scoped(self.connector.as_ref(), |api| async move {
            job::ensure_not_running(api.as_ref(), prior.task_id.unwrap_or(0)).await?;
            let submitted = submit(api.as_ref(), &plan, &selector, Some(id)).await?;
            let applied = finish(api.as_ref(), submitted, &plan, mode).await?;
            info!(id, "baseline updated");
            Ok(applied)
        })
        .await
    }

    /// Remove the baseline. A state without an id is already gone.
    #[instrument(skip_all, fields(id = ?current.id))]
    pub async fn delete(&self, current: BaselineState) -> Result<(), OmeError> {
        let Some(id) = current.id else {
            return Ok(());
        };
        session::scoped(self.connector.as_ref(), |api| async move {
            api.delete_baselines(&[id]).await?;
            info!(id, "baseline deleted");
            Ok(())
        })
        .await
    }

    /// Adopt an existing baseline by name.
    #[instrument(skip(self))]
    pub async fn import(&self, name: &str) -> Result<Applied, OmeError> {
        session::scoped(self.connector.as_ref(), |api| async move {
            let server = api
                .baseline_by_name(name)
                .await?
                .ok_or_else(|| OmeError::UnknownBaseline(name.to_string()))?;
            let plan = BaselineState::for_import(name);
            let synthesis =
                state::synthesize(api.as_ref(), &server, &plan, IdentifierMode::ByTag).await;
            Ok(Applied {
                state: synthesis.state,
                warnings: synthesis.warnings,
            })
        })
        .await
    }
}

/// Resolve references and send the create or update request.
async fn submit(
    api: &dyn OmeApi,
    plan: &BaselineState,
    selector: &TemplateSelector,
    baseline_id: Option<i64>,
) -> Result<crate::client::models::Baseline, OmeError> {
    let template = template::resolve_template(api, selector).await?;
    let resolved = targets::resolve_targets(api, &plan.device_ids, &plan.device_servicetags).await?;
    let body = payload::assemble(plan, &template, &resolved.devices, baseline_id);

    match baseline_id {
        Some(id) => api.update_baseline(id, &body).await,
        None => api.create_baseline(&body).await,
    }
}

/// Follow the job and build the state to persist.
async fn finish(
    api: &dyn OmeApi,
    submitted: crate::client::models::Baseline,
    plan: &BaselineState,
    mode: IdentifierMode,
) -> Result<Applied, OmeError> {
    let outcome = job::run(api, submitted, PollSettings::from_state(plan)).await?;
    let synthesis = state::synthesize(api, &outcome.baseline, plan, mode).await;

    let mut warnings = outcome.warnings;
    warnings.extend(synthesis.warnings);
    Ok(Applied {
        state: synthesis.state,
        warnings,
    })
}

/// Schema of the `ome_configuration_baseline` resource.
pub fn schema() -> Schema {
    let set_of = |element| Attribute::new(AttributeType::set(element), AttributeFlags::optional());

    Schema::v0()
        .with_description("Configuration compliance baseline on an OME appliance")
        .with_attribute(
            "id",
            Attribute::computed_int64().with_description("Baseline id assigned by OME"),
        )
        .with_attribute(
            "baseline_name",
            Attribute::required_string().with_description("Unique name of the baseline"),
        )
        .with_attribute("description", Attribute::optional_string())
        .with_attribute(
            "ref_template_id",
            Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                .with_description("Compliance template id, exclusive with ref_template_name")
                .with_force_new(),
        )
        .with_attribute(
            "ref_template_name",
            Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                .with_description("Compliance template name, exclusive with ref_template_id")
                .with_force_new(),
        )
        .with_attribute(
            "device_ids",
            set_of(AttributeType::Int64)
                .with_description("Target device ids, exclusive with device_servicetags"),
        )
        .with_attribute(
            "device_servicetags",
            set_of(AttributeType::String)
                .with_description("Target service tags, exclusive with device_ids"),
        )
        .with_attribute(
            "schedule",
            Attribute::optional_bool()
                .with_description("Send compliance notifications")
                .with_default(json!(false)),
        )
        .with_attribute(
            "notify_on_schedule",
            Attribute::optional_bool()
                .with_description("Notify on every scheduled run, not only on drift")
                .with_default(json!(false)),
        )
        .with_attribute(
            "email_addresses",
            set_of(AttributeType::String).with_description("Notification recipients"),
        )
        .with_attribute(
            "cron",
            Attribute::optional_string().with_description("Notification schedule"),
        )
        .with_attribute(
            "output_format",
            Attribute::optional_string()
                .with_description("Report format: html, csv, pdf or xls")
                .with_default(json!(state::DEFAULT_OUTPUT_FORMAT)),
        )
        .with_attribute(
            "task_id",
            Attribute::computed_int64().with_description("Id of the baseline's compliance job"),
        )
        .with_attribute(
            "job_retry_count",
            Attribute::optional_int64()
                .with_description("Job status polls before giving up")
                .with_default(json!(state::DEFAULT_JOB_RETRY_COUNT)),
        )
        .with_attribute(
            "sleep_interval",
            Attribute::optional_int64()
                .with_description("Seconds between job status polls")
                .with_default(json!(state::DEFAULT_SLEEP_INTERVAL)),
        )
        .with_attribute(
            "partial_failure",
            Attribute::optional_bool()
                .with_description("Keep the result when the job does not finish in time")
                .with_default(json!(false)),
        )
}
