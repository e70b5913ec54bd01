//! The persisted baseline document and its synthesis from server records.
//!
//! The server reports targets as ids in whatever order it likes. Users may
//! have declared service tags instead, in their own order. Synthesis maps
//! the server's view back into the user's identifier form and order so a
//! second plan with unchanged configuration sees no drift.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::targets::IdentifierMode;
use crate::client::models::{Baseline, NOTIFY_ON_SCHEDULE};
use crate::client::OmeApi;
use crate::error::OmeError;
use crate::types::strip_nulls;

/// Default report format.
pub const DEFAULT_OUTPUT_FORMAT: &str = "html";
/// Default number of job status polls.
pub const DEFAULT_JOB_RETRY_COUNT: i64 = 30;
/// Default seconds between job status polls.
pub const DEFAULT_SLEEP_INTERVAL: i64 = 20;

/// State of one `ome_configuration_baseline` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineState {
    /// Server-assigned id, unknown until created.
    pub id: Option<i64>,
    /// Unique baseline name.
    pub baseline_name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Reference template by id.
    pub ref_template_id: Option<i64>,
    /// Reference template by name.
    pub ref_template_name: Option<String>,
    /// Targets by device id.
    pub device_ids: Vec<i64>,
    /// Targets by service tag.
    pub device_servicetags: Vec<String>,
    /// Scheduled compliance notification enabled.
    pub schedule: bool,
    /// Notify on every scheduled run instead of only on drift.
    pub notify_on_schedule: bool,
    /// Notification recipients.
    pub email_addresses: Vec<String>,
    /// Cron expression of the schedule.
    pub cron: Option<String>,
    /// Report format, lower case.
    pub output_format: String,
    /// Id of the server job evaluating the baseline.
    pub task_id: Option<i64>,
    /// Job status polls before giving up.
    pub job_retry_count: i64,
    /// Seconds between job status polls.
    pub sleep_interval: i64,
    /// Keep the result of a job that did not finish in time.
    pub partial_failure: bool,
}

impl Default for BaselineState {
    fn default() -> Self {
        Self {
            id: None,
            baseline_name: String::new(),
            description: None,
            ref_template_id: None,
            ref_template_name: None,
            device_ids: Vec::new(),
            device_servicetags: Vec::new(),
            schedule: false,
            notify_on_schedule: false,
            email_addresses: Vec::new(),
            cron: None,
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            task_id: None,
            job_retry_count: DEFAULT_JOB_RETRY_COUNT,
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            partial_failure: false,
        }
    }
}

impl BaselineState {
    /// Decode a host document. `null` members take their defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(strip_nulls(value))
    }

    /// Encode for the host.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// The starting point of an import: only the name is known.
    pub fn for_import(name: &str) -> Self {
        Self {
            baseline_name: name.to_string(),
            ..Self::default()
        }
    }
}

/// A synthesized state plus the non-fatal problems met on the way.
#[derive(Debug)]
pub struct Synthesis {
    /// The state to persist.
    pub state: BaselineState,
    /// Warnings for the host.
    pub warnings: Vec<OmeError>,
}

/// Identifier form to use when refreshing an existing state.
pub fn form_for_read(prior: &BaselineState) -> IdentifierMode {
    if prior.device_ids.is_empty() {
        IdentifierMode::ByTag
    } else {
        IdentifierMode::ById
    }
}

/// Order-preserving merge: items of `input` the server still reports, in
/// input order, followed by server-only items in server order.
pub fn merge_ordered<T: Eq + Hash + Clone>(input: &[T], server: &[T]) -> Vec<T> {
    let on_server: HashSet<&T> = server.iter().collect();
    let mut seen: HashSet<&T> = HashSet::new();

    let kept = input
        .iter()
        .filter(|item| on_server.contains(item) && seen.insert(*item));
    let mut merged: Vec<T> = kept.cloned().collect();

    let from_input: HashSet<&T> = input.iter().collect();
    for item in server {
        if !from_input.contains(item) && seen.insert(item) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Build the persisted state from the server's record of a baseline.
///
/// `plan` supplies ordering, polling settings and fallbacks for fields the
/// server does not carry.
pub async fn synthesize(
    api: &dyn OmeApi,
    server: &Baseline,
    plan: &BaselineState,
    mode: IdentifierMode,
) -> Synthesis {
    let mut warnings = Vec::new();
    let server_ids = server.target_ids();

    let mut tags_by_id: HashMap<i64, String> = HashMap::new();
    let mut unresolved = Vec::new();
    for id in &server_ids {
        match api.device(*id).await {
            Ok(device) => {
                tags_by_id.insert(*id, device.device_service_tag);
            },
            Err(err) => {
                debug!(device_id = id, error = %err, "target lookup failed");
                unresolved.push(*id);
            },
        }
    }
    if !unresolved.is_empty() {
        warn!(devices = ?unresolved, "some baseline targets could not be read back");
        warnings.push(OmeError::TargetResolveFailed(unresolved.clone()));
    }

    let (device_ids, device_servicetags) = match mode {
        IdentifierMode::ById => (merge_ordered(&plan.device_ids, &server_ids), Vec::new()),
        IdentifierMode::ByTag | IdentifierMode::None => {
            let server_tags: Vec<String> = server_ids
                .iter()
                .filter_map(|id| tags_by_id.get(id).cloned())
                .collect();
            let tags = if unresolved.is_empty() {
                merge_ordered(&plan.device_servicetags, &server_tags)
            } else {
                // Unresolved ids can't be matched to tags, so the declared tags stay.
                let mut tags = plan.device_servicetags.clone();
                for tag in server_tags {
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
                tags
            };
            (Vec::new(), tags)
        },
    };

    let description = match server.description.as_deref() {
        Some(d) if !d.is_empty() => Some(d.to_string()),
        _ => plan.description.clone().filter(|d| d.is_empty()),
    };

    let mut state = BaselineState {
        id: Some(server.id),
        baseline_name: server.name.clone(),
        description,
        ref_template_id: Some(server.template_id),
        ref_template_name: server
            .template_name
            .clone()
            .or_else(|| plan.ref_template_name.clone()),
        device_ids,
        device_servicetags,
        task_id: Some(server.task_id),
        ..plan.clone()
    };

    match &server.notification_settings {
        Some(settings) => {
            state.schedule = true;
            state.notify_on_schedule = settings.notification_type == NOTIFY_ON_SCHEDULE;
            state.email_addresses = merge_ordered(&plan.email_addresses, &settings.email_addresses);
            state.cron = settings
                .schedule
                .as_ref()
                .map(|s| s.cron.clone())
                .filter(|c| !c.is_empty())
                .or_else(|| plan.cron.clone());
            state.output_format = if settings.output_format.is_empty()
                || settings.output_format.eq_ignore_ascii_case(&plan.output_format)
            {
                plan.output_format.clone()
            } else {
                settings.output_format.to_lowercase()
            };
        },
        None => {
            state.schedule = plan.schedule;
            state.notify_on_schedule = plan.notify_on_schedule;
            state.email_addresses = plan.email_addresses.clone();
            state.cron = plan.cron.clone();
            state.output_format = plan.output_format.clone();
        },
    }

    Synthesis { state, warnings }
}
