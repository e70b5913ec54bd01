//! In-memory OME used by the unit and integration tests.
//!
//! [`FakeOme`] holds an inventory, answers the [`OmeApi`] calls from it and
//! records every call. Clones share state, so a test keeps one handle for
//! scripting and assertions while the provider opens sessions on another.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::models::{
    Baseline, BaselinePayload, Device, DeviceComplianceReport, ExecutionHistory,
    ExecutionHistoryDetail, Job, JobStatus, Template, COMPLIANCE_VIEW_TYPE_ID,
    JOB_STATUS_RUNNING, JOB_STATUS_SUCCESS,
};
use super::{Connector, OmeApi};
use crate::error::OmeError;

/// When the fake assigns a task id to a created or updated baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAssignment {
    /// The submit response already carries it.
    Immediate,
    /// It appears on the n-th read of the baseline after submission.
    AfterReads(usize),
    /// Never.
    Never,
}

#[derive(Debug)]
struct FakeState {
    devices: Vec<Device>,
    templates: Vec<Template>,
    baselines: BTreeMap<i64, Baseline>,
    next_baseline_id: i64,
    next_task_id: i64,
    task_assignment: TaskAssignment,
    pending_tasks: HashMap<i64, usize>,
    job_scripts: HashMap<i64, VecDeque<i64>>,
    default_job_status: i64,
    executions: HashMap<i64, Vec<(i64, Vec<String>)>>,
    history_unavailable: bool,
    compliance: HashMap<i64, Vec<DeviceComplianceReport>>,
    compliance_details: HashMap<(i64, i64), serde_json::Value>,
    reject_login: bool,
    failing_devices: HashSet<i64>,
    reverse_targets: bool,
    calls: Vec<String>,
    mutations: usize,
    last_payload: Option<BaselinePayload>,
    sessions_opened: usize,
    sessions_closed: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            templates: Vec::new(),
            baselines: BTreeMap::new(),
            next_baseline_id: 1,
            next_task_id: 1000,
            task_assignment: TaskAssignment::Immediate,
            pending_tasks: HashMap::new(),
            job_scripts: HashMap::new(),
            default_job_status: JOB_STATUS_SUCCESS,
            executions: HashMap::new(),
            history_unavailable: false,
            compliance: HashMap::new(),
            compliance_details: HashMap::new(),
            reject_login: false,
            failing_devices: HashSet::new(),
            reverse_targets: false,
            calls: Vec::new(),
            mutations: 0,
            last_payload: None,
            sessions_opened: 0,
            sessions_closed: 0,
        }
    }
}

impl FakeState {
    fn assign_task(&mut self, baseline_id: i64) {
        match self.task_assignment {
            TaskAssignment::Immediate => self.set_task(baseline_id),
            TaskAssignment::AfterReads(reads) => {
                self.pending_tasks.insert(baseline_id, reads);
            },
            TaskAssignment::Never => {},
        }
    }

    fn set_task(&mut self, baseline_id: i64) {
        let task_id = self.next_task_id;
        self.next_task_id += 1;
        if let Some(baseline) = self.baselines.get_mut(&baseline_id) {
            baseline.task_id = task_id;
        }
    }

    fn template_name(&self, template_id: i64) -> Option<String> {
        self.templates
            .iter()
            .find(|t| t.id == template_id)
            .map(|t| t.name.clone())
    }

    fn apply_payload(&self, baseline: &mut Baseline, payload: &BaselinePayload) {
        baseline.name = payload.name.clone();
        baseline.description = Some(payload.description.clone());
        baseline.template_id = payload.template_id;
        baseline.template_name = self.template_name(payload.template_id);
        baseline.baseline_targets = payload.baseline_targets.clone();
        if self.reverse_targets {
            baseline.baseline_targets.reverse();
        }
        baseline.notification_settings = payload.notification_settings.clone();
    }
}

fn not_found(what: impl Into<String>) -> OmeError {
    OmeError::RequestFailed {
        status: 404,
        body: what.into(),
    }
}

fn status_name(id: i64) -> &'static str {
    match id {
        JOB_STATUS_SUCCESS => "Completed",
        JOB_STATUS_RUNNING => "Running",
        _ => "Scheduled",
    }
}

/// Scriptable in-memory OME appliance.
#[derive(Debug, Clone, Default)]
pub struct FakeOme {
    state: Arc<Mutex<FakeState>>,
    closed: Arc<AtomicBool>,
}

impl FakeOme {
    /// An empty appliance.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) -> MutexGuard<'_, FakeState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    /// Add a device.
    pub fn with_device(self, id: i64, service_tag: &str, capabilities: &[i64]) -> Self {
        self.lock().devices.push(Device {
            id,
            device_service_tag: service_tag.to_string(),
            device_name: format!("host-{}", service_tag.to_lowercase()),
            device_capabilities: capabilities.to_vec(),
        });
        self
    }

    /// Add a template.
    pub fn with_template(self, id: i64, name: &str, view_type_id: i64) -> Self {
        self.lock().templates.push(Template {
            id,
            name: name.to_string(),
            view_type_id,
        });
        self
    }

    /// Add a compliance template.
    pub fn with_compliance_template(self, id: i64, name: &str) -> Self {
        self.with_template(id, name, COMPLIANCE_VIEW_TYPE_ID)
    }

    /// Store a baseline as if it had been created earlier.
    pub fn with_baseline(self, baseline: Baseline) -> Self {
        {
            let mut state = self.lock();
            state.next_baseline_id = state.next_baseline_id.max(baseline.id + 1);
            state.baselines.insert(baseline.id, baseline);
        }
        self
    }

    /// Choose when task ids appear on submitted baselines.
    pub fn set_task_assignment(&self, assignment: TaskAssignment) {
        self.lock().task_assignment = assignment;
    }

    /// Id handed to the next assigned task.
    pub fn set_next_task_id(&self, task_id: i64) {
        self.lock().next_task_id = task_id;
    }

    /// Statuses a job reports on successive reads; the last one repeats.
    pub fn script_job(&self, job_id: i64, statuses: impl IntoIterator<Item = i64>) {
        self.lock()
            .job_scripts
            .insert(job_id, statuses.into_iter().collect());
    }

    /// Status of jobs without a script.
    pub fn set_default_job_status(&self, status: i64) {
        self.lock().default_job_status = status;
    }

    /// Detail values of a job's only execution.
    pub fn set_history_details(&self, job_id: i64, values: &[&str]) {
        self.lock().executions.remove(&job_id);
        self.add_execution(job_id, 1, values);
    }

    /// Record one more execution of a job. Histories are listed in the
    /// order they were added, whatever their ids.
    pub fn add_execution(&self, job_id: i64, history_id: i64, values: &[&str]) {
        self.lock()
            .executions
            .entry(job_id)
            .or_default()
            .push((history_id, values.iter().map(|v| v.to_string()).collect()));
    }

    /// Make execution history reads fail.
    pub fn set_history_unavailable(&self, unavailable: bool) {
        self.lock().history_unavailable = unavailable;
    }

    /// Compliance report rows of a baseline.
    pub fn set_compliance(&self, baseline_id: i64, reports: Vec<DeviceComplianceReport>) {
        self.lock().compliance.insert(baseline_id, reports);
    }

    /// Attribute-level compliance detail of one device.
    pub fn set_compliance_details(
        &self,
        baseline_id: i64,
        device_id: i64,
        details: serde_json::Value,
    ) {
        self.lock()
            .compliance_details
            .insert((baseline_id, device_id), details);
    }

    /// Reject session creation.
    pub fn set_reject_login(&self, reject: bool) {
        self.lock().reject_login = reject;
    }

    /// Make reads of one device fail with a server error.
    pub fn fail_device(&self, id: i64) {
        self.lock().failing_devices.insert(id);
    }

    /// Store targets in reverse submission order.
    pub fn set_reverse_targets(&self, reverse: bool) {
        self.lock().reverse_targets = reverse;
    }

    /// Change a stored baseline out of band.
    pub fn edit_baseline(&self, id: i64, edit: impl FnOnce(&mut Baseline)) {
        if let Some(baseline) = self.lock().baselines.get_mut(&id) {
            edit(baseline);
        }
    }

    /// Remove a stored baseline out of band.
    pub fn remove_baseline(&self, id: i64) {
        self.lock().baselines.remove(&id);
    }

    /// A stored baseline.
    pub fn stored_baseline(&self, id: i64) -> Option<Baseline> {
        self.lock().baselines.get(&id).cloned()
    }

    /// Every call made so far, as `method(args)` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls whose name starts with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Number of create, update and delete calls that reached the server.
    pub fn mutations(&self) -> usize {
        self.lock().mutations
    }

    /// The most recent create or update body.
    pub fn last_payload(&self) -> Option<BaselinePayload> {
        self.lock().last_payload.clone()
    }

    /// Sessions opened and closed so far.
    pub fn sessions(&self) -> (usize, usize) {
        let state = self.lock();
        (state.sessions_opened, state.sessions_closed)
    }
}

#[async_trait]
impl Connector for FakeOme {
    async fn open(&self) -> Result<Arc<dyn OmeApi>, OmeError> {
        let mut state = self.record("open".into());
        if state.reject_login {
            return Err(OmeError::AuthFailed("status 401 Unauthorized".into()));
        }
        state.sessions_opened += 1;
        drop(state);

        Ok(Arc::new(FakeOme {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[async_trait]
impl OmeApi for FakeOme {
    async fn device(&self, id: i64) -> Result<Device, OmeError> {
        let state = self.record(format!("device({id})"));
        if state.failing_devices.contains(&id) {
            return Err(OmeError::RequestFailed {
                status: 500,
                body: "internal error".into(),
            });
        }
        state
            .devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| not_found(format!("device {id}")))
    }

    async fn devices_by_service_tag(&self, tag: &str) -> Result<Vec<Device>, OmeError> {
        let state = self.record(format!("devices_by_service_tag({tag})"));
        Ok(state
            .devices
            .iter()
            .filter(|d| d.device_service_tag == tag)
            .cloned()
            .collect())
    }

    async fn template_by_id(&self, id: i64) -> Result<Option<Template>, OmeError> {
        let state = self.record(format!("template_by_id({id})"));
        Ok(state.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn template_by_name(&self, name: &str) -> Result<Option<Template>, OmeError> {
        let state = self.record(format!("template_by_name({name})"));
        Ok(state.templates.iter().find(|t| t.name == name).cloned())
    }

    async fn create_baseline(&self, payload: &BaselinePayload) -> Result<Baseline, OmeError> {
        let mut state = self.record(format!("create_baseline({})", payload.name));
        if state.baselines.values().any(|b| b.name == payload.name) {
            return Err(OmeError::RequestFailed {
                status: 400,
                body: format!("baseline {} already exists", payload.name),
            });
        }
        state.mutations += 1;
        state.last_payload = Some(payload.clone());

        let id = state.next_baseline_id;
        state.next_baseline_id += 1;
        let mut baseline = Baseline {
            id,
            ..Baseline::default()
        };
        state.apply_payload(&mut baseline, payload);
        state.baselines.insert(id, baseline);
        state.assign_task(id);

        state
            .baselines
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("baseline {id}")))
    }

    async fn update_baseline(
        &self,
        id: i64,
        payload: &BaselinePayload,
    ) -> Result<Baseline, OmeError> {
        let mut state = self.record(format!("update_baseline({id})"));
        let Some(mut baseline) = state.baselines.get(&id).cloned() else {
            return Err(not_found(format!("baseline {id}")));
        };
        state.mutations += 1;
        state.last_payload = Some(payload.clone());

        state.apply_payload(&mut baseline, payload);
        let needs_task = baseline.task_id == 0;
        state.baselines.insert(id, baseline);
        if needs_task {
            state.assign_task(id);
        }

        state
            .baselines
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("baseline {id}")))
    }

    async fn delete_baselines(&self, ids: &[i64]) -> Result<(), OmeError> {
        let mut state = self.record(format!("delete_baselines({ids:?})"));
        state.mutations += 1;
        for id in ids {
            state.baselines.remove(id);
        }
        Ok(())
    }

    async fn baseline(&self, id: i64) -> Result<Baseline, OmeError> {
        let mut state = self.record(format!("baseline({id})"));
        if let Some(remaining) = state.pending_tasks.get_mut(&id) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                state.pending_tasks.remove(&id);
                state.set_task(id);
            }
        }
        state
            .baselines
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("baseline {id}")))
    }

    async fn baseline_by_name(&self, name: &str) -> Result<Option<Baseline>, OmeError> {
        let state = self.record(format!("baseline_by_name({name})"));
        Ok(state.baselines.values().find(|b| b.name == name).cloned())
    }

    async fn job(&self, id: i64) -> Result<Job, OmeError> {
        let mut state = self.record(format!("job({id})"));
        let default_status = state.default_job_status;
        let status = match state.job_scripts.get_mut(&id) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(default_status),
            Some(script) => script.front().copied().unwrap_or(default_status),
            None => default_status,
        };
        Ok(Job {
            id,
            last_run_status: JobStatus {
                id: status,
                name: status_name(status).to_string(),
            },
        })
    }

    async fn execution_histories(&self, job_id: i64) -> Result<Vec<ExecutionHistory>, OmeError> {
        let state = self.record(format!("execution_histories({job_id})"));
        if state.history_unavailable {
            return Err(OmeError::RequestFailed {
                status: 500,
                body: "history store offline".into(),
            });
        }
        Ok(state
            .executions
            .get(&job_id)
            .into_iter()
            .flatten()
            .map(|(id, _)| ExecutionHistory { id: *id })
            .collect())
    }

    async fn execution_history_details(
        &self,
        job_id: i64,
        history_id: i64,
    ) -> Result<Vec<ExecutionHistoryDetail>, OmeError> {
        let state = self.record(format!("execution_history_details({job_id},{history_id})"));
        Ok(state
            .executions
            .get(&job_id)
            .into_iter()
            .flatten()
            .find(|(id, _)| *id == history_id)
            .map(|(_, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(|(i, value)| ExecutionHistoryDetail {
                        id: i as i64 + 1,
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn compliance_reports(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<DeviceComplianceReport>, OmeError> {
        let state = self.record(format!("compliance_reports({baseline_id})"));
        if !state.baselines.contains_key(&baseline_id) {
            return Err(not_found(format!("baseline {baseline_id}")));
        }
        Ok(state
            .compliance
            .get(&baseline_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn device_compliance_details(
        &self,
        baseline_id: i64,
        device_id: i64,
    ) -> Result<serde_json::Value, OmeError> {
        let state = self.record(format!(
            "device_compliance_details({baseline_id},{device_id})"
        ));
        state
            .compliance_details
            .get(&(baseline_id, device_id))
            .cloned()
            .ok_or_else(|| not_found(format!("device {device_id}")))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.record("close".into());
        state.sessions_closed += 1;
    }
}
