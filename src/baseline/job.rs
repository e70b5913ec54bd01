//! Server-side job tracking.
//!
//! Submitting a baseline starts a compliance job on the server. The
//! runner finds the job id, polls the job until it succeeds or the
//! polling budget runs out, and collects the job's execution log.
//!
//! ```text
//!  submitted ──task id 0──► discovery (≤ NO_OF_TRIES reads, 3s apart)
//!      │                        │
//!      └──task id set──► polling ◄┘   (≤ job_retry_count polls, sleep_interval apart)
//!                           │
//!            success ◄──────┼──────► exhausted: Timeout, or a warning in partial-failure mode
//! ```

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::state::BaselineState;
use crate::client::models::Baseline;
use crate::client::OmeApi;
use crate::error::OmeError;

/// Baseline reads while waiting for a task id.
pub const NO_OF_TRIES: usize = 5;

/// Pause before each of those reads.
pub const TASK_DISCOVERY_INTERVAL: Duration = Duration::from_secs(3);

/// Job polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Maximum number of job reads.
    pub retry_count: u32,
    /// Pause between job reads.
    pub sleep_interval: Duration,
    /// Accept a job that did not finish in time.
    pub partial_failure: bool,
}

impl PollSettings {
    /// Settings declared on a baseline.
    pub fn from_state(state: &BaselineState) -> Self {
        Self {
            retry_count: u32::try_from(state.job_retry_count.max(1)).unwrap_or(u32::MAX),
            sleep_interval: Duration::from_secs(state.sleep_interval.max(0).unsigned_abs()),
            partial_failure: state.partial_failure,
        }
    }

    /// Upper bound of the polling phase.
    pub fn budget(&self) -> Duration {
        self.sleep_interval * self.retry_count
    }
}

/// What a finished job run produced.
#[derive(Debug)]
pub struct JobOutcome {
    /// Last baseline record seen.
    pub baseline: Baseline,
    /// Concatenated execution details, when the job succeeded.
    pub history: Option<String>,
    /// Non-fatal problems.
    pub warnings: Vec<OmeError>,
}

/// Reject work on a baseline whose job is running.
pub async fn ensure_not_running(api: &dyn OmeApi, task_id: i64) -> Result<(), OmeError> {
    if task_id == 0 {
        return Ok(());
    }
    let job = api.job(task_id).await?;
    if job.is_running() {
        return Err(OmeError::BaselineJobRunning(task_id));
    }
    Ok(())
}

/// Re-read the baseline until the server has assigned a task id.
///
/// Returns the last record read; its task id is still 0 when none was
/// assigned in time.
pub async fn discover_task_id(api: &dyn OmeApi, submitted: Baseline) -> Result<Baseline, OmeError> {
    let mut baseline = submitted;
    for attempt in 1..=NO_OF_TRIES {
        if baseline.task_id != 0 {
            break;
        }
        sleep(TASK_DISCOVERY_INTERVAL).await;
        baseline = api.baseline(baseline.id).await?;
        debug!(attempt, task_id = baseline.task_id, "task id discovery");
    }
    Ok(baseline)
}

/// Poll a job. `Ok(true)` on success, `Ok(false)` when the budget ran out
/// in partial-failure mode.
pub async fn wait_for_job(
    api: &dyn OmeApi,
    task_id: i64,
    settings: PollSettings,
) -> Result<bool, OmeError> {
    for attempt in 1..=settings.retry_count {
        let job = api.job(task_id).await?;
        debug!(task_id, attempt, status = %job.last_run_status.name, "job poll");
        if job.succeeded() {
            return Ok(true);
        }
        if attempt < settings.retry_count {
            sleep(settings.sleep_interval).await;
        }
    }

    if settings.partial_failure {
        Ok(false)
    } else {
        Err(OmeError::Timeout {
            task_id,
            seconds: settings.budget().as_secs(),
        })
    }
}

/// Concatenate the detail values of the job's newest execution.
pub async fn execution_history(api: &dyn OmeApi, task_id: i64) -> Result<String, OmeError> {
    let histories = api.execution_histories(task_id).await?;
    let Some(latest) = histories.iter().max_by_key(|h| h.id) else {
        return Ok(String::new());
    };
    let details = api.execution_history_details(task_id, latest.id).await?;
    Ok(details
        .into_iter()
        .map(|d| d.value)
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Follow the job started by a submission to its end.
#[instrument(skip_all, fields(baseline_id = submitted.id))]
pub async fn run(
    api: &dyn OmeApi,
    submitted: Baseline,
    settings: PollSettings,
) -> Result<JobOutcome, OmeError> {
    let mut warnings = Vec::new();
    let baseline = discover_task_id(api, submitted).await?;

    if baseline.task_id == 0 {
        warn!("no task id assigned, job status not tracked");
        warnings.push(OmeError::TaskIdNeverAssigned(baseline.id));
        return Ok(JobOutcome {
            baseline,
            history: None,
            warnings,
        });
    }

    let task_id = baseline.task_id;
    if !wait_for_job(api, task_id, settings).await? {
        let timeout = OmeError::Timeout {
            task_id,
            seconds: settings.budget().as_secs(),
        };
        warn!(error = %timeout, "keeping result of unfinished job");
        warnings.push(timeout);
        return Ok(JobOutcome {
            baseline,
            history: None,
            warnings,
        });
    }

    let history = match execution_history(api, task_id).await {
        Ok(history) => {
            info!(task_id, history = %history, "baseline job completed");
            Some(history)
        },
        Err(err) => {
            warnings.push(OmeError::ExecutionHistoryUnavailable(err.to_string()));
            None
        },
    };

    Ok(JobOutcome {
        baseline,
        history,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{FakeOme, TaskAssignment};
    use crate::client::models::{BaselinePayload, JOB_STATUS_RUNNING, JOB_STATUS_SUCCESS};
    use tokio::time::Instant;

    fn settings(retry_count: u32, secs: u64, partial_failure: bool) -> PollSettings {
        PollSettings {
            retry_count,
            sleep_interval: Duration::from_secs(secs),
            partial_failure,
        }
    }

    async fn submitted(fake: &FakeOme) -> Baseline {
        let payload = BaselinePayload {
            id: None,
            name: "b1".into(),
            description: String::new(),
            template_id: 7,
            baseline_targets: vec![],
            notification_settings: None,
        };
        fake.create_baseline(&payload).await.unwrap()
    }

    #[test]
    fn test_poll_settings_from_state() {
        let state = BaselineState {
            job_retry_count: 3,
            sleep_interval: 5,
            ..BaselineState::default()
        };
        let settings = PollSettings::from_state(&state);
        assert_eq!(settings.retry_count, 3);
        assert_eq!(settings.budget(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_id_found_on_second_read() {
        let fake = FakeOme::new();
        fake.set_task_assignment(TaskAssignment::AfterReads(2));
        fake.set_next_task_id(41);
        let baseline = submitted(&fake).await;

        let start = Instant::now();
        let found = discover_task_id(&fake, baseline).await.unwrap();

        assert_eq!(found.task_id, 41);
        assert_eq!(fake.count_calls("baseline("), 2);
        assert_eq!(start.elapsed(), TASK_DISCOVERY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_id_is_a_warning() {
        let fake = FakeOme::new();
        fake.set_task_assignment(TaskAssignment::Never);
        let baseline = submitted(&fake).await;

        let outcome = run(&fake, baseline, settings(3, 20, false)).await.unwrap();

        assert!(matches!(
            outcome.warnings.as_slice(),
            [OmeError::TaskIdNeverAssigned(_)]
        ));
        assert_eq!(fake.count_calls("baseline("), NO_OF_TRIES);
        assert_eq!(fake.count_calls("job("), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_budget() {
        let fake = FakeOme::new();
        fake.set_default_job_status(JOB_STATUS_RUNNING);
        let baseline = submitted(&fake).await;
        let poll = settings(30, 20, false);

        let start = Instant::now();
        let err = run(&fake, baseline, poll).await.unwrap_err();

        assert!(matches!(err, OmeError::Timeout { seconds: 600, .. }));
        assert!(start.elapsed() <= poll.budget() + TASK_DISCOVERY_INTERVAL * NO_OF_TRIES as u32);
        assert_eq!(fake.count_calls("job("), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_last_record() {
        let fake = FakeOme::new();
        fake.set_default_job_status(JOB_STATUS_RUNNING);
        let baseline = submitted(&fake).await;
        let id = baseline.id;

        let outcome = run(&fake, baseline, settings(4, 20, true)).await.unwrap();

        assert_eq!(outcome.baseline.id, id);
        assert!(outcome.history.is_none());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [OmeError::Timeout { seconds: 80, .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_collects_history() {
        let fake = FakeOme::new();
        fake.set_next_task_id(77);
        fake.script_job(77, [JOB_STATUS_RUNNING, JOB_STATUS_RUNNING, JOB_STATUS_SUCCESS]);
        fake.set_history_details(77, &["Compliance computed", "2 devices evaluated"]);
        let baseline = submitted(&fake).await;

        let start = Instant::now();
        let outcome = run(&fake, baseline, settings(30, 20, false)).await.unwrap();

        assert_eq!(
            outcome.history.as_deref(),
            Some("Compliance computed\n2 devices evaluated")
        );
        assert!(outcome.warnings.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_history_comes_from_newest_execution() {
        let fake = FakeOme::new();
        fake.add_execution(77, 1, &["first run"]);
        fake.add_execution(77, 3, &["third run", "3 devices evaluated"]);
        fake.add_execution(77, 2, &["second run"]);

        let history = execution_history(&fake, 77).await.unwrap();

        assert_eq!(history, "third run\n3 devices evaluated");
        assert_eq!(fake.count_calls("execution_history_details(77,3)"), 1);
        assert_eq!(fake.count_calls("execution_history_details"), 1);
    }

    #[tokio::test]
    async fn test_job_without_executions_has_empty_history() {
        let fake = FakeOme::new();

        let history = execution_history(&fake, 77).await.unwrap();

        assert!(history.is_empty());
        assert_eq!(fake.count_calls("execution_history_details"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_history_is_a_warning() {
        let fake = FakeOme::new();
        fake.set_history_unavailable(true);
        let baseline = submitted(&fake).await;

        let outcome = run(&fake, baseline, settings(1, 20, false)).await.unwrap();

        assert!(matches!(
            outcome.warnings.as_slice(),
            [OmeError::ExecutionHistoryUnavailable(_)]
        ));
    }

    #[tokio::test]
    async fn test_running_job_guard() {
        let fake = FakeOme::new();
        fake.script_job(777, [JOB_STATUS_RUNNING]);

        let err = ensure_not_running(&fake, 777).await.unwrap_err();
        assert!(matches!(err, OmeError::BaselineJobRunning(777)));

        fake.script_job(778, [JOB_STATUS_SUCCESS]);
        tokio_test::assert_ok!(ensure_not_running(&fake, 778).await);
        tokio_test::assert_ok!(ensure_not_running(&fake, 0).await);
    }
}
