//! Error types for the OME provider.
//!
//! Two layers:
//!
//! - [`OmeError`] is the baseline engine's taxonomy. Every failure the
//!   reconciliation core can raise is a variant here, grouped by
//!   [`ErrorKind`].
//! - [`ProviderError`] is what crosses the plugin boundary. It maps onto
//!   gRPC status codes and is what the host renders as a diagnostic.

use thiserror::Error;

/// Errors returned to the host from provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The management service is unreachable or answered with an error.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Sdk(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::PermissionDenied(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Sdk(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::DeadlineExceeded(msg) => tonic::Status::deadline_exceeded(msg),
            ProviderError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
        }
    }
}

/// Broad classification of an [`OmeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised purely from user input, before any server call matters.
    Config,
    /// Live inventory disagrees with the declared intent.
    Resolution,
    /// Session or HTTP layer failure.
    Transport,
    /// Raised while driving the server-side job.
    Job,
    /// Raised while synthesizing the post-apply state.
    State,
}

/// Errors raised by the baseline reconciliation engine and the OME client.
#[derive(Debug, Error)]
pub enum OmeError {
    /// Scheduling is off but a cron expression or recipients were given.
    #[error("cron and email_addresses must not be set when schedule is disabled")]
    ScheduleInconsistent,

    /// Scheduling is on without any recipient.
    #[error("at least one email address is required when schedule is enabled")]
    ScheduleMissingRecipients,

    /// Per-schedule notification is on without a cron expression.
    #[error("cron is required when notify_on_schedule is enabled")]
    MissingCron,

    /// A recipient is not a valid mail address.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// The output format is not one of the accepted tokens.
    #[error("invalid output format {0:?}, expected one of html, csv, pdf, xls")]
    InvalidOutputFormat(String),

    /// Zero or both of template id/name were supplied.
    #[error("exactly one of ref_template_id or ref_template_name must be set")]
    InvalidTemplateSelection,

    /// The reference template is not a compliance template.
    #[error("template {name:?} has view type {view_type}, expected a compliance template")]
    InvalidTemplateType {
        /// Template name.
        name: String,
        /// View type reported by the server.
        view_type: i64,
    },

    /// Both device ids and service tags were supplied.
    #[error("device_ids and device_servicetags are mutually exclusive")]
    MutuallyExclusiveDeviceInput,

    /// Neither device ids nor service tags were supplied.
    #[error("one of device_ids or device_servicetags must be set")]
    NoTargetDevices,

    /// One or more identifiers did not match a device.
    #[error("devices not found: {}", .0.join(", "))]
    UnknownDevice(Vec<String>),

    /// One or more devices lack the advanced-license capability.
    #[error("devices without the required license capability: {}", .0.join(", "))]
    DeviceNotCapable(Vec<String>),

    /// The reference template does not exist.
    #[error("template not found: {0}")]
    UnknownTemplate(String),

    /// The baseline does not exist.
    #[error("baseline not found: {0}")]
    UnknownBaseline(String),

    /// Session creation was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// An update was attempted while the baseline job is still running.
    #[error("baseline job {0} is running, retry once it has finished")]
    BaselineJobRunning(i64),

    /// The job did not reach success within the polling budget.
    #[error("job {task_id} did not complete within {seconds} seconds")]
    Timeout {
        /// Job id.
        task_id: i64,
        /// Total polling budget in seconds.
        seconds: u64,
    },

    /// The server never assigned a task id to the baseline.
    #[error("no task id was assigned to baseline {0}, job status was not tracked")]
    TaskIdNeverAssigned(i64),

    /// The job's execution history could not be read.
    #[error("execution history unavailable: {0}")]
    ExecutionHistoryUnavailable(String),

    /// Some target devices could not be read back.
    #[error("could not read devices {}, device fields may be stale", join_ids(.0))]
    TargetResolveFailed(Vec<i64>),
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl OmeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ScheduleInconsistent
            | Self::ScheduleMissingRecipients
            | Self::MissingCron
            | Self::InvalidEmail(_)
            | Self::InvalidOutputFormat(_)
            | Self::InvalidTemplateSelection
            | Self::InvalidTemplateType { .. }
            | Self::MutuallyExclusiveDeviceInput
            | Self::NoTargetDevices => ErrorKind::Config,
            Self::UnknownDevice(_)
            | Self::DeviceNotCapable(_)
            | Self::UnknownTemplate(_)
            | Self::UnknownBaseline(_) => ErrorKind::Resolution,
            Self::AuthFailed(_)
            | Self::RequestFailed { .. }
            | Self::Transport(_)
            | Self::Decode(_) => ErrorKind::Transport,
            Self::BaselineJobRunning(_)
            | Self::Timeout { .. }
            | Self::TaskIdNeverAssigned(_)
            | Self::ExecutionHistoryUnavailable(_) => ErrorKind::Job,
            Self::TargetResolveFailed(_) => ErrorKind::State,
        }
    }

    /// Whether this error is reported as a warning rather than failing the
    /// operation.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::TaskIdNeverAssigned(_)
                | Self::ExecutionHistoryUnavailable(_)
                | Self::TargetResolveFailed(_)
        )
    }

    /// Whether the server reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 404, .. })
    }
}

impl From<reqwest::Error> for OmeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<OmeError> for ProviderError {
    fn from(err: OmeError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::Config => ProviderError::Validation(msg),
            ErrorKind::Resolution => match err {
                OmeError::DeviceNotCapable(_) => ProviderError::FailedPrecondition(msg),
                _ => ProviderError::NotFound(msg),
            },
            ErrorKind::Transport => match err {
                OmeError::AuthFailed(_) => ProviderError::PermissionDenied(msg),
                OmeError::RequestFailed { status: 401 | 403, .. } => {
                    ProviderError::PermissionDenied(msg)
                },
                OmeError::RequestFailed { status: 404, .. } => ProviderError::NotFound(msg),
                _ => ProviderError::Unavailable(msg),
            },
            ErrorKind::Job => match err {
                OmeError::BaselineJobRunning(_) => ProviderError::FailedPrecondition(msg),
                OmeError::Timeout { .. } => ProviderError::DeadlineExceeded(msg),
                _ => ProviderError::Sdk(msg),
            },
            ErrorKind::State => ProviderError::Sdk(msg),
        }
    }
}
