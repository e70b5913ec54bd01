//! Cross-field checks on scheduling and notification input.
//!
//! Pure functions; nothing here talks to the server.

use email_address::EmailAddress;

use super::state::BaselineState;
use crate::error::OmeError;

/// Accepted report formats. Matching is case-sensitive.
pub const OUTPUT_FORMATS: [&str; 4] = ["html", "csv", "pdf", "xls"];

/// The notification part of a baseline declaration.
#[derive(Debug, Clone, Copy)]
pub struct NotificationIntent<'a> {
    /// Scheduling enabled.
    pub schedule: bool,
    /// Notify on every scheduled run rather than only on drift.
    pub notify_on_schedule: bool,
    /// Cron expression.
    pub cron: Option<&'a str>,
    /// Recipients.
    pub email_addresses: &'a [String],
    /// Report format.
    pub output_format: &'a str,
}

impl<'a> From<&'a BaselineState> for NotificationIntent<'a> {
    fn from(state: &'a BaselineState) -> Self {
        Self {
            schedule: state.schedule,
            notify_on_schedule: state.notify_on_schedule,
            cron: state.cron.as_deref(),
            email_addresses: &state.email_addresses,
            output_format: &state.output_format,
        }
    }
}

impl NotificationIntent<'_> {
    fn has_cron(&self) -> bool {
        self.cron.is_some_and(|c| !c.trim().is_empty())
    }

    fn has_recipients(&self) -> bool {
        !self.email_addresses.is_empty()
    }
}

/// The first violation, in rule order.
pub fn validate(intent: NotificationIntent<'_>) -> Result<(), OmeError> {
    match violations(intent).into_iter().next() {
        Some((err, _)) => Err(err),
        None => Ok(()),
    }
}

/// Every violation, each paired with the attribute it concerns.
pub fn violations(intent: NotificationIntent<'_>) -> Vec<(OmeError, &'static str)> {
    let mut found = Vec::new();

    if intent.schedule {
        if !intent.has_recipients() {
            found.push((OmeError::ScheduleMissingRecipients, "email_addresses"));
        }
        if intent.notify_on_schedule && !intent.has_cron() {
            found.push((OmeError::MissingCron, "cron"));
        }
    } else if intent.has_cron() || intent.has_recipients() {
        let attribute = if intent.has_cron() { "cron" } else { "email_addresses" };
        found.push((OmeError::ScheduleInconsistent, attribute));
    }

    for address in intent.email_addresses {
        if !EmailAddress::is_valid(address) {
            found.push((OmeError::InvalidEmail(address.clone()), "email_addresses"));
        }
    }

    if !OUTPUT_FORMATS.contains(&intent.output_format) {
        found.push((
            OmeError::InvalidOutputFormat(intent.output_format.to_string()),
            "output_format",
        ));
    }

    found
}
