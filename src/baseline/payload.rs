//! Create and update request bodies.

use crate::client::models::{
    BaselinePayload, BaselineTarget, Device, NotificationSettings, Schedule, Template,
    NOTIFY_ON_NON_COMPLIANCE, NOTIFY_ON_SCHEDULE,
};

use super::state::BaselineState;

/// Build the request body for `intent`.
///
/// `baseline_id` is set for updates only.
pub fn assemble(
    intent: &BaselineState,
    template: &Template,
    devices: &[Device],
    baseline_id: Option<i64>,
) -> BaselinePayload {
    BaselinePayload {
        id: baseline_id,
        name: intent.baseline_name.clone(),
        description: intent.description.clone().unwrap_or_default(),
        template_id: template.id,
        baseline_targets: devices.iter().map(|d| BaselineTarget::device(d.id)).collect(),
        notification_settings: intent.schedule.then(|| notification(intent)),
    }
}

fn notification(intent: &BaselineState) -> NotificationSettings {
    let notification_type = if intent.notify_on_schedule {
        NOTIFY_ON_SCHEDULE
    } else {
        NOTIFY_ON_NON_COMPLIANCE
    };
    NotificationSettings {
        notification_type: notification_type.to_string(),
        email_addresses: intent.email_addresses.clone(),
        schedule: intent
            .cron
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|cron| Schedule { cron: cron.clone() }),
        output_format: intent.output_format.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> Template {
        Template {
            id: 7,
            name: "tpl1".into(),
            view_type_id: 1,
        }
    }

    fn devices() -> Vec<Device> {
        [10, 20]
            .into_iter()
            .map(|id| Device {
                id,
                ..Device::default()
            })
            .collect()
    }

    #[test]
    fn test_unscheduled_payload_has_no_notification() {
        let intent = BaselineState {
            baseline_name: "b1".into(),
            ..BaselineState::default()
        };

        let wire = serde_json::to_value(assemble(&intent, &template(), &devices(), None)).unwrap();

        assert_eq!(
            wire,
            json!({
                "Name": "b1",
                "Description": "",
                "TemplateId": 7,
                "BaselineTargets": [
                    {"Id": 10, "Type": {"Id": 1, "Name": "DEVICE"}},
                    {"Id": 20, "Type": {"Id": 1, "Name": "DEVICE"}}
                ]
            })
        );
    }

    #[test]
    fn test_scheduled_payload() {
        let intent = BaselineState {
            baseline_name: "b1".into(),
            schedule: true,
            notify_on_schedule: true,
            cron: Some("0 0 * * *".into()),
            email_addresses: vec!["ops@x.io".into()],
            output_format: "pdf".into(),
            ..BaselineState::default()
        };

        let payload = assemble(&intent, &template(), &devices(), Some(5));
        let settings = payload.notification_settings.as_ref().unwrap();

        assert_eq!(payload.id, Some(5));
        assert_eq!(settings.notification_type, "NOTIFY_ON_SCHEDULE");
        assert_eq!(settings.output_format, "PDF");
        assert_eq!(settings.schedule.as_ref().unwrap().cron, "0 0 * * *");
    }

    #[test]
    fn test_non_compliance_notification() {
        let intent = BaselineState {
            schedule: true,
            email_addresses: vec!["ops@x.io".into()],
            ..BaselineState::default()
        };

        let payload = assemble(&intent, &template(), &[], None);
        let settings = payload.notification_settings.unwrap();

        assert_eq!(settings.notification_type, "NOTIFY_ON_NON_COMPLIANCE");
        assert_eq!(settings.output_format, "HTML");
        assert!(settings.schedule.is_none());
    }
}
