//! Target device resolution.
//!
//! Users name targets either by device id or by service tag, never both.
//! Resolution looks every identifier up, collapses duplicates and checks
//! that each device carries the advanced-license capability. Problems are
//! reported once for the whole input, listing every offender.

use std::collections::HashSet;

use tracing::debug;

use crate::client::models::Device;
use crate::client::OmeApi;
use crate::error::OmeError;

/// Which identifier form the user supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierMode {
    /// Device ids.
    ById,
    /// Service tags.
    ByTag,
    /// Neither.
    None,
}

/// Determine the identifier form. Fails when both forms are present.
pub fn identifier_mode(ids: &[i64], tags: &[String]) -> Result<IdentifierMode, OmeError> {
    match (ids.is_empty(), tags.is_empty()) {
        (false, false) => Err(OmeError::MutuallyExclusiveDeviceInput),
        (false, true) => Ok(IdentifierMode::ById),
        (true, false) => Ok(IdentifierMode::ByTag),
        (true, true) => Ok(IdentifierMode::None),
    }
}

/// Devices in first-declared order, with the form they were declared in.
#[derive(Debug, Clone)]
pub struct ResolvedTargets {
    /// Identifier form of the input.
    pub mode: IdentifierMode,
    /// One record per distinct device.
    pub devices: Vec<Device>,
}

fn dedup<T: Eq + std::hash::Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}

/// Resolve declared targets against live inventory.
pub async fn resolve_targets(
    api: &dyn OmeApi,
    ids: &[i64],
    tags: &[String],
) -> Result<ResolvedTargets, OmeError> {
    let mode = identifier_mode(ids, tags)?;

    // (user-facing identifier, device)
    let mut found: Vec<(String, Device)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    match mode {
        IdentifierMode::None => return Err(OmeError::NoTargetDevices),
        IdentifierMode::ById => {
            for id in dedup(ids) {
                match api.device(id).await {
                    Ok(device) => found.push((id.to_string(), device)),
                    Err(err) if err.is_not_found() => missing.push(id.to_string()),
                    Err(err) => return Err(err),
                }
            }
        },
        IdentifierMode::ByTag => {
            for tag in dedup(tags) {
                match api.devices_by_service_tag(&tag).await?.into_iter().next() {
                    Some(device) => found.push((tag, device)),
                    None => missing.push(tag),
                }
            }
        },
    }

    if !missing.is_empty() {
        return Err(OmeError::UnknownDevice(missing));
    }

    let not_capable: Vec<String> = found
        .iter()
        .filter(|(_, device)| !device.has_advanced_license())
        .map(|(identifier, _)| identifier.clone())
        .collect();
    if !not_capable.is_empty() {
        return Err(OmeError::DeviceNotCapable(not_capable));
    }

    let mut seen_ids = HashSet::new();
    let devices: Vec<Device> = found
        .into_iter()
        .map(|(_, device)| device)
        .filter(|device| seen_ids.insert(device.id))
        .collect();

    debug!(count = devices.len(), ?mode, "targets resolved");
    Ok(ResolvedTargets { mode, devices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeOme;

    fn inventory() -> FakeOme {
        FakeOme::new()
            .with_device(10, "SVC1", &[33])
            .with_device(20, "SVC2", &[1, 33])
            .with_device(30, "SVC3", &[1, 2])
    }

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_both_forms_rejected_without_calls() {
        let fake = inventory();

        let err = resolve_targets(&fake, &[10], &tags(&["SVC1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, OmeError::MutuallyExclusiveDeviceInput));
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_identifier_mode() {
        assert_eq!(identifier_mode(&[1], &[]).unwrap(), IdentifierMode::ById);
        assert_eq!(
            identifier_mode(&[], &tags(&["SVC1"])).unwrap(),
            IdentifierMode::ByTag
        );
        assert_eq!(identifier_mode(&[], &[]).unwrap(), IdentifierMode::None);
    }

    #[tokio::test]
    async fn test_neither_form_is_an_error_when_resolving() {
        let err = resolve_targets(&inventory(), &[], &[]).await.unwrap_err();
        assert!(matches!(err, OmeError::NoTargetDevices));
    }

    #[tokio::test]
    async fn test_tags_resolve_in_order_and_dedup() {
        let fake = inventory();

        let resolved = resolve_targets(&fake, &[], &tags(&["SVC2", "SVC1", "SVC2"]))
            .await
            .unwrap();

        assert_eq!(resolved.mode, IdentifierMode::ByTag);
        let ids: Vec<_> = resolved.devices.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![20, 10]);
        assert_eq!(fake.count_calls("devices_by_service_tag"), 2);
    }

    #[tokio::test]
    async fn test_missing_ids_listed_together() {
        let err = resolve_targets(&inventory(), &[10, 98, 99], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, OmeError::UnknownDevice(ref ids) if ids == &["98", "99"]));
    }

    #[tokio::test]
    async fn test_every_incapable_device_is_named() {
        let fake = inventory().with_device(40, "SVC4", &[]);

        let err = resolve_targets(&fake, &[], &tags(&["SVC1", "SVC3", "SVC4"]))
            .await
            .unwrap_err();

        assert!(matches!(err, OmeError::DeviceNotCapable(ref t) if t == &["SVC3", "SVC4"]));
    }

    #[tokio::test]
    async fn test_lookup_errors_propagate() {
        let fake = inventory();
        fake.fail_device(10);

        let err = resolve_targets(&fake, &[10], &[]).await.unwrap_err();
        assert!(matches!(err, OmeError::RequestFailed { status: 500, .. }));
    }
}
