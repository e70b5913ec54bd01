//! Convenience types exchanged between the host-facing server and the
//! provider implementation.

use serde::{Deserialize, Serialize};

use crate::schema::Diagnostic;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (None if unknown until apply).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a modified attribute.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: change
                .before
                .map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default(),
            after: change
                .after
                .map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default(),
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// State returned from an apply or read, with any warnings raised on the way.
///
/// A `Null` state tells the host the remote object is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    /// The state document to persist.
    pub state: serde_json::Value,
    /// Non-fatal diagnostics to surface to the host.
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourceState {
    /// Wrap a state document with no diagnostics.
    pub fn new(state: serde_json::Value) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Attach diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    /// The state that tells the host the object no longer exists.
    pub fn removed() -> Self {
        Self::new(serde_json::Value::Null)
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// Drop `null` members of an object so serde defaults apply to them.
pub(crate) fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect())
        },
        other => other,
    }
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by providers.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("baseline_name", json!("b1"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("b1")));

        let modified = AttributeChange::modified("sleep_interval", json!(20), json!(5));
        assert_eq!(modified.before, Some(json!(20)));
        assert_eq!(modified.after, Some(json!(5)));
    }

    #[test]
    fn test_attribute_change_to_proto() {
        let proto: crate::generated::AttributeChange =
            AttributeChange::modified("cron", json!("0 0 * * *"), json!("0 1 * * *")).into();
        assert_eq!(proto.path, "cron");
        assert_eq!(proto.before, b"\"0 0 * * *\"".to_vec());

        let proto: crate::generated::AttributeChange =
            AttributeChange::new("id", Some(json!(1)), None).into();
        assert!(proto.after.is_empty());
    }

    #[test]
    fn test_resource_state() {
        let state = ResourceState::new(json!({"id": 1}))
            .with_diagnostics(vec![Diagnostic::warning("job still running")]);
        assert_eq!(state.diagnostics.len(), 1);
        assert!(ResourceState::removed().state.is_null());
    }

    #[test]
    fn test_strip_nulls() {
        let stripped = strip_nulls(json!({"cron": null, "schedule": true}));
        assert_eq!(stripped, json!({"schedule": true}));
        assert_eq!(strip_nulls(json!([null])), json!([null]));
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "HEMMER_PROVIDER");
    }
}
