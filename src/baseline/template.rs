//! Reference template resolution.

use std::fmt;

use crate::client::models::{Template, COMPLIANCE_VIEW_TYPE_ID};
use crate::client::OmeApi;
use crate::error::OmeError;

/// How the reference template is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSelector {
    /// By id.
    Id(i64),
    /// By exact name.
    Name(String),
}

impl TemplateSelector {
    /// Selector from user configuration: exactly one of a non-zero id or
    /// a non-empty name.
    pub fn from_config(id: Option<i64>, name: Option<&str>) -> Result<Self, OmeError> {
        let id = id.filter(|id| *id != 0);
        let name = name.filter(|n| !n.is_empty());
        match (id, name) {
            (Some(id), None) => Ok(Self::Id(id)),
            (None, Some(name)) => Ok(Self::Name(name.to_string())),
            _ => Err(OmeError::InvalidTemplateSelection),
        }
    }

    /// Selector from a planned state, where both halves may already be
    /// filled in. The id wins.
    pub fn from_state(id: Option<i64>, name: Option<&str>) -> Result<Self, OmeError> {
        match (id.filter(|id| *id != 0), name.filter(|n| !n.is_empty())) {
            (Some(id), _) => Ok(Self::Id(id)),
            (None, Some(name)) => Ok(Self::Name(name.to_string())),
            (None, None) => Err(OmeError::InvalidTemplateSelection),
        }
    }
}

impl fmt::Display for TemplateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Fetch the template and check that it is a compliance template.
pub async fn resolve_template(
    api: &dyn OmeApi,
    selector: &TemplateSelector,
) -> Result<Template, OmeError> {
    let template = match selector {
        TemplateSelector::Id(id) => api.template_by_id(*id).await?,
        TemplateSelector::Name(name) => api.template_by_name(name).await?,
    }
    .ok_or_else(|| OmeError::UnknownTemplate(selector.to_string()))?;

    if template.view_type_id != COMPLIANCE_VIEW_TYPE_ID {
        return Err(OmeError::InvalidTemplateType {
            name: template.name,
            view_type: template.view_type_id,
        });
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeOme;

    #[test]
    fn test_config_selection_is_exclusive() {
        assert_eq!(
            TemplateSelector::from_config(Some(7), None).unwrap(),
            TemplateSelector::Id(7)
        );
        assert_eq!(
            TemplateSelector::from_config(Some(0), Some("tpl1")).unwrap(),
            TemplateSelector::Name("tpl1".into())
        );
        assert!(matches!(
            TemplateSelector::from_config(Some(7), Some("tpl1")),
            Err(OmeError::InvalidTemplateSelection)
        ));
        assert!(matches!(
            TemplateSelector::from_config(None, Some("")),
            Err(OmeError::InvalidTemplateSelection)
        ));
    }

    #[test]
    fn test_state_selection_prefers_id() {
        assert_eq!(
            TemplateSelector::from_state(Some(7), Some("tpl1")).unwrap(),
            TemplateSelector::Id(7)
        );
        assert!(TemplateSelector::from_state(None, None).is_err());
    }

    #[tokio::test]
    async fn test_resolve_by_name() {
        let fake = FakeOme::new().with_compliance_template(7, "tpl1");

        let template = resolve_template(&fake, &TemplateSelector::Name("tpl1".into()))
            .await
            .unwrap();

        assert_eq!(template.id, 7);
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let fake = FakeOme::new();

        let err = resolve_template(&fake, &TemplateSelector::Id(3))
            .await
            .unwrap_err();

        assert!(matches!(err, OmeError::UnknownTemplate(ref s) if s == "id 3"));
    }

    #[tokio::test]
    async fn test_deployment_template_rejected() {
        let fake = FakeOme::new().with_template(8, "deploy", 2);

        let err = resolve_template(&fake, &TemplateSelector::Id(8))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OmeError::InvalidTemplateType { ref name, view_type: 2 } if name == "deploy"
        ));
    }
}
