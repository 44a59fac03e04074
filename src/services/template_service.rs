/*!
 * Template Service
 *
 * Wraps the Tera engine behind the renderer interface the dispatch
 * worker uses: a template path derived from (message kind, template
 * name, version), a selector picking the part to render ("subject" or
 * "content"), and an opaque variable map passed through untouched.
 *
 * Template files live at `<dir>/<kind>/<name>/<version>/<selector>.html`.
 */

use serde_json::Map;
use tera::{Context, Tera};

use crate::config::TemplateConfig;
use crate::models::{MessageKind, NotificationType};
use crate::utils::DispatchError;

/// Template renderer
#[derive(Clone)]
pub struct TemplateService {
    tera: Tera,
    config: TemplateConfig,
}

impl TemplateService {
    /// Load all templates under the configured directory
    pub fn new(config: TemplateConfig) -> Result<Self, DispatchError> {
        let glob = format!("{}/**/*.html", config.directory);
        let tera = Tera::new(&glob)
            .map_err(|e| DispatchError::Config(format!("Failed to load templates: {}", e)))?;

        tracing::info!(
            "Loaded {} templates from {}",
            tera.get_template_names().count(),
            config.directory
        );

        Ok(Self { tera, config })
    }

    /// Build a service over in-memory templates; used by tests and
    /// template linting tooling
    pub fn from_raw(
        config: TemplateConfig,
        templates: &[(&str, &str)],
    ) -> Result<Self, DispatchError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates.to_vec())
            .map_err(|e| DispatchError::Config(format!("Failed to load templates: {}", e)))?;
        Ok(Self { tera, config })
    }

    /// Pinned template version for a notification type
    ///
    /// A missing pin is a configuration error and fails the dispatch.
    pub fn pinned_version(
        &self,
        notification_type: NotificationType,
    ) -> Result<String, DispatchError> {
        let template_name = notification_type.template_name();
        self.config
            .version_for(template_name, notification_type.is_email())
            .map(str::to_string)
            .ok_or_else(|| {
                DispatchError::Config(format!(
                    "No template version configured for {} ({})",
                    template_name,
                    notification_type.message_kind().as_str()
                ))
            })
    }

    /// Template path for a message kind, template name and version
    pub fn template_path(kind: MessageKind, template_name: &str, version: &str) -> String {
        let kind_dir = match kind {
            MessageKind::Email => "email",
            MessageKind::InApp => "in-app",
        };
        format!("{}/{}/{}", kind_dir, template_name, version)
    }

    /// Render one selector of a template with the given variable map
    pub fn render(
        &self,
        template_path: &str,
        selector: &str,
        variables: &Map<String, serde_json::Value>,
    ) -> Result<String, DispatchError> {
        let full_path = format!("{}/{}.html", template_path, selector);

        let context = Context::from_serialize(variables)
            .map_err(|e| DispatchError::Render(format!("Invalid template variables: {}", e)))?;

        self.tera
            .render(&full_path, &context)
            .map_err(|e| DispatchError::Render(format!("{}: {}", full_path, e)))
    }

    /// Render the subject line for a notification; None when the
    /// template has no subject part or rendering fails
    pub fn render_subject(
        &self,
        kind: MessageKind,
        template_name: &str,
        version: &str,
        variables: &Map<String, serde_json::Value>,
    ) -> Option<String> {
        let path = Self::template_path(kind, template_name, version);
        match self.render(&path, "subject", variables) {
            Ok(subject) => Some(subject.trim().to_string()),
            Err(e) => {
                tracing::debug!("No subject rendered for {}: {}", path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> TemplateConfig {
        let mut versions = HashMap::new();
        versions.insert(
            "programme-created".to_string(),
            crate::config::TemplateVersions {
                email: Some("v1.0.0".to_string()),
                in_app: None,
            },
        );
        TemplateConfig {
            directory: "templates".to_string(),
            versions,
        }
    }

    #[test]
    fn test_template_path_by_kind() {
        assert_eq!(
            TemplateService::template_path(MessageKind::Email, "programme-created", "v1.0.0"),
            "email/programme-created/v1.0.0"
        );
        assert_eq!(
            TemplateService::template_path(MessageKind::InApp, "ltft", "v1.0.0"),
            "in-app/ltft/v1.0.0"
        );
    }

    #[test]
    fn test_pinned_version_missing_is_config_error() {
        let service = TemplateService::from_raw(test_config(), &[]).unwrap();

        assert!(service
            .pinned_version(NotificationType::ProgrammeCreated)
            .is_ok());

        let err = service
            .pinned_version(NotificationType::GmcUpdated)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_render_substitutes_variables() {
        let service = TemplateService::from_raw(
            test_config(),
            &[(
                "email/programme-created/v1.0.0/content.html",
                "Welcome to {{ programmeName }}.",
            )],
        )
        .unwrap();

        let mut variables = Map::new();
        variables.insert("programmeName".to_string(), "General Practice".into());

        let rendered = service
            .render("email/programme-created/v1.0.0", "content", &variables)
            .unwrap();
        assert_eq!(rendered, "Welcome to General Practice.");
    }

    #[test]
    fn test_render_missing_template_is_render_error() {
        let service = TemplateService::from_raw(test_config(), &[]).unwrap();
        let err = service
            .render("email/unknown/v1.0.0", "content", &Map::new())
            .unwrap_err();
        assert!(matches!(err, DispatchError::Render(_)));
    }

    #[test]
    fn test_render_subject_absent_returns_none() {
        let service = TemplateService::from_raw(
            test_config(),
            &[(
                "in-app/ltft/v1.0.0/subject.html",
                "LTFT update for {{ programmeName }}",
            )],
        )
        .unwrap();

        let mut variables = Map::new();
        variables.insert("programmeName".to_string(), "Cardiology ST3".into());

        assert_eq!(
            service.render_subject(MessageKind::InApp, "ltft", "v1.0.0", &variables),
            Some("LTFT update for Cardiology ST3".to_string())
        );
        assert_eq!(
            service.render_subject(MessageKind::Email, "gmc-updated", "v1.0.0", &variables),
            None
        );
    }
}
