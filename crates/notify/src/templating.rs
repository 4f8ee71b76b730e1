//! Minijinja template rendering for alert messages.
//!
//! Renders email subjects and bodies (and optional webhook bodies) from an
//! [`AlertEvent`]. Templates are arbitrary strings (not pre-registered), so
//! a fresh [`minijinja::Environment`] is created per render call.

use std::collections::BTreeMap;

use umbrella_core::AlertEvent;

use crate::traits::NotifyError;

/// Default email subject.
pub const DEFAULT_SUBJECT: &str =
    "[ALERT] {{ alert.stream | upper }} {{ alert.sample_id }}: {{ alert.message }}";

/// Default email body.
pub const DEFAULT_BODY: &str = "\
{{ alert.message }}

Sample:  {{ alert.sample_id }}
Stream:  {{ alert.stream }}
Raised:  {{ alert.raised_at }}
{% for name, value in alert.payload|items %}
  {{ name }}: {{ value }}{% endfor %}

Alert id: {{ alert.id }}
";

/// Context data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub alert: AlertContext,
    /// Render time in RFC 3339.
    pub now: String,
}

/// Alert fields exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    pub id: String,
    pub sample_id: String,
    /// Stream kind, lowercase.
    pub stream: String,
    pub message: String,
    /// Domain metrics and raised flags, already rendered as text.
    pub payload: BTreeMap<String, String>,
    pub raised_at: String,
}

impl TemplateContext {
    pub fn from_alert(alert: &AlertEvent) -> Self {
        Self {
            alert: AlertContext {
                id: alert.id.to_string(),
                sample_id: alert.sample_id.clone(),
                stream: alert.stream_kind.to_string(),
                message: alert.message.clone(),
                payload: alert.payload.clone(),
                raised_at: alert.raised_at.to_rfc3339(),
            },
            now: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Renders alert templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);

        env.add_function("env", env_function);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Global function: read an environment variable by name, empty if unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}
