//! Generic HTTP webhook notifier.
//!
//! Delivers alerts as JSON payloads to a configured webhook URL with
//! optional custom headers and an optional request body template.

use std::collections::HashMap;
use std::sync::Arc;

use umbrella_core::AlertEvent;

use crate::templating::{TemplateContext, TemplateRenderer};
use crate::traits::{Notifier, NotifyError};

/// Delivers alerts as JSON over HTTP to a configured endpoint.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    /// Target URL (env vars already resolved).
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    /// When set, the body is this template rendered over the alert;
    /// otherwise the alert itself is serialized as JSON.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier. `method` defaults to `POST`.
    ///
    /// Missing env vars referenced by the URL or headers produce a
    /// [`NotifyError::Config`] error.
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(&url)?;
        if !(resolved_url.starts_with("http://") || resolved_url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook URL must be http(s): {resolved_url}"
            )));
        }

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        if let Some(ref tmpl) = body_template {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            body_template,
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Construct from config-level strings. `method` is parsed
    /// case-insensitively (e.g. `"post"`, `"PUT"`).
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let parsed_method = match method {
            Some(m) => {
                let upper = m.to_uppercase();
                upper
                    .parse::<reqwest::Method>()
                    .map(Some)
                    .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?
            }
            None => None,
        };

        Self::new(
            url,
            parsed_method,
            headers.unwrap_or_default(),
            body_template,
            renderer,
        )
    }

    fn body(&self, alert: &AlertEvent) -> Result<String, NotifyError> {
        match &self.body_template {
            Some(tmpl) => self.renderer.render(tmpl, &TemplateContext::from_alert(alert)),
            None => serde_json::to_string(alert)
                .map_err(|e| NotifyError::Config(format!("failed to serialize alert: {e}"))),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        let body = self.body(alert)?;

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Config(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(
            url = %self.url,
            method = %self.method,
            status = %status,
            sample_id = %alert.sample_id,
            "webhook alert delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            // Consume the '{'
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use umbrella_core::StreamKind;

    fn renderer() -> Arc<TemplateRenderer> {
        Arc::new(TemplateRenderer::new())
    }

    fn alert() -> AlertEvent {
        AlertEvent::new(
            "F002",
            StreamKind::Physical,
            BTreeMap::from([
                ("temperature".to_string(), "39.2".to_string()),
                ("temperature_alert".to_string(), "true".to_string()),
            ]),
            "Physical parameters out of range",
        )
    }

    #[test]
    fn resolve_env_vars_substitutes_each_reference() {
        std::env::set_var("UMBRELLA_HOOK_PROTO", "https");
        std::env::set_var("UMBRELLA_HOOK_HOST", "hooks.lab.test");
        let result = resolve_env_vars("${UMBRELLA_HOOK_PROTO}://${UMBRELLA_HOOK_HOST}/alerts").unwrap();
        assert_eq!(result, "https://hooks.lab.test/alerts");
        std::env::remove_var("UMBRELLA_HOOK_PROTO");
        std::env::remove_var("UMBRELLA_HOOK_HOST");
    }

    #[test]
    fn resolve_env_vars_missing() {
        match resolve_env_vars("https://${UMBRELLA_NOT_SET_12345}/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("UMBRELLA_NOT_SET_12345")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_unclosed() {
        match resolve_env_vars("https://${UNCLOSED/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_no_vars() {
        let result = resolve_env_vars("https://plain.example.com/hook").unwrap();
        assert_eq!(result, "https://plain.example.com/hook");
    }

    #[test]
    fn from_config_method_parsing() {
        let default =
            WebhookNotifier::from_config("https://example.com".into(), None, None, None, renderer())
                .unwrap();
        assert_eq!(default.method, reqwest::Method::POST);

        let put = WebhookNotifier::from_config(
            "https://example.com".into(),
            Some("put".into()),
            None,
            None,
            renderer(),
        )
        .unwrap();
        assert_eq!(put.method, reqwest::Method::PUT);

        let bad = WebhookNotifier::from_config(
            "https://example.com".into(),
            Some("NOT_A_METHOD\0".into()),
            None,
            None,
            renderer(),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn non_http_url_is_rejected() {
        let result =
            WebhookNotifier::from_config("ftp://example.com".into(), None, None, None, renderer());
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }

    #[test]
    fn header_values_resolve_env() {
        std::env::set_var("UMBRELLA_HOOK_TOKEN", "secret-key-123");
        let headers = HashMap::from([
            ("X-Api-Key".to_string(), "${UMBRELLA_HOOK_TOKEN}".to_string()),
            ("X-Static".to_string(), "fixed-value".to_string()),
        ]);
        let notifier = WebhookNotifier::from_config(
            "https://example.com".into(),
            None,
            Some(headers),
            None,
            renderer(),
        )
        .unwrap();
        assert_eq!(notifier.headers["X-Api-Key"], "secret-key-123");
        assert_eq!(notifier.headers["X-Static"], "fixed-value");
        std::env::remove_var("UMBRELLA_HOOK_TOKEN");
    }

    #[test]
    fn default_body_is_alert_json() {
        let notifier =
            WebhookNotifier::from_config("https://example.com".into(), None, None, None, renderer())
                .unwrap();
        let body: serde_json::Value = serde_json::from_str(&notifier.body(&alert()).unwrap()).unwrap();
        assert_eq!(body["sample_id"], "F002");
        assert_eq!(body["temperature"], "39.2");
        assert_eq!(body["message"], "Physical parameters out of range");
    }

    #[test]
    fn templated_body() {
        let notifier = WebhookNotifier::from_config(
            "https://example.com".into(),
            None,
            None,
            Some(r#"{"text": "{{ alert.sample_id }} {{ alert.message }}"}"#.into()),
            renderer(),
        )
        .unwrap();
        assert_eq!(
            notifier.body(&alert()).unwrap(),
            r#"{"text": "F002 Physical parameters out of range"}"#
        );
    }

    #[test]
    fn invalid_body_template() {
        let result = WebhookNotifier::from_config(
            "https://example.com".into(),
            None,
            None,
            Some("{{ unclosed".into()),
            renderer(),
        );
        match result.unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("invalid body template")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }
}
