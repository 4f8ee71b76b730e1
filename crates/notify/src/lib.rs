//! Alert delivery for the sample pipeline.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable alert channels
//! - Log, email, and webhook notifier implementations
//! - Minijinja template rendering for alert messages
//! - A bounded, non-blocking dispatcher that isolates delivery failures

pub mod dispatcher;
pub mod email;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

use std::sync::Arc;

use umbrella_core::{AlertChannel, AlertConfig};

pub use dispatcher::{AlertDispatcher, AlertHandle, AlertNotifier, DeliveryStats};
pub use email::EmailNotifier;
pub use log::LogNotifier;
pub use templating::TemplateRenderer;
pub use traits::{Notifier, NotifyError};
pub use webhook::WebhookNotifier;

/// Build the notifier for the configured channel.
///
/// The channel is picked once, here. An unknown channel name or unusable
/// channel settings fail at startup rather than at the first alert.
pub fn build_notifier(config: &AlertConfig) -> Result<Box<dyn Notifier>, NotifyError> {
    let channel: AlertChannel = config
        .channel
        .parse()
        .map_err(|_| NotifyError::UnsupportedChannel(config.channel.clone()))?;
    let renderer = Arc::new(TemplateRenderer::new());

    let notifier: Box<dyn Notifier> = match channel {
        AlertChannel::Log => Box::new(LogNotifier::new()),
        AlertChannel::Email => Box::new(EmailNotifier::from_config(&config.email, renderer)?),
        AlertChannel::Webhook => {
            let url = config.webhook.url.clone().ok_or_else(|| {
                NotifyError::Config("WEBHOOK_URL is required for the webhook channel".to_string())
            })?;
            Box::new(WebhookNotifier::from_config(
                url,
                config.webhook.method.clone(),
                Some(config.webhook.headers.clone().into_iter().collect()),
                config.webhook.body_template.clone(),
                renderer,
            )?)
        }
    };
    tracing::info!(channel = notifier.channel_name(), "alert channel ready");
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbrella_core::Config;

    fn alerts(channel: &str) -> AlertConfig {
        let mut config = Config::default().alerts;
        config.channel = channel.to_string();
        config
    }

    #[test]
    fn default_channel_is_log() {
        let notifier = build_notifier(&Config::default().alerts).unwrap();
        assert_eq!(notifier.channel_name(), "log");
    }

    #[test]
    fn sms_is_unsupported() {
        match build_notifier(&alerts("sms")) {
            Err(NotifyError::UnsupportedChannel(name)) => assert_eq!(name, "sms"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("sms should not build"),
        }
    }

    #[test]
    fn webhook_requires_url() {
        assert!(matches!(
            build_notifier(&alerts("webhook")),
            Err(NotifyError::Config(_))
        ));

        let mut config = alerts("webhook");
        config.webhook.url = Some("https://hooks.example.com/umbrella".to_string());
        assert_eq!(build_notifier(&config).unwrap().channel_name(), "webhook");
    }

    #[test]
    fn webhook_rejects_bad_configured_body_template() {
        let mut config = alerts("webhook");
        config.webhook.url = Some("https://hooks.example.com/umbrella".to_string());
        config.webhook.body_template = Some("{{ unclosed".to_string());
        match build_notifier(&config) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("invalid body template")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("broken template should not build"),
        }
    }

    #[test]
    fn webhook_header_env_refs_must_resolve() {
        let mut config = alerts("webhook");
        config.webhook.url = Some("https://hooks.example.com/umbrella".to_string());
        config
            .webhook
            .headers
            .insert("X-Api-Key".to_string(), "${UMBRELLA_UNSET_HOOK_KEY}".to_string());
        assert!(matches!(build_notifier(&config), Err(NotifyError::Config(_))));
    }

    #[test]
    fn email_rejects_bad_configured_subject() {
        let mut config = alerts("email");
        config.email.subject_template = Some("{% if %}".to_string());
        assert!(matches!(build_notifier(&config), Err(NotifyError::Config(_))));
    }

    #[test]
    fn email_uses_configured_recipients() {
        let notifier = build_notifier(&alerts("EMAIL")).unwrap();
        assert_eq!(notifier.channel_name(), "email");
    }
}
