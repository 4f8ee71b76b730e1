//! SMTP email notifier via `lettre` with TLS support.
//!
//! Alerts become emails whose subject and body are rendered from minijinja
//! templates. Supports plain SMTP, STARTTLS and implicit TLS (port 465).

use std::sync::Arc;

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use umbrella_core::{AlertEvent, EmailConfig};

use crate::templating::{TemplateContext, TemplateRenderer, DEFAULT_BODY, DEFAULT_SUBJECT};
use crate::traits::{Notifier, NotifyError};

/// Sends alerts as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject_template: String,
    body_template: String,
    renderer: Arc<TemplateRenderer>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from the alert email settings.
    ///
    /// Custom subject and body templates are checked here, so a broken
    /// template fails at startup rather than on the first alert.
    ///
    /// Port 465 always uses implicit TLS. Otherwise `tls` selects STARTTLS
    /// or a plain connection.
    ///
    /// SMTP credentials are resolved from the `SMTP_USERNAME` and `SMTP_PASSWORD`
    /// environment variables. If both are set, they are passed to the transport;
    /// otherwise the connection is unauthenticated.
    pub fn from_config(
        config: &EmailConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let to: Vec<Mailbox> = config
            .to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let host = config.smtp_host.as_str();
        let port = config.smtp_port;
        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        let subject_template = config
            .subject_template
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let body_template = config
            .body_template
            .clone()
            .unwrap_or_else(|| DEFAULT_BODY.to_string());
        renderer
            .validate(&subject_template)
            .map_err(|e| NotifyError::Config(format!("invalid subject template: {e}")))?;
        renderer
            .validate(&body_template)
            .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
            to,
            subject_template,
            body_template,
            renderer,
        })
    }

    fn compose(&self, alert: &AlertEvent) -> Result<Message, NotifyError> {
        let ctx = TemplateContext::from_alert(alert);
        let subject = self.renderer.render(&self.subject_template, &ctx)?;
        let body = self.renderer.render(&self.body_template, &ctx)?;

        let mut message_builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            message_builder = message_builder.to(recipient.clone());
        }
        message_builder
            .subject(subject)
            .body(body)
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        let email = self.compose(alert)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            sample_id = %alert.sample_id,
            recipients = self.to.len(),
            "alert delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
