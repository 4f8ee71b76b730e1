use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::AlertChannel;
use crate::record::StreamKind;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

/// Profile-aware variable lookup: tries `{PROFILE}_{KEY}` first, falls back
/// to `{KEY}`. Empty values count as unset.
struct Vars<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        let get = |k: &str| (self.lookup)(k).filter(|s| !s.trim().is_empty());
        if !self.profile.is_empty() {
            if let Some(v) = get(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        get(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Parsed value, or the default when unset. Unparseable values are
    /// reported instead of silently replaced.
    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T, errors: &mut Vec<String>) -> T {
        match self.opt(key) {
            Some(raw) => match raw.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    errors.push(format!("{key} has an invalid value: {raw}"));
                    default
                }
            },
            None => default,
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.opt(key) {
            Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Deployment environment: development, staging or production.
    pub environment: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub streams: StreamsConfig,
    pub processing: ProcessingConfig,
    pub alerts: AlertConfig,
    pub metrics: MetricsConfig,
    /// Values that failed to parse while loading; reported by `validate`.
    #[serde(skip)]
    load_errors: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars("", &|_: &str| None)
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `UMBRELLA_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("UMBRELLA_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        Self::from_vars(profile, &|key: &str| env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_vars(profile: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let p = profile.trim().to_uppercase();
        let vars = Vars {
            profile: &p,
            lookup,
        };
        let mut errors = Vec::new();
        Self {
            profile: p.clone(),
            environment: vars.or("ENVIRONMENT", "development"),
            log_level: vars.or("LOG_LEVEL", "info"),
            streams: StreamsConfig::from_vars(&vars, &mut errors),
            processing: ProcessingConfig::from_vars(&vars, &mut errors),
            alerts: AlertConfig::from_vars(&vars, &mut errors),
            metrics: MetricsConfig::from_vars(&vars, &mut errors),
            load_errors: errors,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Check every setting and report all problems at once.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut errors = self.load_errors.clone();

        if !ENVIRONMENTS.contains(&self.environment.as_str()) {
            errors.push(format!("invalid ENVIRONMENT: {}", self.environment));
        }
        if self.processing.pool_size == 0 {
            errors.push("PROCESS_POOL_SIZE must be greater than 0".to_string());
        }
        if self.processing.alert_queue_capacity == 0 {
            errors.push("ALERT_QUEUE_CAPACITY must be greater than 0".to_string());
        }
        for kind in StreamKind::ALL {
            if self.streams.get(kind).queue_capacity == 0 {
                errors.push(format!(
                    "{}_QUEUE_CAPACITY must be greater than 0",
                    kind.as_str().to_uppercase()
                ));
            }
        }
        let threshold = self.alerts.critical_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(format!("CRITICAL_THRESHOLD must be within 0.0..=1.0, got {threshold}"));
        }
        match self.alert_channel() {
            Ok(AlertChannel::Webhook) if self.alerts.webhook.url.is_none() => {
                errors.push("WEBHOOK_URL is required when ALERT_CHANNEL=webhook".to_string());
            }
            Ok(AlertChannel::Email) if self.alerts.email.to.is_empty() => {
                errors.push("ALERT_EMAIL_TO is required when ALERT_CHANNEL=email".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
        if self.metrics.enabled && self.metrics.interval_secs == 0 {
            errors.push("METRICS_INTERVAL must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidConfig(errors))
        }
    }

    /// Parse the configured alert channel.
    pub fn alert_channel(&self) -> Result<AlertChannel, CoreError> {
        self.alerts.channel.parse()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}, environment: {}):", self.profile_label(), self.environment);
        for kind in StreamKind::ALL {
            let s = self.streams.get(kind);
            tracing::info!(
                "  {:<12} source={}, queue={}, pacing={}ms",
                kind.as_str(),
                s.source,
                s.queue_capacity,
                s.pacing.as_millis()
            );
        }
        tracing::info!("  processing:  pool_size={}, alert_queue={}", self.processing.pool_size, self.processing.alert_queue_capacity);
        tracing::info!("  alerts:      channel={}, critical_threshold={}", self.alerts.channel, self.alerts.critical_threshold);
        tracing::info!("  metrics:     enabled={}, interval={}s", self.metrics.enabled, self.metrics.interval_secs);
    }
}

// ── Streams ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Source label (address of the upstream feed).
    pub source: String,
    /// Maximum number of normalized records buffered between ingestion and analysis.
    pub queue_capacity: usize,
    /// Pause after each successful push.
    pub pacing: Duration,
}

impl StreamConfig {
    pub fn new(source: impl Into<String>, queue_capacity: usize, pacing: Duration) -> Self {
        Self {
            source: source.into(),
            queue_capacity,
            pacing,
        }
    }

    fn from_vars(kind: StreamKind, vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        let prefix = kind.as_str().to_uppercase();
        let default_pacing_ms = match kind {
            StreamKind::Genetic => 100,
            StreamKind::Biochemical => 200,
            StreamKind::Physical => 300,
        };
        Self {
            source: vars.or(&format!("{prefix}_SOURCE"), &format!("stream/{}", kind.as_str())),
            queue_capacity: vars.parsed(&format!("{prefix}_QUEUE_CAPACITY"), 64, errors),
            pacing: Duration::from_millis(vars.parsed(
                &format!("{prefix}_PACING_MS"),
                default_pacing_ms,
                errors,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    pub genetic: StreamConfig,
    pub biochemical: StreamConfig,
    pub physical: StreamConfig,
}

impl StreamsConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            genetic: StreamConfig::from_vars(StreamKind::Genetic, vars, errors),
            biochemical: StreamConfig::from_vars(StreamKind::Biochemical, vars, errors),
            physical: StreamConfig::from_vars(StreamKind::Physical, vars, errors),
        }
    }

    pub fn get(&self, kind: StreamKind) -> &StreamConfig {
        match kind {
            StreamKind::Genetic => &self.genetic,
            StreamKind::Biochemical => &self.biochemical,
            StreamKind::Physical => &self.physical,
        }
    }

    pub fn get_mut(&mut self, kind: StreamKind) -> &mut StreamConfig {
        match kind {
            StreamKind::Genetic => &mut self.genetic,
            StreamKind::Biochemical => &mut self.biochemical,
            StreamKind::Physical => &mut self.physical,
        }
    }
}

// ── Processing ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of parallel analysis workers shared by all streams.
    pub pool_size: usize,
    /// Capacity of the alert hand-off queue.
    pub alert_queue_capacity: usize,
}

impl ProcessingConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            pool_size: vars.parsed("PROCESS_POOL_SIZE", 2, errors),
            alert_queue_capacity: vars.parsed("ALERT_QUEUE_CAPACITY", 256, errors),
        }
    }
}

// ── Alerts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// "log", "email", "webhook"
    pub channel: String,
    /// Genetic confidence above which a result is critical.
    pub critical_threshold: f64,
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
}

impl AlertConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            channel: vars.or("ALERT_CHANNEL", "log"),
            critical_threshold: vars.parsed("CRITICAL_THRESHOLD", 0.9, errors),
            email: EmailConfig::from_vars(vars, errors),
            webhook: WebhookConfig::from_vars(vars, errors),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub tls: bool,
    pub from: String,
    pub to: Vec<String>,
    /// Minijinja subject template; the built-in one when unset.
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
}

impl EmailConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            smtp_host: vars.or("SMTP_HOST", "localhost"),
            smtp_port: vars.parsed("SMTP_PORT", 25, errors),
            tls: vars.flag("SMTP_TLS", false),
            from: vars.or("ALERT_EMAIL_FROM", "alerts@umbrella.local"),
            to: vars
                .or("ALERT_EMAIL_TO", "oncall@umbrella.local")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            subject_template: vars.opt("ALERT_EMAIL_SUBJECT"),
            body_template: vars.opt("ALERT_EMAIL_BODY"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub method: Option<String>,
    /// Extra request headers. Values may reference `${VAR}`.
    pub headers: BTreeMap<String, String>,
    /// Minijinja request body; the alert as JSON when unset.
    pub body_template: Option<String>,
}

impl WebhookConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            url: vars.opt("WEBHOOK_URL"),
            method: vars.opt("WEBHOOK_METHOD"),
            headers: vars
                .opt("WEBHOOK_HEADERS")
                .map(|raw| parse_headers(&raw, errors))
                .unwrap_or_default(),
            body_template: vars.opt("WEBHOOK_BODY_TEMPLATE"),
        }
    }
}

/// `Name: value` pairs separated by commas.
fn parse_headers(raw: &str, errors: &mut Vec<String>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => errors.push(format!("WEBHOOK_HEADERS entry is not `Name: value`: {entry}")),
        }
    }
    headers
}

// ── Metrics ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Seconds between periodic summary logs.
    pub interval_secs: u64,
}

impl MetricsConfig {
    fn from_vars(vars: &Vars<'_>, errors: &mut Vec<String>) -> Self {
        Self {
            enabled: vars.flag("METRICS_ENABLED", true),
            interval_secs: vars.parsed("METRICS_INTERVAL", 10, errors),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(profile: &str, vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(profile, &move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.profile_label(), "default");
        assert_eq!(config.processing.pool_size, 2);
        assert_eq!(config.alerts.critical_threshold, 0.9);
        assert_eq!(config.alert_channel().unwrap(), AlertChannel::Log);
        assert_eq!(config.streams.genetic.pacing, Duration::from_millis(100));
        assert_eq!(config.streams.biochemical.pacing, Duration::from_millis(200));
        assert_eq!(config.streams.physical.pacing, Duration::from_millis(300));
        assert_eq!(config.streams.physical.source, "stream/physical");
    }

    #[test]
    fn profile_prefixed_keys_win() {
        let config = config_with(
            "prod",
            &[("PROCESS_POOL_SIZE", "2"), ("PROD_PROCESS_POOL_SIZE", "8")],
        );
        assert_eq!(config.profile, "PROD");
        assert_eq!(config.processing.pool_size, 8);
    }

    #[test]
    fn falls_back_to_unprefixed_key() {
        let config = config_with("prod", &[("GENETIC_QUEUE_CAPACITY", "5")]);
        assert_eq!(config.streams.genetic.queue_capacity, 5);
    }

    #[test]
    fn unsupported_channel_fails_validation() {
        let config = config_with("", &[("ALERT_CHANNEL", "sms")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported alert channel: sms"), "got: {err}");
    }

    #[test]
    fn validation_collects_all_errors() {
        let config = config_with(
            "",
            &[
                ("ENVIRONMENT", "qa"),
                ("PROCESS_POOL_SIZE", "0"),
                ("CRITICAL_THRESHOLD", "1.5"),
                ("PHYSICAL_QUEUE_CAPACITY", "0"),
            ],
        );
        match config.validate().unwrap_err() {
            CoreError::InvalidConfig(errors) => {
                assert_eq!(errors.len(), 4, "got: {errors:?}");
            }
            other => panic!("expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    fn unparseable_number_is_reported() {
        let config = config_with("", &[("PROCESS_POOL_SIZE", "lots")]);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("PROCESS_POOL_SIZE has an invalid value: lots"), "got: {err}");
    }

    #[test]
    fn webhook_channel_requires_url() {
        let config = config_with("", &[("ALERT_CHANNEL", "webhook")]);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("WEBHOOK_URL"), "got: {err}");

        let config = config_with(
            "",
            &[("ALERT_CHANNEL", "webhook"), ("WEBHOOK_URL", "https://hooks.example.com/a")],
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn email_recipients_split_on_commas() {
        let config = config_with("", &[("ALERT_EMAIL_TO", "a@example.com, b@example.com,")]);
        assert_eq!(config.alerts.email.to, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn webhook_headers_and_templates() {
        let config = config_with(
            "",
            &[
                ("WEBHOOK_HEADERS", "X-Api-Key: ${HOOK_TOKEN}, Authorization: Bearer abc"),
                ("WEBHOOK_BODY_TEMPLATE", "{{ alert.message }}"),
                ("ALERT_EMAIL_SUBJECT", "{{ alert.sample_id }}"),
            ],
        );
        let webhook = &config.alerts.webhook;
        assert_eq!(webhook.headers["X-Api-Key"], "${HOOK_TOKEN}");
        assert_eq!(webhook.headers["Authorization"], "Bearer abc");
        assert_eq!(webhook.body_template.as_deref(), Some("{{ alert.message }}"));
        assert_eq!(config.alerts.email.subject_template.as_deref(), Some("{{ alert.sample_id }}"));
        assert!(config.alerts.email.body_template.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_webhook_header_is_reported() {
        let config = config_with("", &[("WEBHOOK_HEADERS", "X-Ok: 1, broken")]);
        assert_eq!(config.alerts.webhook.headers.len(), 1);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("WEBHOOK_HEADERS entry"), "got: {err}");
    }

    #[test]
    fn metrics_flag_parsing() {
        let config = config_with("", &[("METRICS_ENABLED", "false")]);
        assert!(!config.metrics.enabled);
        let config = config_with("", &[("METRICS_ENABLED", "TRUE")]);
        assert!(config.metrics.enabled);
    }
}
