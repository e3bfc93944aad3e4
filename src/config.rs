//! Gateway configuration.
//!
//! Loaded with figment: compiled defaults, then a TOML file or string, then
//! `SMPP_DISPATCH_*` environment variables. Every section can be omitted and
//! unknown keys are rejected.

#![allow(clippy::result_large_err)] // figment::Error is external and large

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreOptions;

/// Error type for configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration load failed: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Session key used for report records.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Channel stamped on every inbound token.
    #[serde(default = "default_in_queue_channel")]
    pub in_queue_channel: String,

    /// Outbound message types this gateway leases. Empty leases every type.
    #[serde(default)]
    pub out_queue_message_types: Vec<String>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub reports: ReportConfig,

    #[serde(default)]
    pub inbound: InboundConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            in_queue_channel: default_in_queue_channel(),
            out_queue_message_types: Vec::new(),
            session: SessionConfig::default(),
            endpoints: Vec::new(),
            dispatch: DispatchConfig::default(),
            reports: ReportConfig::default(),
            inbound: InboundConfig::default(),
            health: HealthConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

fn default_session_name() -> String {
    "smsc".to_string()
}

fn default_in_queue_channel() -> String {
    "SMS".to_string()
}

/// Credentials and timers handed to the session implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub system_type: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_sms_timeout_ms: u64,
    #[serde(default = "default_enquire_link_timeout_ms")]
    pub enquire_link_timeout_ms: u64,
    /// How long a submit waits for its response.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            system_type: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            reconnect_sms_timeout_ms: default_reconnect_timeout_ms(),
            enquire_link_timeout_ms: default_enquire_link_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn enquire_link_timeout(&self) -> Duration {
        Duration::from_millis(self.enquire_link_timeout_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_timeout_ms() -> u64 {
    5_000
}

fn default_enquire_link_timeout_ms() -> u64 {
    60_000
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

/// One SMSC endpoint and the status field it reports under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// `host:port` as the session reports it.
    pub address: String,
    pub field_name: String,
}

/// Outbound drain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_interval_ms")]
    pub interval_ms: u64,
    /// Tokens leased per drain cycle at most.
    #[serde(default = "default_messages_per_cycle")]
    pub messages_per_cycle: usize,
    /// Drain cycles running at once at most.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Hand the whole payload to the session as one unit.
    #[serde(default)]
    pub long_sms: bool,
    /// Encode default-alphabet text as GSM 03.38 rather than plain ASCII.
    #[serde(default = "default_true")]
    pub use_gsm_encoding: bool,
    #[serde(default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_dispatch_interval_ms(),
            messages_per_cycle: default_messages_per_cycle(),
            max_workers: default_max_workers(),
            long_sms: false,
            use_gsm_encoding: true,
            lease_timeout_ms: default_lease_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

fn default_dispatch_interval_ms() -> u64 {
    1_000
}

fn default_messages_per_cycle() -> usize {
    100
}

fn default_max_workers() -> usize {
    10
}

fn default_lease_timeout_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}

/// Text format of delivery receipts, which depends on the SMSC vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportDialect {
    /// receipted_message_id and message_state TLVs.
    #[default]
    Standard,
    /// Colon separated body with digit-only id and status fields.
    NumericDigits,
    /// `id:... stat:...` body.
    KeyedText,
}

/// Delivery report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default)]
    pub dialect: ReportDialect,
    /// Look for `err:905` in the body of standard receipts.
    #[serde(default)]
    pub parse_body: bool,
    #[serde(default)]
    pub report_all: bool,
    /// Senders that always request a receipt.
    #[serde(default)]
    pub report_senders: Vec<String>,
    /// Receipt destinations dropped before parsing.
    #[serde(default)]
    pub ignore_destinations: Vec<String>,
    #[serde(default)]
    pub requeue_all: bool,
    #[serde(default)]
    pub requeue_destinations: Vec<String>,
    /// Channels whose requeued reports are routed to the original sender.
    #[serde(default = "default_sender_lookup_channels")]
    pub sender_lookup_channels: Vec<String>,
    /// Channels whose requeued reports get a `BULK_` message type.
    #[serde(default = "default_bulk_channels")]
    pub bulk_channels: Vec<String>,
    #[serde(default = "default_resolve_attempts")]
    pub resolve_attempts: u32,
    #[serde(default = "default_resolve_pause_ms")]
    pub resolve_pause_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dialect: ReportDialect::default(),
            parse_body: false,
            report_all: false,
            report_senders: Vec::new(),
            ignore_destinations: Vec::new(),
            requeue_all: false,
            requeue_destinations: Vec::new(),
            sender_lookup_channels: default_sender_lookup_channels(),
            bulk_channels: default_bulk_channels(),
            resolve_attempts: default_resolve_attempts(),
            resolve_pause_ms: default_resolve_pause_ms(),
        }
    }
}

impl ReportConfig {
    /// Whether submits from `from_number` ask for a delivery receipt.
    pub fn wants_report(&self, from_number: &str) -> bool {
        self.report_all || contains(&self.report_senders, from_number)
    }

    /// Whether a resolved receipt for `destination` is republished inbound.
    pub fn wants_requeue(&self, destination: &str) -> bool {
        self.requeue_all || contains(&self.requeue_destinations, destination)
    }

    pub fn resolve_pause(&self) -> Duration {
        Duration::from_millis(self.resolve_pause_ms)
    }
}

fn default_sender_lookup_channels() -> Vec<String> {
    vec!["GMS-SMS".to_string()]
}

fn default_bulk_channels() -> Vec<String> {
    vec!["SMS-ATL-BULK".to_string(), "SMS-ATAT-BULK".to_string()]
}

fn default_resolve_attempts() -> u32 {
    5
}

fn default_resolve_pause_ms() -> u64 {
    100
}

/// Inbound routing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundConfig {
    /// Prepended to the destination number to form the message type.
    #[serde(default)]
    pub message_type_prefix: String,
    /// Destinations whose text is stored untransliterated.
    #[serde(default)]
    pub no_transliterate: Vec<String>,
    /// Destinations that get their data coding encoded into the routed number.
    #[serde(default)]
    pub tag_coding_scheme: Vec<String>,
    /// Routed numbers that are logged but never enqueued.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Routed number to service tag.
    #[serde(default)]
    pub affiliates: BTreeMap<String, String>,
}

/// Connection health sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_health_interval_ms() -> u64 {
    60_000
}

/// Where the SQLite databases live. No directory means in-memory databases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl From<&GatewayConfig> for StoreOptions {
    fn from(config: &GatewayConfig) -> Self {
        StoreOptions {
            message_types: config.out_queue_message_types.clone(),
            lease_timeout: config.dispatch.lease_timeout(),
        }
    }
}

pub(crate) fn contains(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item == value)
}

impl GatewayConfig {
    /// Check constraints serde cannot express. Reports every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.dispatch.messages_per_cycle == 0 {
            errors.push("dispatch.messages_per_cycle must be greater than zero".to_string());
        }
        if self.dispatch.max_workers == 0 {
            errors.push("dispatch.max_workers must be greater than zero".to_string());
        }
        if self.dispatch.interval_ms == 0 {
            errors.push("dispatch.interval_ms must be greater than zero".to_string());
        }
        if self.health.interval_ms == 0 {
            errors.push("health.interval_ms must be greater than zero".to_string());
        }
        if self.reports.resolve_attempts == 0 {
            errors.push("reports.resolve_attempts must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.field_name.as_str()) {
                errors.push(format!(
                    "endpoints: field_name `{}` is used more than once",
                    endpoint.field_name
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Load from a TOML file with `SMPP_DISPATCH_*` overrides, then validate.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = Figment::new()
        .merge(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Load from a TOML string only, then validate.
pub fn load_config_from_str(toml_content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = Figment::new()
        .merge(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Maps `SMPP_DISPATCH_DISPATCH_MAX_WORKERS` to `dispatch.max_workers`.
///
/// Section names are matched explicitly since keys contain underscores.
fn env_provider() -> Env {
    const SECTIONS: [&str; 6] = ["session", "dispatch", "reports", "inbound", "health", "store"];
    Env::prefixed("SMPP_DISPATCH_").map(|key| {
        let key = key.as_str();
        if key == "session_name" {
            return key.to_string().into();
        }
        for section in SECTIONS {
            if let Some(rest) = key.strip_prefix(section).and_then(|k| k.strip_prefix('_')) {
                return format!("{section}.{rest}").into();
            }
        }
        key.to_string().into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_name, "smsc");
        assert_eq!(config.dispatch.max_workers, 10);
        assert_eq!(config.reports.resolve_attempts, 5);
        assert_eq!(config.reports.sender_lookup_channels, vec!["GMS-SMS"]);
        assert_eq!(config.session.response_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = load_config_from_str(
            r#"
            session_name = "smsc-a"

            [[endpoints]]
            address = "10.0.0.5:2775"
            field_name = "smsc_a_1"

            [dispatch]
            max_workers = 2
            long_sms = true

            [reports]
            dialect = "keyed-text"
            report_senders = ["7000"]

            [inbound.affiliates]
            "5555" = "weather"
            "#,
        )
        .unwrap();

        assert_eq!(config.session_name, "smsc-a");
        assert_eq!(config.endpoints[0].field_name, "smsc_a_1");
        assert_eq!(config.dispatch.max_workers, 2);
        assert!(config.dispatch.long_sms);
        assert_eq!(config.dispatch.messages_per_cycle, 100);
        assert_eq!(config.reports.dialect, ReportDialect::KeyedText);
        assert!(config.reports.wants_report("7000"));
        assert!(!config.reports.wants_report("7001"));
        assert_eq!(config.inbound.affiliates.get("5555").map(String::as_str), Some("weather"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str("[dispatch]\nmax_wrokers = 3\n");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn zero_capacity_and_duplicate_fields_fail_validation() {
        let mut config = GatewayConfig::default();
        config.dispatch.max_workers = 0;
        config.endpoints = vec![
            EndpointConfig {
                address: "a:1".into(),
                field_name: "f".into(),
            },
            EndpointConfig {
                address: "b:1".into(),
                field_name: "f".into(),
            },
        ];

        let Err(ConfigError::Validation(message)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(message.contains("max_workers"));
        assert!(message.contains("`f`"));
    }

    #[test]
    fn requeue_requires_flag_or_listing() {
        let mut reports = ReportConfig::default();
        assert!(!reports.wants_requeue("100"));
        reports.requeue_destinations = vec!["100".into()];
        assert!(reports.wants_requeue("100"));
        reports.requeue_all = true;
        assert!(reports.wants_requeue("200"));
    }

    #[test]
    fn store_options_follow_dispatch_settings() {
        let mut config = GatewayConfig::default();
        config.out_queue_message_types = vec!["SMS".into()];
        config.dispatch.lease_timeout_ms = 1_500;
        let options = StoreOptions::from(&config);
        assert_eq!(options.message_types, vec!["SMS"]);
        assert_eq!(options.lease_timeout, Duration::from_millis(1_500));
    }
}
