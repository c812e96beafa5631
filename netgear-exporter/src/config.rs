//! Configuration for the Netgear exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::store::{is_valid_label_name, is_valid_metric_prefix};

/// Paths served by the exporter besides the metrics endpoint.
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/ready"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Modem web UI settings.
    #[serde(default)]
    pub modem: ModemConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Poll loop settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modem web UI endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    /// Base URL of the modem web UI (default: "http://192.168.100.1").
    #[serde(default = "default_url")]
    pub url: String,

    /// Login username (default: "admin").
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password (default: "password").
    #[serde(default = "default_password")]
    pub password: String,

    /// Page serving the login form and its `webToken` field.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Form action receiving the credentials.
    #[serde(default = "default_login_action")]
    pub login_action: String,

    /// Page holding the DOCSIS channel tables.
    #[serde(default = "default_status_path")]
    pub status_path: String,

    /// CSS selector for the channel table rows.
    #[serde(default = "default_table_selector")]
    pub table_selector: String,
}

fn default_url() -> String {
    "http://192.168.100.1".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_login_path() -> String {
    "/GenieLogin.asp".to_string()
}

fn default_login_action() -> String {
    "/goform/GenieLogin".to_string()
}

fn default_status_path() -> String {
    "/DocsisStatus.asp".to_string()
}

fn default_table_selector() -> String {
    ".in-frame-table table tr".to_string()
}

impl ModemConfig {
    /// Join a modem-relative path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: default_password(),
            login_path: default_login_path(),
            login_action: default_login_action(),
            status_path: default_status_path(),
            table_selector: default_table_selector(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9090").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Metric name prefix (default: "netgear").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "netgear".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            prefix: default_prefix(),
        }
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between scrape cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Drop series of channels missing from the latest scrape.
    #[serde(default)]
    pub evict_stale_channels: bool,
}

fn default_interval() -> u64 {
    60 // 1 minute
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            evict_stale_channels: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ExporterConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be > 0".to_string(),
            ));
        }

        match reqwest::Url::parse(&self.modem.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Invalid modem URL: {}",
                    self.modem.url
                )));
            }
        }

        for (name, path) in [
            ("login_path", &self.modem.login_path),
            ("login_action", &self.modem.login_action),
            ("status_path", &self.modem.status_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "Modem {} must start with /",
                    name
                )));
            }
        }

        if scraper::Selector::parse(&self.modem.table_selector).is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid table selector: {}",
                self.modem.table_selector
            )));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.prometheus.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.prometheus.path
            )));
        }

        if !is_valid_metric_prefix(&self.prometheus.prefix) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                self.prometheus.prefix
            )));
        }

        if let Some(name) = self
            .prometheus
            .default_labels
            .keys()
            .find(|name| !is_valid_label_name(name))
        {
            return Err(ConfigError::Validation(format!(
                "Invalid label name: {}",
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = "{}";
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.modem.url, "http://192.168.100.1");
        assert_eq!(config.modem.username, "admin");
        assert_eq!(config.modem.login_path, "/GenieLogin.asp");
        assert_eq!(config.modem.login_action, "/goform/GenieLogin");
        assert_eq!(config.modem.status_path, "/DocsisStatus.asp");
        assert_eq!(config.modem.table_selector, ".in-frame-table table tr");
        assert_eq!(config.prometheus.listen, "0.0.0.0:9090");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "netgear");
        assert_eq!(config.poll.interval_secs, 60);
        assert!(!config.poll.evict_stale_channels);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r##"{
            modem: {
                url: "http://10.0.0.1",
                username: "operator",
                password: "hunter2",
                status_path: "/status.asp",
                table_selector: "#dsTable tr"
            },
            prometheus: {
                listen: "127.0.0.1:9091",
                path: "/prometheus/metrics",
                prefix: "cm",
                default_labels: {
                    site: "home",
                }
            },
            poll: {
                interval_secs: 30,
                evict_stale_channels: true
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"##;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.modem.url, "http://10.0.0.1");
        assert_eq!(config.modem.username, "operator");
        assert_eq!(config.modem.password, "hunter2");
        assert_eq!(config.modem.login_path, "/GenieLogin.asp");
        assert_eq!(config.modem.status_path, "/status.asp");
        assert_eq!(config.modem.table_selector, "#dsTable tr");
        assert_eq!(config.prometheus.listen, "127.0.0.1:9091");
        assert_eq!(config.prometheus.prefix, "cm");
        assert_eq!(
            config.prometheus.default_labels.get("site"),
            Some(&"home".to_string())
        );
        assert_eq!(config.poll.interval_secs, 30);
        assert!(config.poll.evict_stale_channels);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let mut modem = ModemConfig::default();
        assert_eq!(
            modem.endpoint("/DocsisStatus.asp"),
            "http://192.168.100.1/DocsisStatus.asp"
        );

        modem.url = "http://192.168.100.1/".to_string();
        assert_eq!(
            modem.endpoint("/GenieLogin.asp"),
            "http://192.168.100.1/GenieLogin.asp"
        );
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            poll: { interval_secs: 0 }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_modem_url() {
        let result = ExporterConfig::parse(r#"{ modem: { url: "192.168.100.1" } }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid modem URL"));

        let result = ExporterConfig::parse(r#"{ modem: { url: "ftp://192.168.100.1" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_modem_paths() {
        let result = ExporterConfig::parse(r#"{ modem: { status_path: "DocsisStatus.asp" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("status_path must start with /")
        );
    }

    #[test]
    fn test_validate_table_selector() {
        let result = ExporterConfig::parse(r#"{ modem: { table_selector: "tr[[" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid table selector")
        );
    }

    #[test]
    fn test_validate_reserved_metrics_path() {
        for path in RESERVED_PATHS {
            let json = format!("{{ prometheus: {{ path: \"{}\" }} }}", path);
            let result = ExporterConfig::parse(&json);
            assert!(
                result.unwrap_err().to_string().contains("is reserved"),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_validate_prefix_and_labels() {
        let result = ExporterConfig::parse(r#"{ prometheus: { prefix: "net-gear" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid metric prefix")
        );

        let result =
            ExporterConfig::parse(r#"{ prometheus: { default_labels: { "data-center": "x" } } }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid label name"));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ modem: {{ password: 'secret' }} }}").unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.modem.password, "secret");
        assert_eq!(config.modem.username, "admin");
    }
}
