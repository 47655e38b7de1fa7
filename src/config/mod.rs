use crate::error::{AdmissionError, Result};
use crate::rate_limit::policy::{AdminPolicy, PolicyTable};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main admission gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream API that admitted requests are forwarded to
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// Caller context configuration
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Prometheus metrics endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://localhost:3000`
    pub url: String,
}

/// Caller context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT configuration
    pub jwt: Option<JwtConfig>,
}

/// JWT decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for HS256 (if using symmetric encryption)
    pub secret: Option<String>,
    /// Public key for RS256 (if using asymmetric encryption)
    pub public_key: Option<String>,
    /// Algorithm to use (HS256 or RS256)
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    /// Issuer to validate
    pub issuer: Option<String>,
    /// Audience to validate
    pub audience: Option<String>,
    /// Claim carrying the caller's subscription plan
    #[serde(default = "default_plan_claim")]
    pub plan_claim: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-tier, per-category limits
    #[serde(default)]
    pub policies: PolicyTable,
    /// Strict policy for administrative paths
    #[serde(default)]
    pub admin: AdminPolicy,
    /// Paths that skip accounting entirely
    #[serde(default = "default_bypass_paths")]
    pub bypass_paths: Vec<String>,
    /// Records whose window ended longer ago than this are reclaimed
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Interval between reclaimer sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Refund requests whose response status is below 400
    #[serde(default)]
    pub skip_successful_requests: bool,
    /// Refund requests whose response status is 400 or above
    #[serde(default)]
    pub skip_failed_requests: bool,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Leading IPv6 bits kept when anonymizing addresses (128 keeps all)
    #[serde(default = "default_ipv6_prefix_len")]
    pub ipv6_prefix_len: u8,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path the metrics are served on
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_true() -> bool {
    true
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_plan_claim() -> String {
    "plan".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_bypass_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

fn default_stale_after() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_ipv6_prefix_len() -> u8 {
    128
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policies: PolicyTable::default(),
            admin: AdminPolicy::default(),
            bypass_paths: default_bypass_paths(),
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
            skip_successful_requests: false,
            skip_failed_requests: false,
            trust_forwarded_for: false,
            ipv6_prefix_len: default_ipv6_prefix_len(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl AdmissionConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdmissionError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(upstream) = &self.upstream {
            if !upstream.url.starts_with("http://") && !upstream.url.starts_with("https://") {
                return Err(AdmissionError::Config(format!(
                    "Upstream URL must start with http:// or https://: {}",
                    upstream.url
                )));
            }
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(AdmissionError::Config(format!(
                "Metrics path must start with '/': {}",
                self.metrics.path
            )));
        }

        self.rate_limiting.validate()
    }
}

impl RateLimitingConfig {
    /// Validate rate limiting configuration
    pub fn validate(&self) -> Result<()> {
        for (tier, category, entry) in self.policies.entries() {
            if entry.window_secs == 0 {
                return Err(AdmissionError::Config(format!(
                    "Rate limit window must be > 0 for {} / {}",
                    tier, category
                )));
            }
        }

        if self.admin.window_secs == 0 {
            return Err(AdmissionError::Config(
                "Admin rate limit window must be > 0".to_string(),
            ));
        }

        for path in self.admin.paths.iter().chain(&self.bypass_paths) {
            if !path.starts_with('/') {
                return Err(AdmissionError::Config(format!(
                    "Rate limit path must start with '/': {}",
                    path
                )));
            }
        }

        if self.stale_after_secs == 0 {
            return Err(AdmissionError::Config(
                "Reclaimer staleness horizon must be > 0".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(AdmissionError::Config(
                "Reclaimer sweep interval must be > 0".to_string(),
            ));
        }

        if self.ipv6_prefix_len > 128 {
            return Err(AdmissionError::Config(format!(
                "Invalid IPv6 prefix length {}: must be 0-128",
                self.ipv6_prefix_len
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::{PolicyEntry, Tier};

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9000
  timeout_secs: 10
  log_format: json

upstream:
  url: "http://localhost:3000"

rate_limiting:
  skip_successful_requests: true
  trust_forwarded_for: true
  policies:
    anonymous:
      generate: { limit: 2, window_secs: 600 }
      default: { limit: 10, window_secs: 60 }
  admin:
    limit: 3
    paths: ["/admin", "/internal/ops"]
"#;

        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.upstream.as_ref().unwrap().url, "http://localhost:3000");

        let rl = &config.rate_limiting;
        assert!(rl.enabled);
        assert!(rl.skip_successful_requests);
        assert!(!rl.skip_failed_requests);
        assert!(rl.trust_forwarded_for);
        assert_eq!(rl.admin.limit, 3);
        assert_eq!(rl.admin.window_secs, 60);
        assert_eq!(rl.admin.paths.len(), 2);
        assert_eq!(
            rl.policies.lookup(Tier::Anonymous, "/generate"),
            PolicyEntry::new(2, 600)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = AdmissionConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.server.log_format, LogFormat::Compact);
        assert!(config.upstream.is_none());
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.path, "/metrics");

        let rl = &config.rate_limiting;
        assert_eq!(rl.bypass_paths, vec!["/health".to_string()]);
        assert_eq!(rl.stale_after_secs, 3600);
        assert_eq!(rl.sweep_interval_secs, 300);
        assert_eq!(rl.ipv6_prefix_len, 128);
        assert_eq!(rl.admin.limit, 10);
        assert_eq!(rl.policies, PolicyTable::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_upstream() {
        let config = AdmissionConfig {
            upstream: Some(UpstreamConfig {
                url: "localhost:3000".to_string(),
            }),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_window() {
        let yaml = r#"
rate_limiting:
  policies:
    free:
      export: { limit: 10, window_secs: 0 }
"#;
        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("free / export"));
    }

    #[test]
    fn test_zero_limit_is_valid() {
        let yaml = r#"
rate_limiting:
  policies:
    anonymous:
      export: { limit: 0, window_secs: 3600 }
"#;
        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reclaimer_settings() {
        let mut config = AdmissionConfig::default();
        config.rate_limiting.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AdmissionConfig::default();
        config.rate_limiting.stale_after_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_paths_and_prefix() {
        let mut config = AdmissionConfig::default();
        config.rate_limiting.bypass_paths = vec!["health".to_string()];
        assert!(config.validate().is_err());

        let mut config = AdmissionConfig::default();
        config.rate_limiting.ipv6_prefix_len = 129;
        assert!(config.validate().is_err());

        let mut config = AdmissionConfig::default();
        config.rate_limiting.admin.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 7070").unwrap();

        let config = AdmissionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7070);

        assert!(AdmissionConfig::from_file("/nonexistent/admission.yaml").is_err());
    }
}
