//! Application configuration management.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Tax authority web services configuration.
    #[serde(default)]
    pub afip: AfipConfig,
    /// Key material configuration.
    pub security: SecurityConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key used to encrypt private keys at rest.
    pub key_encryption_key: String,
}

/// Which of the authority's environments a credential talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AfipEnvironment {
    /// Homologation (testing) environment.
    #[default]
    Sandbox,
    /// Production environment, vouchers are legally binding.
    Production,
}

impl AfipEnvironment {
    /// Returns the string representation of the environment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    /// Parses an environment from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sandbox" | "homologation" | "testing" => Some(Self::Sandbox),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    /// Default login (WSAA) endpoint for this environment.
    #[must_use]
    pub const fn default_wsaa_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://wsaahomo.afip.gov.ar/ws/services/LoginCms",
            Self::Production => "https://wsaa.afip.gov.ar/ws/services/LoginCms",
        }
    }

    /// Default electronic invoicing (WSFE) endpoint for this environment.
    #[must_use]
    pub const fn default_wsfe_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://wswhomo.afip.gov.ar/wsfev1/service.asmx",
            Self::Production => "https://servicios1.afip.gov.ar/wsfev1/service.asmx",
        }
    }
}

impl std::fmt::Display for AfipEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tax authority web services configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AfipConfig {
    /// Environment used when a credential does not say otherwise.
    #[serde(default)]
    pub environment: AfipEnvironment,
    /// Overrides the login endpoint derived from the environment.
    #[serde(default)]
    pub wsaa_url: Option<String>,
    /// Overrides the invoicing endpoint derived from the environment.
    #[serde(default)]
    pub wsfe_url: Option<String>,
    /// Service name requested in the login ticket.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Timeout for each remote call in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Validity window of a login ticket request in seconds.
    #[serde(default = "default_login_ticket_ttl")]
    pub login_ticket_ttl_secs: u64,
    /// A cached session closer than this to expiry is refreshed.
    #[serde(default = "default_session_safety_margin")]
    pub session_safety_margin_secs: u64,
    /// Backoff applied when the authority reports a session is already active.
    #[serde(default)]
    pub session_retry: SessionRetryConfig,
    /// Days before certificate expiry at which it is reported as expiring.
    #[serde(default = "default_certificate_warning_days")]
    pub certificate_warning_days: i64,
}

fn default_service_name() -> String {
    "wsfe".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_login_ticket_ttl() -> u64 {
    600 // 10 minutes
}

fn default_session_safety_margin() -> u64 {
    300 // 5 minutes
}

fn default_certificate_warning_days() -> i64 {
    30
}

impl Default for AfipConfig {
    fn default() -> Self {
        Self {
            environment: AfipEnvironment::default(),
            wsaa_url: None,
            wsfe_url: None,
            service_name: default_service_name(),
            request_timeout_secs: default_request_timeout(),
            login_ticket_ttl_secs: default_login_ticket_ttl(),
            session_safety_margin_secs: default_session_safety_margin(),
            session_retry: SessionRetryConfig::default(),
            certificate_warning_days: default_certificate_warning_days(),
        }
    }
}

impl AfipConfig {
    /// Login endpoint for the given environment, honoring the override.
    #[must_use]
    pub fn wsaa_url_for(&self, environment: AfipEnvironment) -> String {
        self.wsaa_url
            .clone()
            .unwrap_or_else(|| environment.default_wsaa_url().to_string())
    }

    /// Invoicing endpoint for the given environment, honoring the override.
    #[must_use]
    pub fn wsfe_url_for(&self, environment: AfipEnvironment) -> String {
        self.wsfe_url
            .clone()
            .unwrap_or_else(|| environment.default_wsfe_url().to_string())
    }

    /// Remote call timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backoff policy for "session already active" rejections.
///
/// The authority keeps one session per company for roughly twelve hours, so
/// the first delay defaults to that window and grows on repeated rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionRetryConfig {
    /// Delay after the first rejection, in seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Upper bound for the delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Factor applied per consecutive rejection.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

fn default_initial_delay() -> u64 {
    43_200 // 12 hours
}

fn default_max_delay() -> u64 {
    86_400 // 24 hours
}

fn default_multiplier() -> u32 {
    2
}

impl Default for SessionRetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl SessionRetryConfig {
    /// Delay to wait after the `attempt`-th consecutive rejection (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exponent);
        let secs = self
            .initial_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs.max(self.initial_delay_secs));
        Duration::from_secs(secs)
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("FACTURO").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
