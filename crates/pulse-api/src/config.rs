//! API configuration.

use std::time::Duration;

use pulse_models::gift::DEFAULT_GIFT_FEE_BPS;
use pulse_models::search::DEFAULT_MIN_SCORE;
use thiserror::Error;

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// HS256 signing secret for bearer tokens
    pub jwt_secret: String,
    /// Expected `iss` claim, if any
    pub jwt_issuer: Option<String>,
    /// Shared secret for payment webhook signatures
    pub payment_webhook_secret: String,
    /// Platform cut of gift sends, in basis points
    pub gift_platform_fee_bps: u32,
    pub story_ttl_hours: i64,
    pub subscription_renewal_interval: Duration,
    pub enable_subscription_renewal: bool,
    /// Rows loaded per entity kind for a search
    pub search_candidate_limit: u32,
    pub search_min_score: f64,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MiB
            environment: "development".to_string(),
            jwt_secret: String::new(),
            jwt_issuer: None,
            payment_webhook_secret: String::new(),
            gift_platform_fee_bps: DEFAULT_GIFT_FEE_BPS,
            story_ttl_hours: 24,
            subscription_renewal_interval: Duration::from_secs(60),
            enable_subscription_renewal: true,
            search_candidate_limit: 500,
            search_min_score: DEFAULT_MIN_SCORE,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", 30)),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: std::env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty()),
            payment_webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
            gift_platform_fee_bps: env_parse("GIFT_PLATFORM_FEE_BPS", defaults.gift_platform_fee_bps),
            story_ttl_hours: env_parse("STORY_TTL_HOURS", defaults.story_ttl_hours),
            subscription_renewal_interval: Duration::from_secs(env_parse(
                "SUBSCRIPTION_RENEWAL_INTERVAL_SECS",
                60,
            )),
            enable_subscription_renewal: env_flag("ENABLE_SUBSCRIPTION_RENEWAL", true),
            search_candidate_limit: env_parse("SEARCH_CANDIDATE_LIMIT", defaults.search_candidate_limit),
            search_min_score: env_parse("SEARCH_MIN_SCORE", defaults.search_min_score),
            metrics_enabled: env_flag("METRICS_ENABLED", true),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gift_platform_fee_bps >= 10_000 {
            return Err(ConfigError::Invalid {
                name: "GIFT_PLATFORM_FEE_BPS",
                reason: "must be below 10000".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.search_min_score) {
            return Err(ConfigError::Invalid {
                name: "SEARCH_MIN_SCORE",
                reason: "must be within 0..=1".to_string(),
            });
        }
        if self.story_ttl_hours < 1 {
            return Err(ConfigError::Invalid {
                name: "STORY_TTL_HOURS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
