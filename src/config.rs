use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use reqwest::Url;
use thiserror::Error;

/// Service configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Base URL of the settlement partner's API.
    pub bank_api_url: Url,
    /// Base URL of the partner's approval pages. Defaults to the API URL.
    pub bank_frontend_url: Url,
    pub frontend_url: String,
    /// When unset, webhooks are accepted without a secret.
    pub bank_webhook_secret: Option<String>,
    pub settlement_timeout: Duration,
    pub session_ttl: chrono::Duration,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bank_api_url = parse_url(
            "BANK_API_URL",
            value("BANK_API_URL").as_deref().unwrap_or("http://localhost:8081"),
        )?;
        let bank_frontend_url = match value("BANK_FRONTEND_URL") {
            Some(url) => parse_url("BANK_FRONTEND_URL", &url)?,
            None => bank_api_url.clone(),
        };
        let session_ttl_secs: i64 = parse("SESSION_TTL_SECS", value("SESSION_TTL_SECS"), 604_800)?;
        let session_ttl = chrono::Duration::try_seconds(session_ttl_secs)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .ok_or_else(|| invalid("SESSION_TTL_SECS", "must be a positive number of seconds"))?;
        let settlement_timeout_secs: u64 =
            parse("SETTLEMENT_TIMEOUT_SECS", value("SETTLEMENT_TIMEOUT_SECS"), 10)?;
        if settlement_timeout_secs == 0 {
            return Err(invalid("SETTLEMENT_TIMEOUT_SECS", "must be at least one second"));
        }

        Ok(Self {
            listen_addr: parse(
                "LISTEN_ADDR",
                value("LISTEN_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 4000)),
            )?,
            bank_api_url,
            bank_frontend_url,
            frontend_url: value("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            bank_webhook_secret: value("BANK_WEBHOOK_SECRET"),
            settlement_timeout: Duration::from_secs(settlement_timeout_secs),
            session_ttl,
        })
    }
}

fn parse<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| invalid(name, err)),
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|err| invalid(name, err))
}

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
