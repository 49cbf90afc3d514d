use std::net::SocketAddr;

use chrono::Duration;
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_SESSION_INACTIVITY_DAYS: i64 = 30;
const DEFAULT_LIST_LIMIT: i64 = 50;
const DEFAULT_LIST_MAX_LIMIT: i64 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("invalid value for `{var}`: {reason}")]
    InvalidVar { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    /// Base64 HS256 secret shared with the identity provider.
    pub jwt_secret: SecretString,
    pub session_inactivity: Duration,
    pub list_default_limit: i64,
    pub list_max_limit: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = non_empty("SERVER_DATABASE_URL")
            .or_else(|| non_empty("DATABASE_URL"))
            .ok_or(ConfigError::MissingVar("SERVER_DATABASE_URL"))?;

        let listen_addr = non_empty("SERVER_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|error| ConfigError::InvalidVar {
                var: "SERVER_LISTEN_ADDR",
                reason: error.to_string(),
            })?;

        let jwt_secret = non_empty("TASKDESK_JWT_SECRET")
            .map(SecretString::from)
            .ok_or(ConfigError::MissingVar("TASKDESK_JWT_SECRET"))?;

        let inactivity_days = parse_positive(
            non_empty("TASKDESK_SESSION_INACTIVITY_DAYS"),
            "TASKDESK_SESSION_INACTIVITY_DAYS",
            DEFAULT_SESSION_INACTIVITY_DAYS,
        )?;
        let list_default_limit = parse_positive(
            non_empty("TASKDESK_LIST_DEFAULT_LIMIT"),
            "TASKDESK_LIST_DEFAULT_LIMIT",
            DEFAULT_LIST_LIMIT,
        )?;
        let list_max_limit = parse_positive(
            non_empty("TASKDESK_LIST_MAX_LIMIT"),
            "TASKDESK_LIST_MAX_LIMIT",
            DEFAULT_LIST_MAX_LIMIT,
        )?;

        if list_default_limit > list_max_limit {
            return Err(ConfigError::InvalidVar {
                var: "TASKDESK_LIST_DEFAULT_LIMIT",
                reason: format!("must not exceed TASKDESK_LIST_MAX_LIMIT ({list_max_limit})"),
            });
        }

        Ok(Self {
            database_url,
            listen_addr,
            jwt_secret,
            session_inactivity: Duration::days(inactivity_days),
            list_default_limit,
            list_max_limit,
        })
    }

    /// Applies the configured default and upper bound to a requested page size.
    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.list_default_limit)
            .clamp(1, self.list_max_limit)
    }
}

fn parse_positive(
    value: Option<String>,
    var: &'static str,
    default: i64,
) -> Result<i64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidVar {
            var,
            reason: format!("expected a positive integer, got `{value}`"),
        }),
    }
}
