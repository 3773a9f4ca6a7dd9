use std::time::Duration;

use crate::error::ClientError;
use crate::identity::DEFAULT_REFRESH_MARGIN;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API including the `/api` prefix.
    pub api_base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Seconds between mark resets in `airdrop-daily` (default: one day).
    pub reset_interval_secs: u64,
    /// Seconds before token expiry at which the session logs in again.
    pub token_refresh_margin_secs: u64,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `API_BASE_URL`               | `http://localhost:3000/api`  |
    /// | `API_USERNAME`               | --                           |
    /// | `API_PASSWORD`               | --                           |
    /// | `RESET_INTERVAL_SECS`        | `86400`                      |
    /// | `TOKEN_REFRESH_MARGIN_SECS`  | `600`                        |
    pub fn from_env() -> Result<Self, ClientError> {
        let api_base_url =
            std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000/api".into());

        let reset_interval_secs = parse_var("RESET_INTERVAL_SECS", 86_400)?;
        if reset_interval_secs == 0 {
            return Err(ClientError::Config(
                "RESET_INTERVAL_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            api_base_url,
            username: std::env::var("API_USERNAME").ok().filter(|s| !s.is_empty()),
            password: std::env::var("API_PASSWORD").ok().filter(|s| !s.is_empty()),
            reset_interval_secs,
            token_refresh_margin_secs: parse_var(
                "TOKEN_REFRESH_MARGIN_SECS",
                DEFAULT_REFRESH_MARGIN.as_secs(),
            )?,
        })
    }

    /// Username and password, both required for a password session.
    pub fn credentials(&self) -> Result<(&str, &str), ClientError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Ok((user, pass)),
            _ => Err(ClientError::Config(
                "API_USERNAME and API_PASSWORD must be set".into(),
            )),
        }
    }

    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64, ClientError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ClientError::Config(format!("{name} must be a valid u64"))),
        Err(_) => Ok(default),
    }
}
