use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Server configuration, read from the environment (and `.env` via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL. When unset the in-memory credential store is used.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    /// Origin allowed to call the API with credentials (cookies).
    pub cors_origin: String,
    pub session: SessionSettings,
}

/// Everything the token issuer and the auth handlers need.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub reset_ttl: chrono::Duration,
    /// Cookies carry the `Secure` attribute outside local development.
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session: SessionSettings::from_env()?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

impl SessionSettings {
    pub fn from_env() -> Result<Self, AppError> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let settings = Self {
            access_secret: required_var("JWT_ACCESS_SECRET")?,
            refresh_secret: required_var("JWT_REFRESH_SECRET")?,
            access_ttl: chrono::Duration::minutes(parse_var("ACCESS_TOKEN_TTL_MINUTES", 15)?),
            refresh_ttl: chrono::Duration::days(parse_var("REFRESH_TOKEN_TTL_DAYS", 7)?),
            reset_ttl: chrono::Duration::minutes(parse_var("RESET_TOKEN_TTL_MINUTES", 60)?),
            secure_cookies: app_env != "development",
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Access and refresh tokens must be signed with different keys, otherwise
    /// one could be presented in place of the other.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.access_secret == self.refresh_secret {
            return Err(AppError::InternalServerError(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".into(),
            ));
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(AppError::InternalServerError(
                "access token lifetime must be shorter than refresh token lifetime".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for `client::SessionClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, e.g. `http://127.0.0.1:8080/api`.
    pub base_url: String,
    /// Upper bound on a single refresh call; a hung refresh would otherwise
    /// block every queued request.
    pub refresh_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            refresh_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

fn required_var(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::InternalServerError(format!("{} must be set", name)))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::InternalServerError(format!("{} has an invalid value", name))),
        Err(_) => Ok(default),
    }
}
