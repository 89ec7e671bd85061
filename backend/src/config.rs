use std::env;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} environment variable is required", key),
            ConfigError::Invalid(key, value) => write!(f, "Invalid value for {}: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub token_ttl_hours: i64,
    pub max_payload_bytes: usize,
}

impl AppConfig {
    pub fn from_env(project_root: PathBuf) -> Result<Self, ConfigError> {
        Self::from_lookup(project_root, |key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't touch process env.
    pub fn from_lookup<F>(project_root: PathBuf, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root.join("uploads"));

        let token_ttl_hours = match lookup("TOKEN_TTL_HOURS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(hours) if hours > 0 => hours,
                _ => return Err(ConfigError::Invalid("TOKEN_TTL_HOURS", raw)),
            },
            None => 24,
        };

        let max_payload_bytes = match lookup("MAX_PAYLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid("MAX_PAYLOAD_BYTES", raw))?,
            None => 10 * 1024 * 1024,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            upload_dir,
            token_ttl_hours,
            max_payload_bytes,
        })
    }

    pub fn logo_dir(&self) -> PathBuf {
        self.upload_dir.join("logos")
    }
}
