use std::{
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};

/// Longest accepted rate-limit window, one day.
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub redis_url: Option<String>,
    pub max_requests: u32,
    pub window: Duration,
    pub prefix: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub mongo_uri: String,
    pub mongo_db: String,
    pub rate_limit: RateLimitConfig,
    pub trust_proxy: bool,
    pub mode: Mode,
    pub cors_origin: String,
    pub frontend_dist: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, falling back to
    /// `/run/secrets/<KEY>` for secrets.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let window_secs: u64 = try_load(&lookup, "RATE_LIMIT_WINDOW_SECS", "60")?;
        if !(1..=MAX_WINDOW_SECS).contains(&window_secs) {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_WINDOW_SECS",
                message: format!("window must be between 1 and {MAX_WINDOW_SECS} seconds"),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", "5001")?,
            mongo_uri: read_secret(&lookup, "MONGO_URI").ok_or(ConfigError::Missing("MONGO_URI"))?,
            mongo_db: try_load(&lookup, "MONGO_DB", "notes")?,
            rate_limit: RateLimitConfig {
                redis_url: read_secret(&lookup, "RATE_LIMIT_REDIS_URL"),
                max_requests: try_load(&lookup, "RATE_LIMIT_MAX", "100")?,
                window: Duration::from_secs(window_secs),
                prefix: try_load(&lookup, "RATE_LIMIT_PREFIX", "notes:ratelimit")?,
            },
            trust_proxy: try_load(&lookup, "TRUST_PROXY", "false")?,
            mode: try_load(&lookup, "APP_ENV", "development")?,
            cors_origin: try_load(&lookup, "CORS_ORIGIN", "http://localhost:5173")?,
            frontend_dist: try_load(&lookup, "FRONTEND_DIST", "../frontend/dist")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }
}

/// Result of looking for a `.env` file next to the process.
#[derive(Debug, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Invalid(String),
}

/// Copies variables from `path` into the process environment. Variables that
/// are already set keep their value.
pub fn load_env_file(path: &Path) -> EnvFile {
    match dotenvy::from_path(path) {
        Ok(()) => EnvFile::Loaded(path.to_path_buf()),
        Err(e) if e.not_found() => EnvFile::Missing,
        Err(e) => EnvFile::Invalid(e.to_string()),
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        })
}

fn read_secret<F>(lookup: &F, secret_name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(secret_name).filter(|v| !v.trim().is_empty()) {
        return Some(value.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("{secret_name} not in environment and failed to read {path}: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
