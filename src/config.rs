use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{fetch::retry::RetryPolicy, source::Source};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Process wide settings.  Built once at startup and handed to the fetcher,
/// the run orchestrator and the web handlers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Shared secret for the authenticated endpoints.  `None` means the
    /// server can't authenticate anything.
    pub run_token: Option<String>,
    pub host: String,
    pub port: u16,
    /// Upper bound for one attempt, from connecting until the body is read.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    /// Stored files older than this are removed by the retention sweep.
    pub retention: Duration,
    pub sources: Vec<Source>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("./data"),
            run_token: None,
            host: "0.0.0.0".to_string(),
            port: 10000,
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            retention: Duration::from_secs(30 * 86_400),
            sources: Source::defaults(),
        }
    }
}

impl Settings {
    /// Read the settings from the process environment.
    pub fn from_env() -> Result<Settings, ConfigError> {
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// Build the settings from a key lookup, falling back to the defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(dir) = lookup("DATA_DIR").filter(|v| !v.trim().is_empty()) {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.run_token = lookup("RUN_TOKEN").filter(|v| !v.is_empty());
        if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            settings.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            settings.port = port;
        }
        if let Some(secs) = parse_var(&lookup, "HTTP_TIMEOUT_SECS")? {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "CONNECT_TIMEOUT_SECS")? {
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "MAX_ATTEMPTS")? {
            if n == 0 {
                return Err(ConfigError::Zero("MAX_ATTEMPTS"));
            }
            settings.retry.max_attempts = n;
        }
        if let Some(ms) = parse_var(&lookup, "RETRY_BASE_DELAY_MS")? {
            settings.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "RETRY_MAX_DELAY_MS")? {
            settings.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(days) = parse_var::<u64, _>(&lookup, "RETENTION_DAYS")? {
            let secs = days
                .checked_mul(86_400)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "RETENTION_DAYS".to_string(),
                    value: days.to_string(),
                })?;
            settings.retention = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

/// Load a dotenv file.  With an environment name, e.g. `test` or `prod`, the
/// file `.env/<name>.env` must exist.  Without one, a plain `.env` file in the
/// working directory is loaded if there is one.
pub fn load_dotenv(env_name: Option<&str>) -> Result<(), dotenvy::Error> {
    match env_name {
        Some(name) => {
            dotenvy::from_path(PathBuf::from(format!(".env/{}.env", name)))?;
        }
        None => ignore_missing(dotenvy::dotenv())?,
    }
    Ok(())
}

/// A missing dotenv file is fine, a broken one is not.
fn ignore_missing<T>(res: Result<T, dotenvy::Error>) -> Result<(), dotenvy::Error> {
    match res {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
