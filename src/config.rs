use crate::device_client::ColorParsePolicy;
use anyhow::{Context, Result, ensure};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Device HTTP client configuration
    pub client: ClientConfig,

    /// Reachability monitor configuration
    pub monitor: MonitorConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub color_policy: ColorParsePolicy,
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Period of the recovery loop while the device is offline
    pub probe_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    /// Endpoint preferences, `preferences.ini` inside `PIXEL_DATA_DIR`
    pub preferences_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(ClientConfig::DEFAULT_TIMEOUT_MS),
            color_policy: ColorParsePolicy::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(MonitorConfig::DEFAULT_PROBE_INTERVAL_SECS),
        }
    }
}

impl AppConfig {
    /// Load and validate all configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// `lookup` returns the raw value of a variable or `None` if unset.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let client = ClientConfig::load(&lookup)?;
        let monitor = MonitorConfig::load(&lookup)?;
        let paths = PathConfig::load(&lookup);

        Ok(Self {
            client,
            monitor,
            paths,
        })
    }
}

impl ClientConfig {
    const DEFAULT_TIMEOUT_MS: u64 = 5000;

    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timeout_ms: u64 =
            parse_var(lookup, "PIXEL_REQUEST_TIMEOUT_MS", Self::DEFAULT_TIMEOUT_MS)?;
        ensure!(
            timeout_ms > 0,
            "failed to parse PIXEL_REQUEST_TIMEOUT_MS: must be greater than 0"
        );

        let color_policy = if parse_var(lookup, "PIXEL_STRICT_COLOR", false)? {
            ColorParsePolicy::Strict
        } else {
            ColorParsePolicy::Lenient
        };

        Ok(Self {
            request_timeout: Duration::from_millis(timeout_ms),
            color_policy,
        })
    }
}

impl MonitorConfig {
    const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;

    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval_secs: u64 = parse_var(
            lookup,
            "PIXEL_PROBE_INTERVAL_SECS",
            Self::DEFAULT_PROBE_INTERVAL_SECS,
        )?;
        ensure!(
            interval_secs > 0,
            "failed to parse PIXEL_PROBE_INTERVAL_SECS: must be greater than 0"
        );

        Ok(Self {
            probe_interval: Duration::from_secs(interval_secs),
        })
    }
}

impl PathConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let data_dir =
            PathBuf::from(lookup("PIXEL_DATA_DIR").unwrap_or_else(|| ".".to_string()));
        let preferences_file = data_dir.join("preferences.ini");

        Self { preferences_file }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}: invalid format")),
        None => Ok(default),
    }
}
