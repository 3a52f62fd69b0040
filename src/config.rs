//! Runtime configuration.
//!
//! The first CLI argument overrides `SPANSCOPE_API_URL`; everything else comes
//! from the environment or falls back to a default.

use std::time::Duration;

use crate::error::ConfigError;

pub const API_URL_VAR: &str = "SPANSCOPE_API_URL";
pub const TIMEOUT_VAR: &str = "SPANSCOPE_TIMEOUT_MS";
pub const PAGE_SIZE_VAR: &str = "SPANSCOPE_PAGE_SIZE";
pub const LOOKBACK_VAR: &str = "SPANSCOPE_LOOKBACK_SECS";
pub const FLAME_SOURCE_VAR: &str = "SPANSCOPE_FLAME_SOURCE";
pub const POLL_VAR: &str = "SPANSCOPE_POLL_MS";

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
const MIN_POLL_MS: u64 = 10;

/// Where flame trees come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlameSource {
    /// Aggregated locally from the trace's validated spans.
    #[default]
    Client,
    /// Fetched from the flame endpoint and decoded leniently.
    Server,
}

impl FlameSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" | "local" => Some(FlameSource::Client),
            "server" | "remote" => Some(FlameSource::Server),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub lookback_secs: i64,
    pub flame_source: FlameSource,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            timeout: Duration::from_millis(20_000),
            page_size: 50,
            lookback_secs: 3600,
            flame_source: FlameSource::Client,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl Config {
    pub fn from_env_and_args() -> Result<Self, ConfigError> {
        Self::resolve(std::env::args().nth(1), |var| std::env::var(var).ok())
    }

    /// Resolves the configuration from an optional URL argument and a
    /// variable lookup. Blank values count as unset.
    pub fn resolve(
        url_arg: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let mut config = Config::default();

        if let Some(url) = url_arg.filter(|u| !u.trim().is_empty()).or_else(|| get(API_URL_VAR)) {
            config.api_url = url.trim().trim_end_matches('/').to_owned();
        }
        if let Some(value) = get(TIMEOUT_VAR) {
            let ms: u64 = parse(TIMEOUT_VAR, "milliseconds", &value)?;
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(value) = get(PAGE_SIZE_VAR) {
            config.page_size = parse(PAGE_SIZE_VAR, "a page size", &value)?;
        }
        if let Some(value) = get(LOOKBACK_VAR) {
            config.lookback_secs = parse(LOOKBACK_VAR, "seconds", &value)?;
        }
        if let Some(value) = get(FLAME_SOURCE_VAR) {
            config.flame_source = FlameSource::parse(&value).ok_or_else(|| ConfigError::Invalid {
                var: FLAME_SOURCE_VAR,
                expected: "`client` or `server`",
                value: value.clone(),
            })?;
        }
        if let Some(value) = get(POLL_VAR) {
            let ms: u64 = parse(POLL_VAR, "milliseconds", &value)?;
            config.poll_interval = Duration::from_millis(ms.max(MIN_POLL_MS));
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    var: &'static str,
    expected: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected,
        value: value.to_owned(),
    })
}
