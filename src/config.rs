use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::engine::cancellation::{CancellationPolicy, CancellationTier};
use crate::limits::MAX_PROPERTIES;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PROPERTY: &str = "default";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => write!(f, "{var}={value:?}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Host settings, read from `FRONTDESK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Properties opened at startup; one WAL each.
    pub properties: Vec<String>,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger the next one. 0
    /// turns the background compactor off.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub cancellation_policy: CancellationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            properties: vec![DEFAULT_PROPERTY.to_string()],
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS),
            cancellation_policy: CancellationPolicy::standard(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank variables keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(dir) = get("FRONTDESK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(list) = get("FRONTDESK_PROPERTIES") {
            config.properties = parse_properties(&list)?;
        }
        if let Some(port) = get("FRONTDESK_METRICS_PORT") {
            config.metrics_port = Some(parse_number("FRONTDESK_METRICS_PORT", &port)?);
        }
        if let Some(n) = get("FRONTDESK_COMPACT_THRESHOLD") {
            config.compact_threshold = parse_number("FRONTDESK_COMPACT_THRESHOLD", &n)?;
        }
        if let Some(secs) = get("FRONTDESK_COMPACT_INTERVAL_SECS") {
            let secs: u64 = parse_number("FRONTDESK_COMPACT_INTERVAL_SECS", &secs)?;
            if secs == 0 {
                return Err(invalid("FRONTDESK_COMPACT_INTERVAL_SECS", "0", "must be at least 1"));
            }
            config.compact_interval = Duration::from_secs(secs);
        }
        if let Some(tiers) = get("FRONTDESK_CANCELLATION_TIERS") {
            config.cancellation_policy = parse_cancellation_tiers(&tiers)?;
        }
        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| invalid(var, value, e.to_string()))
}

fn parse_properties(list: &str) -> Result<Vec<String>, ConfigError> {
    let mut names: Vec<String> = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    if names.is_empty() {
        return Err(invalid("FRONTDESK_PROPERTIES", list, "no property names"));
    }
    if names.len() > MAX_PROPERTIES {
        return Err(invalid("FRONTDESK_PROPERTIES", list, "too many properties"));
    }
    Ok(names)
}

/// `"30:0,7:20,1:50,0:100"`: `min_days:fee_percent` pairs.
pub fn parse_cancellation_tiers(spec: &str) -> Result<CancellationPolicy, ConfigError> {
    const VAR: &str = "FRONTDESK_CANCELLATION_TIERS";
    let mut tiers = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (days, percent) = part
            .split_once(':')
            .ok_or_else(|| invalid(VAR, spec, format!("expected days:percent, got {part:?}")))?;
        let min_days: i64 = parse_number(VAR, days)?;
        if min_days < 0 {
            return Err(invalid(VAR, spec, "days must not be negative"));
        }
        let fee_percent: Decimal = parse_number(VAR, percent)?;
        tiers.push(CancellationTier { min_days, fee_percent });
    }
    CancellationPolicy::new(tiers).map_err(|e| invalid(VAR, spec, e.to_string()))
}
