use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use joinwave_detect::WaveParams;

/// Process-wide settings, read once at startup and shared through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub scan_limit: usize,
    pub resolve_concurrency: usize,
    pub scan_timeout: Option<Duration>,
    /// Detector defaults when a request leaves them out.
    pub waves: WaveParams,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let window_seconds: f64 = parse(&lookup, "JOINWAVE_WINDOW_SECONDS")?.unwrap_or(30.0);
        let threshold: i64 = parse(&lookup, "JOINWAVE_THRESHOLD")?.unwrap_or(5);
        let waves = WaveParams::new(window_seconds, threshold)
            .context("invalid default wave parameters")?;

        Ok(Self {
            db_path: text("JOINWAVE_DB_PATH", "joinwave.db").into(),
            export_dir: text("JOINWAVE_EXPORT_DIR", "./exports").into(),
            host: text("JOINWAVE_HOST", "0.0.0.0"),
            port: parse(&lookup, "JOINWAVE_PORT")?.unwrap_or(3300),
            scan_limit: parse(&lookup, "JOINWAVE_SCAN_LIMIT")?.unwrap_or(2000),
            resolve_concurrency: parse(&lookup, "JOINWAVE_RESOLVE_CONCURRENCY")?.unwrap_or(8),
            scan_timeout: parse(&lookup, "JOINWAVE_SCAN_TIMEOUT_SECS")?.map(Duration::from_secs),
            waves,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{key}={raw:?}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3300);
        assert_eq!(config.scan_limit, 2000);
        assert_eq!(config.scan_timeout, None);
        assert_eq!(config.waves.window_seconds, 30.0);
        assert_eq!(config.waves.threshold, 5);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("JOINWAVE_PORT", "8080"),
            ("JOINWAVE_SCAN_TIMEOUT_SECS", "90"),
            ("JOINWAVE_WINDOW_SECONDS", "12.5"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.scan_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.waves.window_seconds, 12.5);
    }

    #[test]
    fn malformed_values_fail_startup() {
        assert!(config_from(&[("JOINWAVE_PORT", "eighty")]).is_err());
        assert!(config_from(&[("JOINWAVE_THRESHOLD", "-3")]).is_err());
    }
}
