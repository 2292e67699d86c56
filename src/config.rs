use std::env;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub const ENV_BASE_WORKERS: &str = "GAP_BASE_WORKERS";
pub const ENV_MAX_WORKERS: &str = "GAP_MAX_WORKERS";
pub const ENV_WORKER_TIMEOUT: &str = "GAP_WORKER_TIMEOUT";

const DEFAULT_BASE_WORKERS: usize = 10;
const DEFAULT_MAX_WORKERS: usize = 10;
const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors produced while building or validating a [`PoolConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("base_workers must be greater than zero")]
  ZeroBaseWorkers,

  #[error("invalid value {value:?} for {key}: {reason}")]
  InvalidValue { key: String, value: String, reason: String },

  #[error("failed to read env file: {0}")]
  EnvFile(String),
}

/// Sizing for a [`TaskPool`](crate::TaskPool).
///
/// `max_workers <= base_workers` (including `0`) disables elastic growth
/// entirely; `0` is not treated as "unlimited".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
  /// Number of permanent workers, started at construction.
  pub base_workers: usize,
  /// Upper bound on permanent plus temporary workers.
  pub max_workers: usize,
  /// How long a temporary worker may stay idle before it retires.
  pub worker_timeout: Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      base_workers: DEFAULT_BASE_WORKERS,
      max_workers: DEFAULT_MAX_WORKERS,
      worker_timeout: DEFAULT_WORKER_TIMEOUT,
    }
  }
}

impl PoolConfig {
  pub fn new(base_workers: usize, max_workers: usize, worker_timeout: Duration) -> Self {
    Self {
      base_workers,
      max_workers,
      worker_timeout,
    }
  }

  /// Number of temporary workers the pool may run at once.
  pub fn temporary_capacity(&self) -> usize {
    self.max_workers.saturating_sub(self.base_workers)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.base_workers == 0 {
      return Err(ConfigError::ZeroBaseWorkers);
    }
    Ok(())
  }

  /// Reads `GAP_BASE_WORKERS`, `GAP_MAX_WORKERS` and `GAP_WORKER_TIMEOUT` from
  /// the process environment. Unset keys keep their default.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_vars(env::vars())
  }

  /// Reads the same keys from a dotenv-style file without touching the
  /// process environment.
  pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let iter = dotenvy::from_path_iter(path.as_ref()).map_err(|e| ConfigError::EnvFile(e.to_string()))?;
    let mut vars = Vec::new();
    for item in iter {
      let (key, value) = item.map_err(|e| ConfigError::EnvFile(e.to_string()))?;
      vars.push((key, value));
    }
    Self::from_vars(vars)
  }

  pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut config = Self::default();
    for (key, value) in vars {
      let (key, value) = (key.as_ref(), value.as_ref().trim());
      match key {
        ENV_BASE_WORKERS => config.base_workers = parse_count(key, value)?,
        ENV_MAX_WORKERS => config.max_workers = parse_count(key, value)?,
        ENV_WORKER_TIMEOUT => config.worker_timeout = parse_duration(key, value)?,
        _ => {}
      }
    }
    config.validate()?;
    Ok(config)
  }
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ConfigError {
  ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
    reason: reason.to_string(),
  }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
  value.parse::<usize>().map_err(|e| invalid(key, value, e))
}

/// Accepts `250ms`, `10s`, `2m`, or a bare integer meaning seconds.
fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
  let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
    Some(idx) => value.split_at(idx),
    None => (value, "s"),
  };
  let amount = digits.parse::<u64>().map_err(|e| invalid(key, value, e))?;
  match unit {
    "ms" => Ok(Duration::from_millis(amount)),
    "s" => Ok(Duration::from_secs(amount)),
    "m" => Ok(Duration::from_secs(amount * 60)),
    other => Err(invalid(key, value, format!("unknown unit {:?}", other))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_hardcoded_pool() {
    let config = PoolConfig::default();
    assert_eq!(config.base_workers, 10);
    assert_eq!(config.max_workers, 10);
    assert_eq!(config.worker_timeout, Duration::from_secs(10));
    assert_eq!(config.temporary_capacity(), 0);
  }

  #[test]
  fn temporary_capacity_never_negative() {
    assert_eq!(PoolConfig::new(4, 2, Duration::ZERO).temporary_capacity(), 0);
    assert_eq!(PoolConfig::new(4, 0, Duration::ZERO).temporary_capacity(), 0);
    assert_eq!(PoolConfig::new(1, 3, Duration::ZERO).temporary_capacity(), 2);
  }

  #[test]
  fn zero_base_workers_rejected() {
    let err = PoolConfig::new(0, 5, Duration::from_secs(1)).validate().unwrap_err();
    assert_eq!(err, ConfigError::ZeroBaseWorkers);
  }

  #[test]
  fn from_vars_reads_known_keys() {
    let config = PoolConfig::from_vars([
      ("GAP_BASE_WORKERS", "2"),
      ("GAP_MAX_WORKERS", "6"),
      ("GAP_WORKER_TIMEOUT", "250ms"),
      ("UNRELATED", "whatever"),
    ])
    .unwrap();
    assert_eq!(config, PoolConfig::new(2, 6, Duration::from_millis(250)));
  }

  #[test]
  fn from_vars_keeps_defaults_for_missing_keys() {
    let config = PoolConfig::from_vars([("GAP_MAX_WORKERS", "20")]).unwrap();
    assert_eq!(config.base_workers, 10);
    assert_eq!(config.max_workers, 20);
  }

  #[test]
  fn negative_counts_are_rejected() {
    let err = PoolConfig::from_vars([("GAP_MAX_WORKERS", "-1")]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "GAP_MAX_WORKERS"));
  }

  #[test]
  fn zero_base_from_vars_rejected() {
    let err = PoolConfig::from_vars([("GAP_BASE_WORKERS", "0")]).unwrap_err();
    assert_eq!(err, ConfigError::ZeroBaseWorkers);
  }

  #[test]
  fn duration_units() {
    let k = ENV_WORKER_TIMEOUT;
    assert_eq!(parse_duration(k, "15").unwrap(), Duration::from_secs(15));
    assert_eq!(parse_duration(k, "15s").unwrap(), Duration::from_secs(15));
    assert_eq!(parse_duration(k, "40ms").unwrap(), Duration::from_millis(40));
    assert_eq!(parse_duration(k, "2m").unwrap(), Duration::from_secs(120));
    assert!(parse_duration(k, "3h").is_err());
    assert!(parse_duration(k, "ms").is_err());
  }

  #[test]
  fn from_env_file_parses_dotenv() {
    let path = std::env::temp_dir().join(format!("gap_pool_config_{}.env", std::process::id()));
    std::fs::write(&path, "GAP_BASE_WORKERS=3\nGAP_MAX_WORKERS=5\nGAP_WORKER_TIMEOUT=2s\n").unwrap();
    let config = PoolConfig::from_env_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config, PoolConfig::new(3, 5, Duration::from_secs(2)));
  }

  #[test]
  fn missing_env_file_is_an_error() {
    let err = PoolConfig::from_env_file("/definitely/not/here.env").unwrap_err();
    assert!(matches!(err, ConfigError::EnvFile(_)));
  }
}
