//! Runtime configuration for the compaction coordinator.
//!
//! Limits are explicit and reproducible: every knob has a documented default
//! and strict environment parsing, so operator overrides fail loudly instead
//! of silently clamping.

use std::time::Duration;

use crate::error::{Error, Result};

const ENV_CHECK_INTERVAL_SECS: &str = "STRATA_COMPACTION_CHECK_INTERVAL_SECS";
const ENV_RPC_TIMEOUT_SECS: &str = "STRATA_COMPACTION_RPC_TIMEOUT_SECS";
const ENV_MAX_PARALLEL_TASKS: &str = "STRATA_COMPACTION_MAX_PARALLEL_TASKS";
const ENV_WORKER_PARALLEL_TASKS: &str = "STRATA_COMPACTION_WORKER_PARALLEL_TASKS";

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_PARALLEL_TASKS: u64 = 100;
const DEFAULT_WORKER_PARALLEL_TASKS: u64 = 4;

/// Configuration for the compaction coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionConfig {
    /// Interval between reconcile ticks.
    pub check_interval: Duration,
    /// Upper bound on any single oracle or worker RPC.
    pub rpc_timeout: Duration,
    /// Process-wide cap on concurrently active plans; `is_full` reports
    /// against this.
    pub max_parallel_tasks: usize,
    /// Per-worker admission capacity: how many plans one node executes at
    /// once.
    pub worker_parallel_tasks: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS as usize,
            worker_parallel_tasks: DEFAULT_WORKER_PARALLEL_TASKS as usize,
        }
    }
}

impl CompactionConfig {
    /// Loads configuration from the process environment with strict
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an environment value is not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an environment value is not a
    /// positive integer.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let check_interval_secs = parse_positive_u64_env(
            &get_env,
            ENV_CHECK_INTERVAL_SECS,
            DEFAULT_CHECK_INTERVAL_SECS,
        )?;
        let rpc_timeout_secs =
            parse_positive_u64_env(&get_env, ENV_RPC_TIMEOUT_SECS, DEFAULT_RPC_TIMEOUT_SECS)?;
        let max_parallel_tasks =
            parse_positive_u64_env(&get_env, ENV_MAX_PARALLEL_TASKS, DEFAULT_MAX_PARALLEL_TASKS)?;
        let worker_parallel_tasks = parse_positive_u64_env(
            &get_env,
            ENV_WORKER_PARALLEL_TASKS,
            DEFAULT_WORKER_PARALLEL_TASKS,
        )?;

        Ok(Self {
            check_interval: Duration::from_secs(check_interval_secs),
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            max_parallel_tasks: usize::try_from(max_parallel_tasks).map_err(|_| {
                Error::configuration(format!(
                    "{ENV_MAX_PARALLEL_TASKS} value {max_parallel_tasks} exceeds supported range"
                ))
            })?,
            worker_parallel_tasks: usize::try_from(worker_parallel_tasks).map_err(|_| {
                Error::configuration(format!(
                    "{ENV_WORKER_PARALLEL_TASKS} value {worker_parallel_tasks} exceeds supported range"
                ))
            })?,
        })
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CompactionConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert_eq!(config.max_parallel_tasks, 100);
        assert_eq!(config.worker_parallel_tasks, 4);
    }

    #[test]
    fn env_overrides_apply() {
        let config = CompactionConfig::from_env_with(|key| match key {
            ENV_CHECK_INTERVAL_SECS => Some("5".to_string()),
            ENV_WORKER_PARALLEL_TASKS => Some("2".to_string()),
            _ => None,
        })
        .expect("valid config");

        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.worker_parallel_tasks, 2);
        // Untouched keys keep their defaults.
        assert_eq!(config.max_parallel_tasks, 100);
    }

    #[test]
    fn zero_values_are_rejected() {
        let result = CompactionConfig::from_env_with(|key| {
            (key == ENV_MAX_PARALLEL_TASKS).then(|| "0".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn garbage_values_are_rejected() {
        let result = CompactionConfig::from_env_with(|key| {
            (key == ENV_RPC_TIMEOUT_SECS).then(|| "ten".to_string())
        });
        assert!(result.is_err());
    }
}
