//! Registry configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use identity_circuits::accumulator::MAX_DEPTH;
use identity_circuits::DEFAULT_DEPTH;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings consumed by the reconciliation engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub depth: usize,
    /// Upper bound on ledger publish attempts per rebuild.
    pub publish_attempts: u32,
    pub publish_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            publish_attempts: 3,
            publish_backoff: Duration::from_millis(500),
        }
    }
}

/// Full service configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub keys_dir: PathBuf,
    /// Snapshot gateways in read order; the first one receives writes.
    pub snapshot_dirs: Vec<PathBuf>,
    pub gateway_timeout: Duration,
    pub ledger_journal: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(lookup("REGISTRY_DATA_DIR").unwrap_or_else(|| "./data".into()));

        let snapshot_dirs = match lookup("REGISTRY_SNAPSHOT_DIRS") {
            Some(raw) => {
                let dirs: Vec<PathBuf> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect();
                if dirs.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "REGISTRY_SNAPSHOT_DIRS",
                        value: raw,
                        reason: "at least one directory is required".into(),
                    });
                }
                dirs
            }
            None => vec![data_dir.join("snapshots")],
        };

        let depth = parse(&lookup, "REGISTRY_TREE_DEPTH", DEFAULT_DEPTH)?;
        if depth == 0 || depth > MAX_DEPTH {
            return Err(ConfigError::Invalid {
                var: "REGISTRY_TREE_DEPTH",
                value: depth.to_string(),
                reason: format!("must be between 1 and {}", MAX_DEPTH),
            });
        }

        let publish_attempts: u32 = parse(&lookup, "REGISTRY_PUBLISH_ATTEMPTS", 3)?;
        if publish_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "REGISTRY_PUBLISH_ATTEMPTS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port: parse(&lookup, "REGISTRY_PORT", 3002)?,
            keys_dir: PathBuf::from(lookup("REGISTRY_KEYS_DIR").unwrap_or_else(|| "keys".into())),
            snapshot_dirs,
            gateway_timeout: Duration::from_millis(parse(
                &lookup,
                "REGISTRY_GATEWAY_TIMEOUT_MS",
                10_000,
            )?),
            ledger_journal: lookup("REGISTRY_LEDGER_JOURNAL").map(PathBuf::from),
            engine: EngineConfig {
                depth,
                publish_attempts,
                publish_backoff: Duration::from_millis(parse(
                    &lookup,
                    "REGISTRY_PUBLISH_BACKOFF_MS",
                    500,
                )?),
            },
            data_dir,
        })
    }
}

fn parse<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
