//! Environment configuration for kbforge
//!
//! Every setting has a default; unset and empty variables fall back to it.
//!
//! | Variable | Default |
//! |---|---|
//! | `AWS_REGION` | provider chain |
//! | `KBFORGE_COLLECTION_POLL_INTERVAL_SECS` / `_ATTEMPTS` | 30 / 30 |
//! | `KBFORGE_INDEX_POLL_INTERVAL_SECS` / `_ATTEMPTS` | 10 / 30 |
//! | `KBFORGE_KB_POLL_INTERVAL_SECS` / `_ATTEMPTS` | 10 / 30 |
//! | `KBFORGE_LEASE_TTL_SECS` | 1200 |
//! | `KBFORGE_ROLLBACK_ON_FAILURE` | true |
//! | `KBFORGE_STATE_BACKEND` | `ssm` |
//! | `KBFORGE_STATE_DIR` | `<data dir>/kbforge` (file backend only) |

pub mod error;

pub use error::*;

use kbforge_cloud::{PollConfig, ProvisionSettings};
use std::path::PathBuf;
use std::time::Duration;

/// Where persisted attributes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    Ssm,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub region: Option<String>,
    pub provision: ProvisionSettings,
    pub state_backend: StateBackend,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = ProvisionSettings::default();

        let provision = ProvisionSettings {
            collection_poll: env.poll(
                "KBFORGE_COLLECTION_POLL_INTERVAL_SECS",
                "KBFORGE_COLLECTION_POLL_ATTEMPTS",
                defaults.collection_poll,
            )?,
            index_poll: env.poll(
                "KBFORGE_INDEX_POLL_INTERVAL_SECS",
                "KBFORGE_INDEX_POLL_ATTEMPTS",
                defaults.index_poll,
            )?,
            knowledge_base_poll: env.poll(
                "KBFORGE_KB_POLL_INTERVAL_SECS",
                "KBFORGE_KB_POLL_ATTEMPTS",
                defaults.knowledge_base_poll,
            )?,
            lease_ttl: env
                .number("KBFORGE_LEASE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_ttl),
            rollback_on_failure: env
                .flag("KBFORGE_ROLLBACK_ON_FAILURE")?
                .unwrap_or(defaults.rollback_on_failure),
        };

        let state_backend = match env.get("KBFORGE_STATE_BACKEND").as_deref() {
            None | Some("ssm") => StateBackend::Ssm,
            Some("file") => StateBackend::File(match env.get("KBFORGE_STATE_DIR") {
                Some(dir) => PathBuf::from(dir),
                None => default_state_dir()?,
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "KBFORGE_STATE_BACKEND",
                    value: other.to_string(),
                    reason: "expected ssm or file",
                });
            }
        };

        Ok(Self {
            region: env.get("AWS_REGION"),
            provision,
            state_backend,
        })
    }
}

/// Default directory of the file state backend
pub fn default_state_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or(ConfigError::StateDirNotFound)?
        .join("kbforge"))
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn number(&self, name: &'static str) -> Result<Option<u64>> {
        self.get(name)
            .map(|value| {
                value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    name,
                    value,
                    reason: "expected a non-negative integer",
                })
            })
            .transpose()
    }

    fn flag(&self, name: &'static str) -> Result<Option<bool>> {
        self.get(name)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    name,
                    value,
                    reason: "expected true or false",
                }),
            })
            .transpose()
    }

    fn poll(
        &self,
        interval_name: &'static str,
        attempts_name: &'static str,
        default: PollConfig,
    ) -> Result<PollConfig> {
        let interval = self
            .number(interval_name)?
            .map(Duration::from_secs)
            .unwrap_or(default.interval);
        let attempts = match self.number(attempts_name)? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    name: attempts_name,
                    value: "0".to_string(),
                    reason: "at least one attempt is required",
                });
            }
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
                name: attempts_name,
                value: n.to_string(),
                reason: "too many attempts",
            })?,
            None => default.max_attempts,
        };
        Ok(PollConfig::new(interval, attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.region, None);
        assert_eq!(s.state_backend, StateBackend::Ssm);
        assert_eq!(s.provision.collection_poll.interval, Duration::from_secs(30));
        assert_eq!(s.provision.collection_poll.max_attempts, 30);
        assert_eq!(s.provision.index_poll.interval, Duration::from_secs(10));
        assert_eq!(s.provision.knowledge_base_poll.max_attempts, 30);
        assert_eq!(s.provision.lease_ttl, Duration::from_secs(1200));
        assert!(s.provision.rollback_on_failure);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("AWS_REGION", "eu-west-1"),
            ("KBFORGE_COLLECTION_POLL_INTERVAL_SECS", "5"),
            ("KBFORGE_COLLECTION_POLL_ATTEMPTS", "12"),
            ("KBFORGE_LEASE_TTL_SECS", "60"),
            ("KBFORGE_ROLLBACK_ON_FAILURE", "false"),
            ("KBFORGE_STATE_BACKEND", "file"),
            ("KBFORGE_STATE_DIR", "/tmp/kbforge-state"),
        ])
        .unwrap();

        assert_eq!(s.region.as_deref(), Some("eu-west-1"));
        assert_eq!(s.provision.collection_poll.interval, Duration::from_secs(5));
        assert_eq!(s.provision.collection_poll.max_attempts, 12);
        assert_eq!(s.provision.lease_ttl, Duration::from_secs(60));
        assert!(!s.provision.rollback_on_failure);
        assert_eq!(
            s.state_backend,
            StateBackend::File(PathBuf::from("/tmp/kbforge-state"))
        );
    }

    #[test]
    fn test_empty_value_uses_default() {
        let s = settings(&[("KBFORGE_KB_POLL_ATTEMPTS", "  ")]).unwrap();
        assert_eq!(s.provision.knowledge_base_poll.max_attempts, 30);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            settings(&[("KBFORGE_INDEX_POLL_ATTEMPTS", "0")]),
            Err(ConfigError::InvalidValue {
                name: "KBFORGE_INDEX_POLL_ATTEMPTS",
                ..
            })
        ));
        assert!(settings(&[("KBFORGE_LEASE_TTL_SECS", "-1")]).is_err());
        assert!(settings(&[("KBFORGE_ROLLBACK_ON_FAILURE", "maybe")]).is_err());

        let err = settings(&[("KBFORGE_STATE_BACKEND", "dynamodb")]).unwrap_err();
        assert!(err.to_string().contains("KBFORGE_STATE_BACKEND"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("AWS_REGION", Some("us-west-2")),
                ("KBFORGE_INDEX_POLL_INTERVAL_SECS", Some("2")),
                ("KBFORGE_STATE_BACKEND", None),
            ],
            || {
                let s = Settings::from_env().unwrap();
                assert_eq!(s.region.as_deref(), Some("us-west-2"));
                assert_eq!(s.provision.index_poll.interval, Duration::from_secs(2));
                assert_eq!(s.state_backend, StateBackend::Ssm);
            },
        );
    }
}
