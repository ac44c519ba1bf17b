//! Configuration loading and validation.
//!
//! Configuration is layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults (database in the platform data directory, one hour
//!    staleness threshold, sweep once per threshold).
//! 2. A TOML file: the path given on the command line, otherwise
//!    `skytrack.toml` in the platform config directory if it exists.
//! 3. Environment variables prefixed with `SKYTRACK_`, with `__` separating
//!    nested keys (e.g. `SKYTRACK_TRACKING__STALENESS_SECS=600`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "skytrack.toml";
const DATABASE_FILE: &str = "tracking.db";
const ENV_PREFIX: &str = "SKYTRACK_";
/// Upper bound for every duration setting: one hundred years.
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// SQLite database file. Parent directories are created on open.
    pub database: PathBuf,
    /// Seconds without an update before an aircraft is no longer live.
    pub staleness_secs: u64,
    /// Seconds between sweeps; defaults to `staleness_secs`.
    pub sweep_interval_secs: Option<u64>,
    pub busy_timeout_ms: u64,
    pub max_connections: u32,
}
impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DATABASE_FILE),
            staleness_secs: 60 * 60,
            sweep_interval_secs: None,
            busy_timeout_ms: 1500,
            max_connections: 5,
        }
    }
}
impl TrackingConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.unwrap_or(self.staleness_secs))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("tracking.database"));
        }
        if self.staleness_secs == 0 || self.staleness_secs > MAX_DURATION_SECS {
            exn::bail!(ErrorKind::Invalid("tracking.staleness_secs"));
        }
        if self.sweep_interval_secs.is_some_and(|secs| secs == 0 || secs > MAX_DURATION_SECS) {
            exn::bail!(ErrorKind::Invalid("tracking.sweep_interval_secs"));
        }
        if self.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("tracking.max_connections"));
        }
        Ok(())
    }
}

impl Config {
    /// Load and validate configuration from all sources.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "skytrack");
        let config: Self = Self::figment(dirs.as_ref(), file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.tracking.validate()?;
        tracing::debug!(database = %config.tracking.database.display(), "Configuration loaded");
        Ok(config)
    }

    /// Build the layered provider without extracting it.
    ///
    /// Without platform directories the database defaults to the working
    /// directory and no default config file is looked for.
    pub fn figment(dirs: Option<&ProjectDirs>, file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = dirs {
            figment = figment.merge(Serialized::default("tracking.database", dirs.data_dir().join(DATABASE_FILE)));
        }
        match (file, dirs) {
            (Some(file), _) => {
                if !file.is_file() {
                    exn::bail!(ErrorKind::FileNotFound(file.to_path_buf()));
                }
                figment = figment.merge(Toml::file(file));
            },
            (None, Some(dirs)) => figment = figment.merge(Toml::file(dirs.config_dir().join(CONFIG_FILE))),
            (None, None) => tracing::debug!("No platform directories; skipping default config file"),
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load_in_jail(file: Option<&str>) -> Result<Config> {
        let config: Config = Config::figment(None, file.map(Path::new))?.extract().or_raise(|| ErrorKind::Load)?;
        config.tracking.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_in_jail(None).unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.tracking.staleness(), Duration::from_secs(3600));
            assert_eq!(config.tracking.sweep_interval(), Duration::from_secs(3600));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "skytrack.toml",
                r#"
                    [tracking]
                    database = "/var/lib/skytrack/tracking.db"
                    staleness_secs = 600
                    max_connections = 2
                "#,
            )?;
            jail.set_env("SKYTRACK_TRACKING__MAX_CONNECTIONS", "8");
            jail.set_env("SKYTRACK_TRACKING__SWEEP_INTERVAL_SECS", "60");
            let config = load_in_jail(Some("skytrack.toml")).unwrap();
            assert_eq!(config.tracking.database, PathBuf::from("/var/lib/skytrack/tracking.db"));
            assert_eq!(config.tracking.staleness(), Duration::from_secs(600));
            assert_eq!(config.tracking.sweep_interval(), Duration::from_secs(60));
            assert_eq!(config.tracking.max_connections, 8);
            assert_eq!(config.tracking.busy_timeout(), Duration::from_millis(1500));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_outside_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skytrack.toml");
        std::fs::write(&path, "[tracking]\nstaleness_secs = 900\n").unwrap();
        Jail::expect_with(|_jail| {
            let config = load_in_jail(path.to_str()).unwrap();
            assert_eq!(config.tracking.staleness(), Duration::from_secs(900));
            assert_eq!(config.tracking.sweep_interval(), Duration::from_secs(900));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = load_in_jail(Some("nope.toml")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("SKYTRACK_TRACKING__STALENESS_SECS", "0", "tracking.staleness_secs")]
    #[case("SKYTRACK_TRACKING__STALENESS_SECS", "1000000000000", "tracking.staleness_secs")]
    #[case("SKYTRACK_TRACKING__SWEEP_INTERVAL_SECS", "0", "tracking.sweep_interval_secs")]
    #[case("SKYTRACK_TRACKING__SWEEP_INTERVAL_SECS", "18446744073709551615", "tracking.sweep_interval_secs")]
    #[case("SKYTRACK_TRACKING__MAX_CONNECTIONS", "0", "tracking.max_connections")]
    fn test_invalid_values(#[case] var: &str, #[case] value: &str, #[case] field: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(var, value);
            let err = load_in_jail(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(f) if *f == field));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            jail.set_env("SKYTRACK_TRACKING__STALENESS_SECS", "soon");
            let err = load_in_jail(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }
}
