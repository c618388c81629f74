//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use mbs_api::Timeouts;
use mbs_core::scheduler::{DEFAULT_CONFIG_INTERVAL, DEFAULT_DATA_INTERVAL, DEFAULT_TICK};
use mbs_core::{ScheduleConfig, SchemaMap};
use serde::{Deserialize, Deserializer, Serialize};

/// Settings read from the environment as raw text instead of typed values, so
/// a numeric terminal id or token keeps its exact digits.
const TEXT_ENV_KEYS: [&str; 4] = ["api.url", "api.key", "terminal.id", "terminal.token"];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSettings,
    pub terminal: TerminalSettings,
    pub local: LocalSettings,
    pub schedule: ScheduleSettings,
    pub sync: SyncSettings,
    pub schema: SchemaMap,
}

/// Backend project URL and API key.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    #[serde(deserialize_with = "text")]
    pub url: String,
    #[serde(deserialize_with = "text")]
    pub key: String,
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("url", &self.url)
            .field("key", &redacted(&self.key))
            .finish()
    }
}

/// Identity of this terminal in the backend.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    #[serde(deserialize_with = "text")]
    pub id: String,
    #[serde(deserialize_with = "text")]
    pub token: String,
}

impl fmt::Debug for TerminalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSettings")
            .field("id", &self.id)
            .field("token", &redacted(&self.token))
            .finish()
    }
}

/// Files owned by the kiosk software.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// The kiosk's `SQLite` database.
    pub sqlite_path: PathBuf,
    /// The kiosk's INI settings file.
    pub ini_path: PathBuf,
}

/// Cadences, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub tick_secs: u64,
    pub config_interval_secs: u64,
    pub data_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK.as_secs(),
            config_interval_secs: DEFAULT_CONFIG_INTERVAL.as_secs(),
            data_interval_secs: DEFAULT_DATA_INTERVAL.as_secs(),
        }
    }
}

/// Batch sizes and request timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Maximum rows read from each ticket table per data cycle.
    pub ticket_limit: usize,
    /// Maximum rows read from each race table per data cycle.
    pub race_limit: usize,
    pub heartbeat_timeout_secs: u64,
    pub bulk_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            ticket_limit: 100,
            race_limit: 20,
            heartbeat_timeout_secs: timeouts.heartbeat.as_secs(),
            bulk_timeout_secs: timeouts.bulk.as_secs(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (MBSYNC_API__URL, MBSYNC_TERMINAL__ID, ...)
        let env = Env::prefixed("MBSYNC_").split("__");
        let text_vars: Vec<_> = env.clone().only(&TEXT_ENV_KEYS).iter().collect();
        figment = figment.merge(env.ignore(&TEXT_ENV_KEYS));
        for (key, value) in text_vars {
            figment = figment.merge(Serialized::default(key.as_str(), value));
        }

        figment.extract()
    }

    /// Checks the settings the sync loop cannot run without.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("api.url", self.api.url.trim().is_empty()),
            ("api.key", self.api.key.trim().is_empty()),
            ("terminal.id", self.terminal.id.trim().is_empty()),
            ("terminal.token", self.terminal.token.trim().is_empty()),
            ("local.sqlite_path", self.local.sqlite_path.as_os_str().is_empty()),
            ("local.ini_path", self.local.ini_path.as_os_str().is_empty()),
        ];
        let missing: Vec<_> = missing
            .into_iter()
            .filter_map(|(name, is_missing)| is_missing.then_some(name))
            .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }
        if self.sync.ticket_limit == 0 || self.sync.race_limit == 0 {
            bail!("sync.ticket_limit and sync.race_limit must be positive");
        }
        if self.sync.heartbeat_timeout_secs == 0 || self.sync.bulk_timeout_secs == 0 {
            bail!("sync.heartbeat_timeout_secs and sync.bulk_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            tick: Duration::from_secs(self.schedule.tick_secs),
            config_interval: Duration::from_secs(self.schedule.config_interval_secs),
            data_interval: Duration::from_secs(self.schedule.data_interval_secs),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            heartbeat: Duration::from_secs(self.sync.heartbeat_timeout_secs),
            bulk: Duration::from_secs(self.sync.bulk_timeout_secs),
        }
    }
}

/// Accepts a string or a bare number, as config files often hold numeric ids.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        String(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::String(s) => s,
        Text::Unsigned(n) => n.to_string(),
        Text::Signed(n) => n.to_string(),
        Text::Float(n) => n.to_string(),
    })
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "[REDACTED]" }
}

/// Returns the platform-specific config directory for mbsync.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("mbsync"))
}

/// Returns the platform-specific state directory for mbsync.
///
/// On Linux: `~/.local/state/mbsync`. Platforms without a state directory
/// fall back to the local data directory.
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|p| p.join("mbsync"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use figment::Jail;

    use super::*;

    fn complete() -> Config {
        let mut config = Config::default();
        config.api.url = "https://example.supabase.co".to_string();
        config.api.key = "service-key".to_string();
        config.terminal.id = "term-1".to_string();
        config.terminal.token = "tok-9".to_string();
        config.local.sqlite_path = PathBuf::from("kiosk.db");
        config.local.ini_path = PathBuf::from("kiosk.ini");
        config
    }

    #[test]
    fn test_dirs_state_path_ends_with_mbsync() {
        let path = dirs_state_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "mbsync");
    }

    #[test]
    fn test_defaults_match_deployed_cadence() {
        let config = Config::default();
        assert_eq!(config.schedule(), ScheduleConfig::default());
        assert_eq!(config.timeouts(), Timeouts::default());
        assert_eq!(config.sync.ticket_limit, 100);
        assert_eq!(config.sync.race_limit, 20);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [terminal]
            id = "term-7"

            [schedule]
            tick_secs = 5

            [schema]
            race_tables = ["RACE_P"]

            [schema.tickets]
            identifier = ["NRO_TIKET"]
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.terminal.id, "term-7");
        assert_eq!(config.schedule.tick_secs, 5);
        assert_eq!(config.schedule.data_interval_secs, 60);
        assert_eq!(config.schema.race_tables, vec!["RACE_P"]);
        assert_eq!(config.schema.tickets.identifier, vec!["NRO_TIKET"]);
        assert_eq!(config.schema.tickets.numbers, vec!["NUMEROS", "NUMERO"]);
        assert_eq!(config.schema.sold_table, "TIKETS_VENDIDOS_P");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", complete());
        assert!(!debug.contains("service-key"));
        assert!(!debug.contains("tok-9"));
        assert!(debug.contains("term-1"));
    }

    #[test]
    fn test_validate_lists_missing_settings() {
        assert!(complete().validate().is_ok());

        let mut config = complete();
        config.api.key = String::new();
        config.terminal.token = "  ".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert_eq!(err, "missing required settings: api.key, terminal.token");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = complete();
        config.sync.race_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = complete();
        config.sync.heartbeat_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.sync.bulk_timeout_secs = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout"), "{err}");
    }

    #[test]
    fn test_numeric_identity_from_env_is_kept_verbatim() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let dir = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", dir);
            jail.set_env("MBSYNC_TERMINAL__ID", "0042");
            jail.set_env("MBSYNC_TERMINAL__TOKEN", "123456");
            jail.set_env("MBSYNC_API__KEY", "987");
            jail.set_env("MBSYNC_SYNC__RACE_LIMIT", "5");

            let config = Config::load_from(None)?;

            assert_eq!(config.terminal.id, "0042");
            assert_eq!(config.terminal.token, "123456");
            assert_eq!(config.api.key, "987");
            assert_eq!(config.sync.race_limit, 5);
            Ok(())
        });
    }

    #[test]
    fn test_numeric_identity_from_file_is_read_as_text() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let dir = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", dir);
            jail.create_file(
                "mbsync.toml",
                "[terminal]\nid = 42\ntoken = 123456\n",
            )?;

            let config = Config::load_from(Some(Path::new("mbsync.toml")))?;

            assert_eq!(config.terminal.id, "42");
            assert_eq!(config.terminal.token, "123456");
            Ok(())
        });
    }
}
