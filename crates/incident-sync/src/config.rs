//! Notifier configuration.
//!
//! Read from a TOML file (default `~/.pagerduty.toml`):
//!
//! ```toml
//! [main]
//! pause_timeout = 30
//! clear_on_unpause = true
//! timezone = "Europe/Copenhagen"
//!
//! [pagerduty]
//! token = "..."
//! interval = 30
//! teams = ["Platform"]
//! services = ["PaymentsAPI"]
//! title = "{{service.summary}} {{format created_at}}"
//!
//! [include]
//! "service.PaymentsAPI" = ".*"
//!
//! [exclude]
//! "team.!OnCall" = ".*timeout.*"
//! ```
//!
//! Environment overrides:
//! - `PAGERDUTY_NOTIFIER_CONFIG`: config file path
//! - `PAGERDUTY_TOKEN`: API token
//! - `PAGERDUTY_INTERVAL_SECS`: polling interval in seconds

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::filter::{Filters, RuleSet};
use crate::format::{AlertFormatter, DisplayZone};

const ENV_CONFIG_PATH: &str = "PAGERDUTY_NOTIFIER_CONFIG";
const ENV_TOKEN: &str = "PAGERDUTY_TOKEN";
const ENV_INTERVAL: &str = "PAGERDUTY_INTERVAL_SECS";

/// Default config file name, relative to the home directory.
pub const CONFIG_FILE_NAME: &str = ".pagerduty.toml";

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub main: MainConfig,
    pub pagerduty: PagerDutyConfig,
    /// `<scope>.<value>` → regex
    pub include: toml::Table,
    pub exclude: toml::Table,
}

/// `[main]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// Minutes before a pause ends by itself; 0 waits for a manual resume.
    pub pause_timeout: u64,
    /// Skip incidents raised while paused.
    pub clear_on_unpause: bool,
    /// IANA zone for displayed times; local time when unset.
    pub timezone: Option<String>,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            pause_timeout: 0,
            clear_on_unpause: true,
            timezone: None,
        }
    }
}

/// `[pagerduty]`
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerDutyConfig {
    pub token: String,
    /// Seconds between sync cycles.
    pub interval: u64,
    #[serde(deserialize_with = "names")]
    pub teams: Vec<String>,
    /// Emails or names.
    #[serde(deserialize_with = "names")]
    pub users: Vec<String>,
    #[serde(deserialize_with = "names")]
    pub services: Vec<String>,
    /// Handlebars title template.
    pub title: Option<String>,
    pub api_url: Option<String>,
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            interval: 30,
            teams: Vec::new(),
            users: Vec::new(),
            services: Vec::new(),
            title: None,
            api_url: None,
        }
    }
}

impl std::fmt::Debug for PagerDutyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagerDutyConfig")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("interval", &self.interval)
            .field("teams", &self.teams)
            .field("users", &self.users)
            .field("services", &self.services)
            .field("title", &self.title)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Accept a list or a comma-separated string.
fn names<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Names {
        List(Vec<String>),
        Csv(String),
    }

    let names = match Names::deserialize(deserializer)? {
        Names::List(list) => list,
        Names::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

impl Config {
    /// Path from `PAGERDUTY_NOTIFIER_CONFIG`, else `~/.pagerduty.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var(ENV_CONFIG_PATH)
            .ok()
            .filter(|p| !p.is_empty())
            .map_or_else(
                || {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join(CONFIG_FILE_NAME)
                },
                PathBuf::from,
            )
    }

    /// Read, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(path, &content)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.display(), config = ?config.pagerduty, "Configuration loaded");
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(token) = std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty()) {
            self.pagerduty.token = token;
        }
        if let Ok(raw) = std::env::var(ENV_INTERVAL) {
            match raw.trim().parse() {
                Ok(interval) => self.pagerduty.interval = interval,
                Err(e) => warn!(
                    value = %raw,
                    error = %e,
                    interval = self.pagerduty.interval,
                    "Ignoring invalid PAGERDUTY_INTERVAL_SECS"
                ),
            }
        }
    }

    /// Check values a running notifier depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pagerduty.token.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "pagerduty.token is empty (set it or {ENV_TOKEN})"
            )));
        }
        if self.pagerduty.interval == 0 {
            return Err(ConfigError::Invalid(
                "pagerduty.interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Time between sync cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.pagerduty.interval)
    }

    #[must_use]
    pub fn zone(&self) -> DisplayZone {
        DisplayZone::from_name(self.main.timezone.as_deref())
    }

    /// Compile the title template.
    pub fn formatter(&self) -> Result<AlertFormatter, ConfigError> {
        AlertFormatter::new(self.pagerduty.title.as_deref(), self.zone())
    }

    /// Build the include and exclude rule sets in file order.
    #[must_use]
    pub fn filters(&self) -> Filters {
        let include = rule_entries("include", &self.include);
        let exclude = rule_entries("exclude", &self.exclude);
        Filters::new(
            RuleSet::from_entries("include", include.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            RuleSet::from_entries("exclude", exclude.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        )
    }
}

/// Flatten a rule table to `(key, regex)` pairs.
///
/// `"service.X" = ".*"` and the dotted form `service.X = ".*"` (a nested
/// table in TOML) give the same rule.
fn rule_entries(set: &str, table: &toml::Table) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for (key, value) in table {
        match value {
            toml::Value::String(expression) => entries.push((key.clone(), expression.clone())),
            toml::Value::Table(inner) => {
                for (inner_key, inner_value) in rule_entries(set, inner) {
                    entries.push((format!("{key}.{inner_key}"), inner_value));
                }
            }
            other => warn!(
                set,
                key,
                value = %other,
                "Filter expression must be a string, rule ignored"
            ),
        }
    }
    entries
}
