//! YAML configuration.
//!
//! Resolution order:
//! 1. `--config PATH` (must exist)
//! 2. `$GCMON_HOME/config.yaml` when present
//! 3. The embedded default

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::columns::{ColumnRegistry, UnknownColumn};
use crate::console::{InvalidColor, Theme, ThemeOverrides, ThemePreset};

const HEADER: &str = "\
# gcmon configuration
# Run `gcmon config columns` to list every column.
";

fn default_config_template() -> &'static str {
    include_str!("../default_config.yaml")
}

pub mod paths {
    //! Path resolution for the gcmon home directory.
    //!
    //! `GCMON_HOME` wins; otherwise `~/.config/gcmon`.

    use std::env;
    use std::path::PathBuf;

    pub const HOME_ENV: &str = "GCMON_HOME";

    pub fn gcmon_home() -> PathBuf {
        if let Some(home) = env::var_os(HOME_ENV) {
            return PathBuf::from(home);
        }
        // No home directory: keep the config next to the working directory.
        dirs::home_dir().map_or_else(
            || PathBuf::from(".gcmon"),
            |home| home.join(".config").join("gcmon"),
        )
    }

    pub fn config_path() -> PathBuf {
        gcmon_home().join("config.yaml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownColumn(#[from] UnknownColumn),

    #[error(
        "invalid stats_mode timer '{0}': expected a positive whole number followed by 's' or 'm'"
    )]
    InvalidTimer(String),

    #[error("invalid min gc duration (msec) {0}: expected a non-negative number")]
    InvalidMinDuration(f64),

    #[error(transparent)]
    InvalidColor(#[from] InvalidColor),
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Home(PathBuf),
    Embedded,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Home(path) => Some(path),
            ConfigSource::Embedded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsMode {
    /// `<n>s` or `<n>m`.
    pub timer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConditions {
    #[serde(
        rename = "min gc duration (msec)",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_gc_duration_msec: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default)]
    pub use_plain_text: bool,
    #[serde(default)]
    pub preset: ThemePreset,
    #[serde(flatten)]
    pub overrides: ThemeOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_mode: Option<StatsMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_conditions: Option<DisplayConditions>,
    #[serde(default)]
    pub theme: ThemeConfig,
}

/// Command-line values that replace file values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub min_duration_msec: Option<f64>,
    pub stats_timer: Option<String>,
}

impl Configuration {
    pub const DEFAULT_COLUMNS: [&str; 4] = ["type", "gen", "pause (ms)", "reason"];

    /// Loads and validates the active configuration.
    ///
    /// # Errors
    /// Returns an error if an explicit path is missing, the file cannot be
    /// read or parsed, or validation fails.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let source = Self::resolve(explicit, &paths::config_path())?;
        let config = match source.path() {
            Some(path) => Self::load_from(path)?,
            None => Self::embedded()?,
        };
        Ok((config, source))
    }

    /// Picks the file to read without reading it.
    ///
    /// # Errors
    /// Returns an error if `explicit` does not exist.
    pub fn resolve(explicit: Option<&Path>, home_config: &Path) -> Result<ConfigSource> {
        if let Some(path) = explicit {
            if !path.is_file() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
            return Ok(ConfigSource::Explicit(path.to_path_buf()));
        }
        if home_config.is_file() {
            return Ok(ConfigSource::Home(home_config.to_path_buf()));
        }
        Ok(ConfigSource::Embedded)
    }

    /// Reads, parses and validates `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config at {}", path.display()))
    }

    /// Parses and validates YAML text.
    ///
    /// # Errors
    /// Returns an error if the YAML does not parse or validation fails.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration shipped in the binary.
    ///
    /// # Errors
    /// Returns an error if the embedded template is invalid.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(default_config_template()).context("Embedded default config is invalid")
    }

    /// Checks everything that would otherwise fail after monitoring starts.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = ColumnRegistry::builtin();
        for key in self.columns.iter().chain(self.available_columns.iter().flatten()) {
            registry.get(key)?;
        }
        self.stats_interval()?;
        self.min_gc_duration_msec()?;
        self.theme()?;
        Ok(())
    }

    /// Applies command-line overrides, then validates again.
    ///
    /// # Errors
    /// Returns an error if an override is invalid.
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(min) = overrides.min_duration_msec {
            self.display_conditions
                .get_or_insert_with(DisplayConditions::default)
                .min_gc_duration_msec = Some(min);
        }
        if let Some(timer) = &overrides.stats_timer {
            self.stats_mode = Some(StatsMode {
                timer: timer.clone(),
            });
        }
        self.validate()
    }

    /// Period of the stats timer, if enabled.
    ///
    /// # Errors
    /// Returns `InvalidTimer` if the timer is malformed.
    pub fn stats_interval(&self) -> Result<Option<Duration>, ConfigError> {
        self.stats_mode
            .as_ref()
            .map(|mode| parse_timer(&mode.timer))
            .transpose()
    }

    /// # Errors
    /// Returns `InvalidMinDuration` for negative or non-finite values.
    pub fn min_gc_duration_msec(&self) -> Result<Option<f64>, ConfigError> {
        let min = self
            .display_conditions
            .as_ref()
            .and_then(|conditions| conditions.min_gc_duration_msec);
        match min {
            Some(value) if !value.is_finite() || value < 0.0 => {
                Err(ConfigError::InvalidMinDuration(value))
            }
            other => Ok(other),
        }
    }

    /// # Errors
    /// Returns the first override that is not a colour.
    pub fn theme(&self) -> Result<Theme, InvalidColor> {
        Theme::preset(self.theme.preset).with_overrides(&self.theme.overrides)
    }

    /// Creates a default config file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        Self::write_config(path, default_config_template())
    }

    /// Renders `Configuration::default()` as YAML.
    ///
    /// `xtask update-default-config` uses this to keep
    /// `default_config.yaml` in sync.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn generate() -> Result<String> {
        let body = serde_yaml::to_string(&Self::default())
            .context("Failed to serialize default config to YAML")?;
        Ok(format!("{HEADER}{body}"))
    }

    /// Writes through a temp file so a crash never leaves half a config.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            columns: Self::DEFAULT_COLUMNS.iter().map(ToString::to_string).collect(),
            available_columns: Some(
                ColumnRegistry::builtin()
                    .iter()
                    .map(|column| column.name.clone())
                    .collect(),
            ),
            stats_mode: None,
            display_conditions: None,
            theme: ThemeConfig::default(),
        }
    }
}

/// Parses `<positive integer><s|m>`.
///
/// # Errors
/// Returns `InvalidTimer` for anything else.
pub fn parse_timer(timer: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTimer(timer.to_string());
    let trimmed = timer.trim();
    let (magnitude, unit) = trimmed
        .split_at_checked(trimmed.len().saturating_sub(1))
        .ok_or_else(invalid)?;
    if !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let magnitude = magnitude
        .parse::<u64>()
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(invalid)?;
    let seconds = match unit {
        "s" => magnitude,
        "m" => magnitude.checked_mul(60).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use crossterm::style::Color;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_embedded_matches_defaults() {
        assert_eq!(Configuration::embedded().unwrap(), Configuration::default());
    }

    #[test]
    fn test_generate_round_trips_through_the_parser() {
        let yaml = Configuration::generate().unwrap();
        assert!(yaml.starts_with("# gcmon configuration"));
        assert_eq!(Configuration::from_yaml(&yaml).unwrap(), Configuration::default());
    }

    #[test]
    fn test_full_config_parses() {
        let config = Configuration::from_yaml(
            r##"
columns: [type, gen, pause (ms), reason, gen0 size (mb)]
available_columns: [index, type]
stats_mode:
  timer: 2m
display_conditions:
  min gc duration (msec): 5.5
theme:
  use_plain_text: true
  preset: light
  header: "#ff8800"
  gen1_row: "153"
"##,
        )
        .unwrap();

        assert_eq!(config.columns.len(), 5);
        assert_eq!(config.stats_interval().unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(config.min_gc_duration_msec().unwrap(), Some(5.5));
        assert!(config.theme.use_plain_text);
        assert_eq!(config.theme.preset, ThemePreset::Light);
        assert_eq!(config.theme.overrides.header.as_deref(), Some("#ff8800"));
        let theme = config.theme().unwrap();
        assert_eq!(theme.rows[1], Color::AnsiValue(153));
    }

    #[test]
    fn test_minimal_config_has_no_options() {
        let config = Configuration::from_yaml("columns: [gen]\n").unwrap();
        assert_eq!(config.stats_interval().unwrap(), None);
        assert_eq!(config.min_gc_duration_msec().unwrap(), None);
        assert_eq!(config.available_columns, None);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = Configuration::from_yaml("columns: [gen, bogus]\n").unwrap_err();
        let root = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(root, ConfigError::UnknownColumn(UnknownColumn(key)) if key == "bogus"));
    }

    #[test]
    fn test_unknown_available_column_is_rejected() {
        let err =
            Configuration::from_yaml("columns: [gen]\navailable_columns: [nope]\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_missing_columns_fails_to_parse() {
        assert!(Configuration::from_yaml("stats_mode:\n  timer: 5s\n").is_err());
    }

    #[test]
    fn test_parse_timer() {
        assert_eq!(parse_timer("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_timer("1m").unwrap(), Duration::from_secs(60));
        for bad in ["", "s", "0s", "-5s", "5h", "5", "1.5m", "five s", "5 s"] {
            assert!(
                matches!(parse_timer(bad), Err(ConfigError::InvalidTimer(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_negative_min_duration_is_rejected() {
        let err = Configuration::from_yaml(
            "columns: [gen]\ndisplay_conditions:\n  min gc duration (msec): -1\n",
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidMinDuration(_))
        ));
    }

    #[test]
    fn test_bad_colour_is_rejected() {
        let err = Configuration::from_yaml("columns: [gen]\ntheme:\n  warning: not-a-colour\n")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = Configuration::default();
        config
            .apply(&ConfigOverrides {
                min_duration_msec: Some(2.5),
                stats_timer: Some("10s".to_string()),
            })
            .unwrap();
        assert_eq!(config.min_gc_duration_msec().unwrap(), Some(2.5));
        assert_eq!(config.stats_interval().unwrap(), Some(Duration::from_secs(10)));

        let bad = config.apply(&ConfigOverrides {
            stats_timer: Some("soon".to_string()),
            ..ConfigOverrides::default()
        });
        assert!(matches!(bad, Err(ConfigError::InvalidTimer(_))));
    }

    #[test]
    fn test_resolve_order() {
        let dir = tempdir().unwrap();
        let home_config = dir.path().join("config.yaml");
        assert_eq!(
            Configuration::resolve(None, &home_config).unwrap(),
            ConfigSource::Embedded
        );

        fs::write(&home_config, "columns: [gen]\n").unwrap();
        assert_eq!(
            Configuration::resolve(None, &home_config).unwrap(),
            ConfigSource::Home(home_config.clone())
        );

        let explicit = dir.path().join("other.yaml");
        assert!(Configuration::resolve(Some(&explicit), &home_config).is_err());
        fs::write(&explicit, "columns: [type]\n").unwrap();
        assert_eq!(
            Configuration::resolve(Some(&explicit), &home_config).unwrap(),
            ConfigSource::Explicit(explicit.clone())
        );
        assert_eq!(
            Configuration::load_from(&explicit).unwrap().columns,
            vec!["type".to_string()]
        );
    }

    #[test]
    fn test_init_creates_config_and_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        Configuration::init(&path).unwrap();
        assert_eq!(Configuration::load_from(&path).unwrap(), Configuration::default());

        let err = Configuration::init(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
