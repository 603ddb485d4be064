use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::{default_db_path, ensure_tally_home};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub suggestions: SuggestionsSection,
    pub stats: StatsSection,
    pub profile: ProfileSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file (default: `<tally home>/tally.db`)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionsSection {
    pub default_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSection {
    pub default_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    /// IANA zone used when printing timestamps and defaulting transaction dates
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for SuggestionsSection {
    fn default() -> Self {
        Self {
            default_limit: tally_suggest::DEFAULT_LIMIT,
        }
    }
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            default_days: tally_suggest::DEFAULT_STATS_DAYS,
        }
    }
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        self.profile
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid [profile] timezone `{}`: {e}", self.profile.timezone))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => default_db_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    save_config_to(&config_path()?, cfg)
}

fn save_config_to(p: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

/// Write the default config unless one exists. Returns its path.
pub fn init_config() -> Result<PathBuf> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(p);
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [profile]
            timezone = "America/Chicago"

            [suggestions]
            default_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.suggestions.default_limit, 5);
        assert_eq!(cfg.stats.default_days, 30);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.timezone().unwrap(), chrono_tz::America::Chicago);
    }

    #[test]
    fn test_bad_timezone_is_reported() {
        let mut cfg = Config::default();
        cfg.profile.timezone = "Mars/Olympus".to_string();
        assert!(cfg.timezone().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        assert_eq!(load_config_from(&p).unwrap(), Config::default());

        let mut cfg = Config::default();
        cfg.database.path = Some(dir.path().join("ledger.db"));
        cfg.stats.default_days = 90;
        save_config_to(&p, &cfg).unwrap();

        assert_eq!(load_config_from(&p).unwrap(), cfg);
    }
}
