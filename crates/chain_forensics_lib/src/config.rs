use chrono::Duration;
use num_bigint::BigUint;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::ForensicError;
use crate::patterns::PatternThresholds;
use crate::report::{ReportRequest, DEFAULT_INVESTIGATOR, DEFAULT_REPORT_TITLE};
use crate::err_from;

pub const DEFAULT_CONFIG_FILE: &str = "config-forensics.toml";
pub const DEFAULT_DB_FILE: &str = "forensics.sqlite";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DB_FILE_ENV: &str = "DB_SQLITE_FILENAME";

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub db: Db,
    #[serde(default)]
    pub patterns: Patterns,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub server: Server,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Db {
    pub file: String,
}

impl Default for Db {
    fn default() -> Self {
        Db {
            file: DEFAULT_DB_FILE.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Patterns {
    pub rapid_transfer_secs: Option<i64>,
    /// Decimal string in native units (wei).
    pub high_value_threshold: Option<String>,
    pub repeated_value_min_count: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Report {
    pub investigator: String,
    pub title: String,
}

impl Default for Report {
    fn default() -> Self {
        Report {
            investigator: DEFAULT_INVESTIGATOR.to_string(),
            title: DEFAULT_REPORT_TITLE.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Server {
    pub bind: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ForensicError> {
        let content = fs::read_to_string(path).map_err(err_from!())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ForensicError> {
        toml::from_str(content).map_err(err_from!())
    }

    /// Like `load`, but a missing file gives the defaults. The database file
    /// can be overridden with `DB_SQLITE_FILENAME`.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ForensicError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            log::debug!("Config file {} not found, using defaults", path.display());
            Config::default()
        };
        if let Ok(db_file) = env::var(DB_FILE_ENV) {
            if !db_file.trim().is_empty() {
                config.db.file = db_file;
            }
        }
        Ok(config)
    }

    pub fn pattern_thresholds(&self) -> Result<PatternThresholds, ForensicError> {
        let mut thresholds = PatternThresholds::default();
        if let Some(secs) = self.patterns.rapid_transfer_secs {
            if secs <= 0 {
                return Err(ForensicError::ConfigError(format!(
                    "rapid-transfer-secs must be positive, got {}",
                    secs
                )));
            }
            thresholds.rapid_transfer_window = Duration::seconds(secs);
        }
        if let Some(threshold) = &self.patterns.high_value_threshold {
            thresholds.high_value_threshold = threshold.trim().parse::<BigUint>().map_err(|_| {
                ForensicError::ConfigError(format!("Invalid high-value-threshold: {}", threshold))
            })?;
        }
        if let Some(count) = self.patterns.repeated_value_min_count {
            if count < 2 {
                return Err(ForensicError::ConfigError(format!(
                    "repeated-value-min-count must be at least 2, got {}",
                    count
                )));
            }
            thresholds.repeated_value_min_count = count;
        }
        Ok(thresholds)
    }

    /// Report header defaults; the case id is left for the composer.
    pub fn report_request(&self) -> ReportRequest {
        ReportRequest {
            case_id: None,
            title: Some(self.report.title.clone()),
            investigator: Some(self.report.investigator.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[db]
file = "case.sqlite"

[patterns]
rapid-transfer-secs = 30
high-value-threshold = "5000"
repeated-value-min-count = 4

[report]
investigator = "J. Doe"
title = "Case 12"

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(config.db.file, "case.sqlite");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        let thresholds = config.pattern_thresholds().unwrap();
        assert_eq!(thresholds.rapid_transfer_window, Duration::seconds(30));
        assert_eq!(thresholds.high_value_threshold, BigUint::from(5000u32));
        assert_eq!(thresholds.repeated_value_min_count, 4);
        assert_eq!(config.report_request().investigator.as_deref(), Some("J. Doe"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pattern_thresholds().unwrap(), PatternThresholds::default());
        assert_eq!(config.report.title, DEFAULT_REPORT_TITLE);
    }

    #[test]
    fn test_invalid_thresholds() {
        let config = Config::parse("[patterns]\nhigh-value-threshold = \"lots\"").unwrap();
        assert_eq!(
            config.pattern_thresholds().unwrap_err().kind(),
            ErrorKind::Configuration
        );
        let err = Config::parse("[server]\nbind = 5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
