use chrono::Duration;

use crate::error::ConfigError;

pub const DEFAULT_DB_PATH: &str = "db.sqlite";
pub const DEFAULT_SHEET_RANGE: &str = "Sheet1";

/// One day.
pub const MAX_TIME_LIMIT_MIN: usize = 24 * 60;
pub const MAX_QUESTIONS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: String,
    pub time_limit_min: i64,
    pub verbal_pool: usize,
    pub nonverbal_pool: usize,
    pub verbal_pick: usize,
    pub nonverbal_pick: usize,
    pub sheet: SheetConfig,
}

/// Spreadsheet settings. Missing values are reported when the store is opened,
/// not at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetConfig {
    pub spreadsheet_id: Option<String>,
    pub range: String,
    /// Path to a service-account key file. Preferred over `access_token`.
    pub credentials_path: Option<String>,
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            time_limit_min: 50,
            verbal_pool: 80,
            nonverbal_pool: 80,
            verbal_pick: 35,
            nonverbal_pick: 35,
            sheet: SheetConfig {
                range: DEFAULT_SHEET_RANGE.to_string(),
                ..SheetConfig::default()
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for absent keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            db_path: text("SPI_DB_PATH").unwrap_or(defaults.db_path),
            time_limit_min: number(
                &lookup,
                "SPI_TIME_LIMIT_MIN",
                defaults.time_limit_min as usize,
                MAX_TIME_LIMIT_MIN,
            )? as i64,
            verbal_pool: number(&lookup, "SPI_VERBAL_POOL", defaults.verbal_pool, MAX_QUESTIONS)?,
            nonverbal_pool: number(&lookup, "SPI_NONVERBAL_POOL", defaults.nonverbal_pool, MAX_QUESTIONS)?,
            verbal_pick: number(&lookup, "SPI_VERBAL_PICK", defaults.verbal_pick, MAX_QUESTIONS)?,
            nonverbal_pick: number(&lookup, "SPI_NONVERBAL_PICK", defaults.nonverbal_pick, MAX_QUESTIONS)?,
            sheet: SheetConfig {
                spreadsheet_id: text("SPI_SHEET_ID"),
                range: text("SPI_SHEET_RANGE").unwrap_or(defaults.sheet.range),
                credentials_path: text("GOOGLE_APPLICATION_CREDENTIALS"),
                access_token: text("GOOGLE_SHEETS_TOKEN"),
            },
        })
    }

    pub fn time_limit(&self) -> Duration {
        Duration::minutes(self.time_limit_min)
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
    max: usize,
) -> Result<usize, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<usize>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(ConfigError::InvalidNumber { key, value, max }),
        },
    }
}
