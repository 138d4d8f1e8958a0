//! Story configuration.
//!
//! Loaded from `config.toml` in the story directory passed on the command
//! line. Derived fields (timezone, start date, author defaults) are resolved
//! once at load time; nothing in the config mutates afterwards.

use std::fs;
use std::io;
use std::path::Path;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use serde::Deserialize;

use crate::model::Author;

const DEFAULT_FUZZ_QUOTIENT: f64 = 0.2;
const DEFAULT_FUZZ_MINIMUM_SECONDS: i64 = 120;

/// Errors from loading or validating the story config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not find config.toml in {0}")]
    Missing(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid start-date {value:?}: expected YYYY/MM/DD")]
    StartDate { value: String },

    #[error("unknown timezone {0:?}")]
    Timezone(String),

    #[error("expected exactly one author with no dispatch code, found {0}")]
    DefaultAuthor(usize),

    #[error("dispatch code {0:?} is used by more than one author")]
    DuplicateCode(String),

    #[error("author account {0:?} appears more than once")]
    DuplicateAccount(String),
}

/// The `[service]` section: where posts go.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    pub endpoint: String,
}

/// Config as written in TOML, before derived fields are resolved.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    timezone: String,
    start_date: String,
    chapter_duration_days: i64,
    #[serde(default = "default_fuzz_quotient")]
    fuzz_quotient: f64,
    #[serde(default = "default_fuzz_minimum_seconds")]
    fuzz_minimum_seconds: i64,
    authors: Vec<Author>,
    service: Option<ServiceConfig>,
}

fn default_fuzz_quotient() -> f64 {
    DEFAULT_FUZZ_QUOTIENT
}

fn default_fuzz_minimum_seconds() -> i64 {
    DEFAULT_FUZZ_MINIMUM_SECONDS
}

/// Resolved story configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub timezone: TimeZone,
    pub start_date: Date,
    pub chapter_duration_days: i64,
    pub fuzz_quotient: f64,
    pub fuzz_minimum_seconds: i64,
    /// In config order; dispatch codes are matched in this order.
    pub authors: Vec<Author>,
    pub service: Option<ServiceConfig>,

    /// Index of the author with the empty dispatch code.
    default_author: usize,
}

impl Config {
    /// Load and validate `config.toml` from the story directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join("config.toml");
        if !path.exists() {
            return Err(ConfigError::Missing(dir.display().to_string()));
        }
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;

        let timezone = TimeZone::get(&raw.timezone)
            .map_err(|_| ConfigError::Timezone(raw.timezone.clone()))?;

        let start_date =
            Date::strptime("%Y/%m/%d", &raw.start_date).map_err(|_| ConfigError::StartDate {
                value: raw.start_date.clone(),
            })?;

        let mut default_author = None;
        let mut default_count = 0;
        for (i, author) in raw.authors.iter().enumerate() {
            if raw.authors[..i].iter().any(|a| a.account == author.account) {
                return Err(ConfigError::DuplicateAccount(author.account.clone()));
            }
            if author.code.is_empty() {
                default_count += 1;
                if default_author.is_none() {
                    default_author = Some(i);
                }
            } else if raw.authors[..i].iter().any(|a| a.code == author.code) {
                return Err(ConfigError::DuplicateCode(author.code.clone()));
            }
        }
        let Some(default_author) = default_author else {
            return Err(ConfigError::DefaultAuthor(0));
        };
        if default_count > 1 {
            return Err(ConfigError::DefaultAuthor(default_count));
        }

        Ok(Self {
            timezone,
            start_date,
            chapter_duration_days: raw.chapter_duration_days,
            fuzz_quotient: raw.fuzz_quotient,
            fuzz_minimum_seconds: raw.fuzz_minimum_seconds,
            authors: raw.authors,
            service: raw.service,
            default_author,
        })
    }

    /// The author with the empty dispatch code.
    pub fn default_author(&self) -> &Author {
        &self.authors[self.default_author]
    }

    /// Look up an author by account id.
    pub fn author_by_account(&self, account: &str) -> Option<&Author> {
        self.authors.iter().find(|a| a.account == account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
timezone = "US/Central"
start-date = "2000/01/01"
chapter-duration-days = 10

[[authors]]
account = "author1"
color = "red"

[[authors]]
account = "author2"
code = "+"

[[authors]]
account = "author3"
code = "-"
"#;

    #[test]
    fn parses_valid_config() {
        let config = Config::from_toml(VALID).unwrap();
        assert_eq!(config.start_date, jiff::civil::date(2000, 1, 1));
        assert_eq!(config.chapter_duration_days, 10);
        assert_eq!(config.default_author().account, "author1");
        assert_eq!(config.authors[1].code, "+");
        // Unset fields fall back to defaults.
        assert!((config.fuzz_quotient - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.fuzz_minimum_seconds, 120);
        assert_eq!(config.authors[1].color, "white");
        assert!(config.service.is_none());
    }

    #[test]
    fn fuzz_overrides_respected() {
        // Top-level keys must precede the [[authors]] tables.
        let toml = VALID.replace(
            "chapter-duration-days = 10",
            "chapter-duration-days = 10\nfuzz-quotient = 0.5\nfuzz-minimum-seconds = 60",
        );
        let config = Config::from_toml(&toml).unwrap();
        assert!((config.fuzz_quotient - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.fuzz_minimum_seconds, 60);
    }

    #[test]
    fn missing_default_author_rejected() {
        let toml = r#"
timezone = "UTC"
start-date = "2000/01/01"
chapter-duration-days = 10

[[authors]]
account = "author1"
code = "+"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultAuthor(0)));
    }

    #[test]
    fn two_default_authors_rejected() {
        let toml = r#"
timezone = "UTC"
start-date = "2000/01/01"
chapter-duration-days = 10

[[authors]]
account = "author1"

[[authors]]
account = "author2"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultAuthor(2)));
    }

    #[test]
    fn default_author_count_is_exact() {
        let toml = r#"
timezone = "UTC"
start-date = "2000/01/01"
chapter-duration-days = 10

[[authors]]
account = "author1"

[[authors]]
account = "author2"

[[authors]]
account = "author3"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultAuthor(3)));
    }

    #[test]
    fn duplicate_code_rejected() {
        let toml = r#"
timezone = "UTC"
start-date = "2000/01/01"
chapter-duration-days = 10

[[authors]]
account = "author1"

[[authors]]
account = "author2"
code = "+"

[[authors]]
account = "author3"
code = "+"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCode(_)));
    }

    #[test]
    fn unknown_timezone_rejected() {
        let toml = VALID.replace("US/Central", "Mars/Olympus_Mons");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Timezone(_)));
    }

    #[test]
    fn bad_start_date_rejected() {
        let toml = VALID.replace("2000/01/01", "01-01-2000");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::StartDate { .. }));
    }

    #[test]
    fn service_section_parsed() {
        let toml = format!("{VALID}\n[service]\nendpoint = \"https://example.com/posts\"\n");
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(
            config.service.unwrap().endpoint,
            "https://example.com/posts"
        );
    }
}
