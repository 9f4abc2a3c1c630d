use crate::aggregator::DEFAULT_HISTORY_CAPACITY;
use crate::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest history window accepted from configuration
const MAX_HISTORY_CAPACITY: usize = 10_000;

/// Application configuration loaded from TOML
///
/// Every section has defaults, so an empty file is a valid configuration:
///
/// ```toml
/// autostart = false
///
/// [feed]
/// mode = "push"
/// address = "127.0.0.1:5001"
/// start_signal = "start_stream"
/// event_delay_ms = 2000
///
/// [history]
/// capacity = 30
///
/// [display]
/// format = "console"
/// color = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Start ingesting as soon as the dashboard comes up
    pub autostart: bool,
    pub feed: FeedConfig,
    pub history: HistoryConfig,
    pub display: DisplayConfig,
}

/// Where readings come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FeedConfig {
    /// Push channel: newline-delimited JSON events over TCP
    Push {
        /// `host:port` of the feed server
        #[serde(default = "default_push_address")]
        address: String,
        /// Line sent after connecting to ask the server to start streaming
        #[serde(default = "default_start_signal")]
        start_signal: String,
        /// Pacing delay applied before each event is shown
        #[serde(default = "default_event_delay_ms")]
        event_delay_ms: u64,
        #[serde(default = "default_timeout_ms")]
        connect_timeout_ms: u64,
    },
    /// Periodic HTTP polling
    Poll {
        /// Endpoint returning a JSON object of sensor values
        #[serde(default = "default_poll_url")]
        url: String,
        #[serde(default = "default_poll_interval_ms")]
        interval_ms: u64,
        /// Optional endpoint that classifies the polled values
        #[serde(default)]
        predict_url: Option<String>,
        #[serde(default = "default_timeout_ms")]
        request_timeout_ms: u64,
    },
    /// Replay of recorded events from a newline-delimited JSON file
    Replay {
        path: PathBuf,
        #[serde(default = "default_event_delay_ms")]
        event_delay_ms: u64,
    },
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig::Push {
            address: default_push_address(),
            start_signal: default_start_signal(),
            event_delay_ms: default_event_delay_ms(),
            connect_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_push_address() -> String {
    "127.0.0.1:5001".to_string()
}

fn default_start_signal() -> String {
    "start_stream".to_string()
}

fn default_event_delay_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_poll_url() -> String {
    "http://127.0.0.1:5001/random_input".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Rolling history settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples kept per sensor
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// How frames are rendered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    /// Human-readable text frames
    #[default]
    Console,
    /// One JSON snapshot per line
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub format: DisplayFormat,
    /// Use ANSI colors in console output
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: DisplayFormat::Console,
            color: true,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.capacity == 0 || self.history.capacity > MAX_HISTORY_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "history.capacity must be between 1 and {}, got {}",
                MAX_HISTORY_CAPACITY, self.history.capacity
            )));
        }

        match &self.feed {
            FeedConfig::Push {
                address,
                connect_timeout_ms,
                ..
            } => {
                if address.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "feed.address must not be empty".to_string(),
                    ));
                }
                if *connect_timeout_ms == 0 {
                    return Err(ConfigError::ValidationError(
                        "feed.connect_timeout_ms must be positive".to_string(),
                    ));
                }
            }
            FeedConfig::Poll {
                url,
                interval_ms,
                predict_url,
                request_timeout_ms,
            } => {
                validate_http_url("feed.url", url)?;
                if let Some(predict_url) = predict_url {
                    validate_http_url("feed.predict_url", predict_url)?;
                }
                if *interval_ms == 0 {
                    return Err(ConfigError::ValidationError(
                        "feed.interval_ms must be positive".to_string(),
                    ));
                }
                if *request_timeout_ms == 0 {
                    return Err(ConfigError::ValidationError(
                        "feed.request_timeout_ms must be positive".to_string(),
                    ));
                }
            }
            FeedConfig::Replay { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "feed.path must not be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{} must be an http(s) URL, got '{}'",
            field, url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.autostart);
        assert_eq!(config.history.capacity, 30);
        assert_eq!(config.display.format, DisplayFormat::Console);
        assert_eq!(
            config.feed,
            FeedConfig::Push {
                address: "127.0.0.1:5001".to_string(),
                start_signal: "start_stream".to_string(),
                event_delay_ms: 2000,
                connect_timeout_ms: 5000,
            }
        );
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        assert_eq!(Config::from_file(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_poll_feed_with_defaults() {
        let file = write_config(
            r#"
autostart = true

[feed]
mode = "poll"
predict_url = "http://127.0.0.1:5002/predict"

[display]
format = "json"
"#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert!(config.autostart);
        assert_eq!(config.display.format, DisplayFormat::Json);
        assert!(config.display.color);
        assert_eq!(
            config.feed,
            FeedConfig::Poll {
                url: "http://127.0.0.1:5001/random_input".to_string(),
                interval_ms: 1000,
                predict_url: Some("http://127.0.0.1:5002/predict".to_string()),
                request_timeout_ms: 5000,
            }
        );
    }

    #[test]
    fn test_replay_feed() {
        let file = write_config(
            r#"
[feed]
mode = "replay"
path = "data/readings.ndjson"
event_delay_ms = 0

[history]
capacity = 60
"#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.history.capacity, 60);
        assert_eq!(
            config.feed,
            FeedConfig::Replay {
                path: PathBuf::from("data/readings.ndjson"),
                event_delay_ms: 0,
            }
        );
    }

    #[test]
    fn test_replay_requires_path() {
        let file = write_config("[feed]\nmode = \"replay\"\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let file = write_config("[feed]\nmode = \"carrier-pigeon\"\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/motordash.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.feed = FeedConfig::Poll {
            url: "ftp://example.com/values".to_string(),
            interval_ms: 1000,
            predict_url: None,
            request_timeout_ms: 1000,
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed = FeedConfig::Poll {
            url: "http://example.com/values".to_string(),
            interval_ms: 0,
            predict_url: None,
            request_timeout_ms: 1000,
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed = FeedConfig::Push {
            address: "  ".to_string(),
            start_signal: String::new(),
            event_delay_ms: 0,
            connect_timeout_ms: 1000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_fail_from_file() {
        let file = write_config("[history]\ncapacity = 0\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            autostart: true,
            feed: FeedConfig::Poll {
                url: "https://plant.example/motor/42".to_string(),
                interval_ms: 250,
                predict_url: None,
                request_timeout_ms: 900,
            },
            history: HistoryConfig { capacity: 12 },
            display: DisplayConfig {
                format: DisplayFormat::Json,
                color: false,
            },
        };

        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
