/// TOML configuration with defaults and validation
pub mod settings;

pub use settings::{Config, DisplayConfig, DisplayFormat, FeedConfig, HistoryConfig};
