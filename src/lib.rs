/// Error types for the dashboard
pub mod error;

/// Sensor readings, keys and fault predictions
pub mod events;

/// Alert thresholds and display colors
pub mod thresholds;

/// Feed collectors (TCP push, HTTP poll, file replay)
pub mod collectors;

/// Rolling per-sensor history with the run/stop state machine
pub mod aggregator;

/// Snapshots and renderers
pub mod dashboard;

/// Feed subscription lifecycle and the command loop
pub mod session;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use aggregator::{ReadingOutcome, RunState, SensorAggregator};
pub use config::Config;
pub use error::{CollectorError, ConfigError, RenderError};
pub use events::{Prediction, SensorKey, SensorReading};
pub use session::{Command, Session};
