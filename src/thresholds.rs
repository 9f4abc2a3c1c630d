//! Display thresholds and colors for sensor values
//!
//! Thresholds only select a display color. They never drive a control decision.

use crate::events::{Prediction, SensorKey};
use serde::{Deserialize, Serialize};

/// Color used for values above their threshold
pub const ALERT_COLOR: &str = "#e74c3c";

/// Color used for values within range
pub const NORMAL_COLOR: &str = "#222222";

impl SensorKey {
    /// Fixed upper bound above which a value is highlighted
    pub fn threshold(self) -> f64 {
        match self {
            SensorKey::ProcessTemperature => 312.0,
            SensorKey::RotationalSpeed => 1800.0,
            SensorKey::Torque => 55.0,
            SensorKey::ToolWear => 200.0,
        }
    }

    /// Line color of this sensor's chart
    pub fn series_color(self) -> &'static str {
        match self {
            SensorKey::ProcessTemperature => "#ff6384",
            SensorKey::RotationalSpeed => "#36a2eb",
            SensorKey::Torque => "#ffce56",
            SensorKey::ToolWear => "#4bc0c0",
        }
    }
}

/// True iff `value` strictly exceeds the threshold for `key`
pub fn is_alert(key: SensorKey, value: f64) -> bool {
    value > key.threshold()
}

/// Color class of a value box
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DisplayColor {
    Normal,
    Alert,
}

impl DisplayColor {
    /// Color for the latest value of `key`; a missing value is never an alert
    pub fn for_value(key: SensorKey, value: Option<f64>) -> Self {
        match value {
            Some(v) if is_alert(key, v) => DisplayColor::Alert,
            _ => DisplayColor::Normal,
        }
    }

    /// Color for the prediction box
    pub fn for_prediction(prediction: Option<Prediction>) -> Self {
        match prediction {
            Some(Prediction::Fault) => DisplayColor::Alert,
            _ => DisplayColor::Normal,
        }
    }

    /// Hex code of this color
    pub fn hex(self) -> &'static str {
        match self {
            DisplayColor::Normal => NORMAL_COLOR,
            DisplayColor::Alert => ALERT_COLOR,
        }
    }
}
