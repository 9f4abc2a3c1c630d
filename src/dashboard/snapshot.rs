use crate::aggregator::SensorAggregator;
use crate::events::{Prediction, SensorKey, Timestamp};
use crate::thresholds::DisplayColor;
use serde::{Deserialize, Serialize};

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    /// Whether readings are being ingested
    pub running: bool,
    /// A fault stopped ingestion and no start has happened since
    pub critical_fault: bool,
    /// Latest fault classification, if any was received
    pub prediction: Option<Prediction>,
    pub prediction_color: DisplayColor,
    /// One panel per sensor in display order
    pub panels: Vec<SensorPanel>,
}

/// Value box and chart data for one sensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorPanel {
    pub sensor: SensorKey,
    pub label: String,
    pub latest: Option<f64>,
    pub color: DisplayColor,
    /// Line color of the chart
    pub series_color: String,
    /// Timestamps of the history, oldest first
    pub x: Vec<Timestamp>,
    /// Values of the history, parallel to `x`
    pub y: Vec<f64>,
}

impl DashboardSnapshot {
    /// Capture the current state of `aggregator`
    pub fn capture(aggregator: &SensorAggregator) -> Self {
        let panels = SensorKey::ALL
            .into_iter()
            .map(|key| {
                let latest = aggregator.latest(key);
                let (x, y) = aggregator.series(key);
                SensorPanel {
                    sensor: key,
                    label: key.label().to_string(),
                    latest,
                    color: DisplayColor::for_value(key, latest),
                    series_color: key.series_color().to_string(),
                    x,
                    y,
                }
            })
            .collect();

        let prediction = aggregator.latest_prediction();
        Self {
            running: aggregator.is_running(),
            critical_fault: aggregator.critical_fault(),
            prediction,
            prediction_color: DisplayColor::for_prediction(prediction),
            panels,
        }
    }

    /// Whether the critical fault banner should be shown
    pub fn show_critical_warning(&self) -> bool {
        self.critical_fault && !self.running
    }

    /// Panel for `key`
    pub fn panel(&self, key: SensorKey) -> &SensorPanel {
        &self.panels[key.index()]
    }
}
