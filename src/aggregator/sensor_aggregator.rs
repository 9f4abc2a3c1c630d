//! Sensor aggregator with per-sensor rolling history
//!
//! This module provides the SensorAggregator which keeps a fixed-capacity FIFO
//! history for each sensor, the latest value snapshot, the latest fault
//! prediction, and the run state of the dashboard.

use crate::events::{Prediction, SensorKey, SensorReading, Timestamp};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of samples kept per sensor unless configured otherwise
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// A single value in a sensor's history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// When the reading carrying this value was received
    pub timestamp: Timestamp,
    /// The measured value
    pub value: f64,
}

/// Whether readings are currently being ingested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Active,
    Inactive,
}

/// What happened to a reading handed to [`SensorAggregator::on_reading`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOutcome {
    /// Ingestion was inactive; nothing changed
    Ignored,
    /// The reading was applied
    Accepted,
    /// The reading was applied and carried a fault, so ingestion stopped
    FaultStop,
}

/// Rolling per-sensor state for one dashboard session
///
/// Histories are kept in chronological ingestion order and never exceed
/// `capacity` entries; when full, the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct SensorAggregator {
    /// History buffers indexed by [`SensorKey::index`]
    histories: [VecDeque<Sample>; 4],
    /// Latest value per sensor
    latest: [Option<f64>; 4],
    /// Latest classification seen while active
    latest_prediction: Option<Prediction>,
    run_state: RunState,
    /// Set when a fault stopped ingestion; cleared by the next start
    critical_fault: bool,
    /// Maximum number of samples per history buffer
    capacity: usize,
}

impl SensorAggregator {
    /// Create an inactive aggregator with empty histories
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of samples to keep per sensor (at least 1)
    ///
    /// # Examples
    ///
    /// ```
    /// use motordash::aggregator::SensorAggregator;
    ///
    /// let aggregator = SensorAggregator::new(30);
    /// assert!(!aggregator.is_running());
    /// ```
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            histories: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
            latest: [None; 4],
            latest_prediction: None,
            run_state: RunState::Inactive,
            critical_fault: false,
            capacity,
        }
    }

    /// Begin accepting readings and clear any previous critical fault
    pub fn start(&mut self) {
        if self.critical_fault {
            info!("Clearing critical fault flag on restart");
        }
        self.critical_fault = false;
        self.run_state = RunState::Active;
    }

    /// Stop accepting readings until the next [`start`](Self::start)
    pub fn stop(&mut self) {
        self.run_state = RunState::Inactive;
    }

    /// Apply one reading from the feed
    ///
    /// Keys missing from the reading keep their previous history and latest
    /// value. A `Fault` prediction stops ingestion and raises the critical
    /// fault flag before returning.
    pub fn on_reading(&mut self, reading: &SensorReading) -> ReadingOutcome {
        if self.run_state == RunState::Inactive {
            debug!("Ignoring reading received while inactive");
            return ReadingOutcome::Ignored;
        }

        for key in SensorKey::ALL {
            match reading.value(key) {
                Some(value) => {
                    let history = &mut self.histories[key.index()];
                    history.push_back(Sample {
                        timestamp: reading.received_at,
                        value,
                    });
                    while history.len() > self.capacity {
                        history.pop_front();
                    }
                    self.latest[key.index()] = Some(value);
                }
                None => warn!("Skipping update for '{}': no usable value", key.label()),
            }
        }

        if let Some(prediction) = reading.prediction {
            self.latest_prediction = Some(prediction);
            if prediction == Prediction::Fault {
                warn!("Fault predicted, stopping ingestion");
                self.stop();
                self.critical_fault = true;
                return ReadingOutcome::FaultStop;
            }
        }

        ReadingOutcome::Accepted
    }

    /// Whether readings are currently accepted
    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Active
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Whether a fault stopped ingestion since the last start
    pub fn critical_fault(&self) -> bool {
        self.critical_fault
    }

    /// History of `key`, oldest first
    pub fn history(&self, key: SensorKey) -> &VecDeque<Sample> {
        &self.histories[key.index()]
    }

    /// History of `key` as parallel X (timestamps) and Y (values) arrays
    pub fn series(&self, key: SensorKey) -> (Vec<Timestamp>, Vec<f64>) {
        self.histories[key.index()]
            .iter()
            .map(|sample| (sample.timestamp, sample.value))
            .unzip()
    }

    /// Latest value of `key`, if any reading has supplied one
    pub fn latest(&self, key: SensorKey) -> Option<f64> {
        self.latest[key.index()]
    }

    pub fn latest_prediction(&self) -> Option<Prediction> {
        self.latest_prediction
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::Utc;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    /// A sequence of temperature values (0-120 readings)
    #[derive(Debug, Clone)]
    struct ValueStream(Vec<f64>);

    impl Arbitrary for ValueStream {
        fn arbitrary(g: &mut Gen) -> Self {
            let size = usize::arbitrary(g) % 121;
            let values = (0..size).map(|_| (i16::arbitrary(g) as f64) / 4.0).collect();
            ValueStream(values)
        }
    }

    /// Generate a history capacity (1-60)
    #[derive(Debug, Clone)]
    struct Capacity(usize);

    impl Arbitrary for Capacity {
        fn arbitrary(g: &mut Gen) -> Self {
            Capacity(usize::arbitrary(g) % 60 + 1)
        }
    }

    fn feed(aggregator: &mut SensorAggregator, values: &[f64]) {
        for value in values {
            let reading = SensorKey::ALL
                .into_iter()
                .fold(SensorReading::new(Utc::now()), |r, key| {
                    r.with_value(key, *value)
                });
            aggregator.on_reading(&reading);
        }
    }

    #[quickcheck]
    fn prop_history_holds_last_values_in_order(stream: ValueStream, capacity: Capacity) -> bool {
        let mut aggregator = SensorAggregator::new(capacity.0);
        aggregator.start();
        feed(&mut aggregator, &stream.0);

        let skip = stream.0.len().saturating_sub(capacity.0);
        let expected: Vec<f64> = stream.0[skip..].to_vec();

        SensorKey::ALL.into_iter().all(|key| {
            let history: Vec<f64> = aggregator.history(key).iter().map(|s| s.value).collect();
            history.len() == stream.0.len().min(capacity.0) && history == expected
        })
    }

    #[quickcheck]
    fn prop_stopped_aggregator_never_mutates(before: ValueStream, after: ValueStream) -> bool {
        let mut aggregator = SensorAggregator::default();
        aggregator.start();
        feed(&mut aggregator, &before.0);
        aggregator.stop();

        let snapshot: Vec<Vec<Sample>> = SensorKey::ALL
            .into_iter()
            .map(|key| aggregator.history(key).iter().copied().collect())
            .collect();
        let latest: Vec<Option<f64>> = SensorKey::ALL
            .into_iter()
            .map(|key| aggregator.latest(key))
            .collect();

        feed(&mut aggregator, &after.0);

        SensorKey::ALL.into_iter().all(|key| {
            aggregator.history(key).iter().copied().collect::<Vec<_>>() == snapshot[key.index()]
                && aggregator.latest(key) == latest[key.index()]
        })
    }
}
