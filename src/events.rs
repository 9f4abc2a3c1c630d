//! Core reading types for the motor sensor dashboard
//!
//! This module defines the four fixed sensor channels, the fault prediction
//! attached to a reading, and the parsing of feed payloads into readings.

use crate::error::CollectorError;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One of the four measurement channels monitored on the motor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKey {
    /// Process temperature in Kelvin
    #[serde(rename = "Process temperature [K]")]
    ProcessTemperature,
    /// Rotational speed in revolutions per minute
    #[serde(rename = "Rotational speed [rpm]")]
    RotationalSpeed,
    /// Torque in Newton-metres
    #[serde(rename = "Torque [Nm]")]
    Torque,
    /// Accumulated tool wear in minutes
    #[serde(rename = "Tool wear [min]")]
    ToolWear,
}

impl SensorKey {
    /// All sensor keys in display order
    pub const ALL: [SensorKey; 4] = [
        SensorKey::ProcessTemperature,
        SensorKey::RotationalSpeed,
        SensorKey::Torque,
        SensorKey::ToolWear,
    ];

    /// Label used on the wire and on screen
    pub fn label(self) -> &'static str {
        match self {
            SensorKey::ProcessTemperature => "Process temperature [K]",
            SensorKey::RotationalSpeed => "Rotational speed [rpm]",
            SensorKey::Torque => "Torque [Nm]",
            SensorKey::ToolWear => "Tool wear [min]",
        }
    }

    /// Look up a key by its wire label
    pub fn from_label(label: &str) -> Option<SensorKey> {
        Self::ALL.into_iter().find(|key| key.label() == label)
    }

    /// Position of this key in [`SensorKey::ALL`]
    pub fn index(self) -> usize {
        match self {
            SensorKey::ProcessTemperature => 0,
            SensorKey::RotationalSpeed => 1,
            SensorKey::Torque => 2,
            SensorKey::ToolWear => 3,
        }
    }
}

/// Binary fault classification produced by the upstream model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    /// Class 0: the motor is operating normally
    Normal,
    /// Class 1: the model predicts a fault
    Fault,
}

impl Prediction {
    /// Map the integer class emitted by the model
    ///
    /// Only 0 and 1 are meaningful; anything else yields `None`.
    pub fn from_code(code: i64) -> Option<Prediction> {
        match code {
            0 => Some(Prediction::Normal),
            1 => Some(Prediction::Fault),
            _ => None,
        }
    }

    /// Integer class as emitted by the model
    pub fn code(self) -> u8 {
        match self {
            Prediction::Normal => 0,
            Prediction::Fault => 1,
        }
    }
}

/// One feed event: values for the sensor keys plus an optional classification
///
/// A key whose value was missing or non-numeric in the payload is absent here,
/// so consumers can skip that key alone instead of rejecting the whole reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// When the reading was received from the feed
    pub received_at: Timestamp,
    /// Values indexed by [`SensorKey::index`]
    values: [Option<f64>; 4],
    /// Fault classification, if the feed supplied one
    pub prediction: Option<Prediction>,
}

impl SensorReading {
    /// Create an empty reading stamped with the given time
    pub fn new(received_at: Timestamp) -> Self {
        Self {
            received_at,
            values: [None; 4],
            prediction: None,
        }
    }

    /// Builder-style setter for a single sensor value
    pub fn with_value(mut self, key: SensorKey, value: f64) -> Self {
        self.values[key.index()] = Some(value);
        self
    }

    /// Builder-style setter for the classification
    pub fn with_prediction(mut self, prediction: Prediction) -> Self {
        self.prediction = Some(prediction);
        self
    }

    /// Value for `key`, or `None` if the feed did not supply a usable one
    pub fn value(&self, key: SensorKey) -> Option<f64> {
        self.values[key.index()]
    }

    /// Keys that carry a value in this reading
    pub fn present_keys(&self) -> impl Iterator<Item = SensorKey> + '_ {
        SensorKey::ALL
            .into_iter()
            .filter(move |key| self.values[key.index()].is_some())
    }

    /// Parse a push-channel event of the form `{"input": {...}, "prediction": 0|1}`
    pub fn from_push_json(line: &str) -> Result<Self, CollectorError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| CollectorError::ParseError(format!("invalid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| CollectorError::ParseError("event is not an object".to_string()))?;
        let input = object
            .get("input")
            .and_then(Value::as_object)
            .ok_or_else(|| CollectorError::ParseError("event has no input object".to_string()))?;

        let mut reading = Self::from_input_map(input);
        reading.prediction = object.get("prediction").and_then(parse_prediction);
        Ok(reading)
    }

    /// Parse a polled payload: a flat object of sensor values, optionally
    /// carrying a `prediction` field
    pub fn from_poll_json(body: &str) -> Result<Self, CollectorError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| CollectorError::ParseError(format!("invalid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| CollectorError::ParseError("payload is not an object".to_string()))?;

        let mut reading = Self::from_input_map(object);
        reading.prediction = object.get("prediction").and_then(parse_prediction);
        Ok(reading)
    }

    /// Sensor values as a labeled JSON object, the shape prediction endpoints expect
    pub fn to_input_json(&self) -> Value {
        let mut map = Map::new();
        for key in self.present_keys() {
            if let Some(value) = self.value(key) {
                map.insert(key.label().to_string(), Value::from(value));
            }
        }
        Value::Object(map)
    }

    fn from_input_map(input: &Map<String, Value>) -> Self {
        let mut reading = SensorReading::new(Utc::now());
        for key in SensorKey::ALL {
            match input.get(key.label()).and_then(Value::as_f64) {
                Some(value) => reading.values[key.index()] = Some(value),
                None => debug!("Reading has no usable value for '{}'", key.label()),
            }
        }
        reading
    }
}

/// Extract a prediction from a JSON value, accepting integers and integral floats
pub(crate) fn parse_prediction(value: &Value) -> Option<Prediction> {
    let code = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
    match code.and_then(Prediction::from_code) {
        Some(prediction) => Some(prediction),
        None => {
            if !value.is_null() {
                debug!("Ignoring unrecognized prediction value: {}", value);
            }
            None
        }
    }
}
