/// Per-sensor rolling history and run state
pub mod sensor_aggregator;

pub use sensor_aggregator::{
    ReadingOutcome, RunState, Sample, SensorAggregator, DEFAULT_HISTORY_CAPACITY,
};
