/// Frame data captured from the aggregator
pub mod snapshot;

/// Console and JSON renderers
pub mod renderer;

pub use renderer::{sparkline, ConsoleRenderer, JsonRenderer, Renderer};
pub use snapshot::{DashboardSnapshot, SensorPanel};

#[cfg(test)]
pub use renderer::MockRenderer;
