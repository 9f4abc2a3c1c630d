/// Newline-delimited JSON stream collector (TCP push feed and file replay)
pub mod stream_collector;

/// HTTP polling collector
pub mod poll_collector;

pub use poll_collector::PollCollector;
pub use stream_collector::{FileSource, StreamCollector, StreamSource, TcpSource};

use crate::config::FeedConfig;
use crate::error::CollectorError;
use crate::events::SensorReading;
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Lifecycle shared by every feed collector
///
/// A collector owns one background thread that forwards parsed readings over
/// its channel. After `stop()` returns, the thread has been joined and no
/// further readings are sent.
pub trait FeedCollector: Send {
    /// Spawn the background thread; starting a running collector is a no-op
    fn start(&mut self) -> Result<(), CollectorError>;

    /// Signal the background thread and wait for it to finish
    fn stop(&mut self) -> Result<(), CollectorError>;

    /// Whether the background thread is still active
    fn is_running(&self) -> bool;
}

/// Build the collector described by `config`, wired to `channel`
pub fn build_collector(
    config: &FeedConfig,
    channel: Sender<SensorReading>,
) -> Box<dyn FeedCollector> {
    match config {
        FeedConfig::Push {
            address,
            start_signal,
            event_delay_ms,
            connect_timeout_ms,
        } => Box::new(StreamCollector::new(
            TcpSource::new(
                address.clone(),
                start_signal.clone(),
                Duration::from_millis(*connect_timeout_ms),
            ),
            Duration::from_millis(*event_delay_ms),
            channel,
        )),
        FeedConfig::Replay {
            path,
            event_delay_ms,
        } => Box::new(StreamCollector::new(
            FileSource::new(path.clone()),
            Duration::from_millis(*event_delay_ms),
            channel,
        )),
        FeedConfig::Poll {
            url,
            interval_ms,
            predict_url,
            request_timeout_ms,
        } => Box::new(PollCollector::new(
            url.clone(),
            predict_url.clone(),
            Duration::from_millis(*interval_ms),
            Duration::from_millis(*request_timeout_ms),
            channel,
        )),
    }
}

/// Sleep for `duration` in short slices, returning early once `keep_going` is false
///
/// Returns `true` if the full duration elapsed while still running.
pub(crate) fn interruptible_sleep(duration: Duration, keep_going: impl Fn() -> bool) -> bool {
    let slice = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if !keep_going() {
            return false;
        }
        let step = std::cmp::min(remaining, slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    keep_going()
}
