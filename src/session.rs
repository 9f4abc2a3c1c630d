//! Dashboard session: the single event path from feed to screen
//!
//! A [`Session`] owns the aggregator, the renderer and at most one active
//! [`FeedSubscription`]. Every reading and every control command is handled on
//! the thread that calls [`Session::run`], one at a time.

use crate::aggregator::{ReadingOutcome, SensorAggregator};
use crate::collectors::{build_collector, FeedCollector};
use crate::config::Config;
use crate::dashboard::{DashboardSnapshot, Renderer};
use crate::error::CollectorError;
use crate::events::SensorReading;
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// How long the session waits for a reading before checking for commands
const FEED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builds a collector wired to the given channel
pub type CollectorFactory = Box<dyn Fn(Sender<SensorReading>) -> Box<dyn FeedCollector> + Send>;

/// User control input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Start when stopped, stop when running
    Toggle,
    Quit,
}

impl Command {
    /// Parse a line typed on the control input
    ///
    /// An empty line toggles, like pressing the dashboard's start/stop button.
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim().to_lowercase().as_str() {
            "" | "toggle" | "t" => Some(Command::Toggle),
            "start" | "s" => Some(Command::Start),
            "stop" | "p" => Some(Command::Stop),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// An active collector together with the receiving end of its channel
///
/// Dropping the subscription stops and joins the collector and drops the
/// receiver, so nothing sent through it can be observed afterwards.
pub struct FeedSubscription {
    collector: Box<dyn FeedCollector>,
    receiver: Receiver<SensorReading>,
}

impl FeedSubscription {
    /// Create a fresh channel and start a collector on it
    pub fn open(factory: &CollectorFactory) -> Result<Self, CollectorError> {
        let (sender, receiver) = mpsc::channel();
        let mut collector = factory(sender);
        collector.start()?;
        Ok(Self {
            collector,
            receiver,
        })
    }

    /// Stop the collector and release the channel
    pub fn close(mut self) -> Result<(), CollectorError> {
        self.collector.stop()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Err(e) = self.collector.stop() {
            error!("Failed to stop feed collector: {}", e);
        }
    }
}

/// One dashboard session
pub struct Session {
    aggregator: SensorAggregator,
    renderer: Box<dyn Renderer>,
    factory: CollectorFactory,
    subscription: Option<FeedSubscription>,
}

impl Session {
    /// Create a stopped session
    ///
    /// # Arguments
    ///
    /// * `capacity` - History samples kept per sensor
    /// * `renderer` - Receives a frame after every state change
    /// * `factory` - Builds a new collector for every start
    pub fn new(capacity: usize, renderer: Box<dyn Renderer>, factory: CollectorFactory) -> Self {
        Self {
            aggregator: SensorAggregator::new(capacity),
            renderer,
            factory,
            subscription: None,
        }
    }

    /// Create a stopped session whose feed is described by `config`
    pub fn from_config(config: &Config, renderer: Box<dyn Renderer>) -> Self {
        let feed = config.feed.clone();
        let factory: CollectorFactory = Box::new(move |sender| build_collector(&feed, sender));
        Self::new(config.history.capacity, renderer, factory)
    }

    /// Subscribe to the feed and begin ingesting
    ///
    /// Clears the critical fault flag. Starting while already subscribed is a
    /// no-op; starting while running without a subscription (the feed ended)
    /// resubscribes.
    ///
    /// # Errors
    ///
    /// Returns the collector's error if the feed cannot be opened; the session
    /// then stays stopped.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.aggregator.is_running() && self.subscription.is_some() {
            debug!("Session already running");
            return Ok(());
        }

        match FeedSubscription::open(&self.factory) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.aggregator.start();
                info!("Session started");
                self.render();
                Ok(())
            }
            Err(e) => {
                error!("Failed to subscribe to feed: {}", e);
                self.aggregator.stop();
                self.render();
                Err(e)
            }
        }
    }

    /// Stop ingesting and release the feed subscription
    pub fn stop(&mut self) {
        self.aggregator.stop();
        self.release_subscription();
        info!("Session stopped");
        self.render();
    }

    /// Start when stopped, stop when running
    pub fn toggle(&mut self) -> Result<(), CollectorError> {
        if self.aggregator.is_running() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    /// Wait up to `timeout` for one reading and apply it
    ///
    /// Returns `None` if nothing arrived. A fault releases the subscription
    /// before this returns.
    pub fn process_next(&mut self, timeout: Duration) -> Option<ReadingOutcome> {
        let received = match &self.subscription {
            Some(subscription) => subscription.receiver.recv_timeout(timeout),
            None => return None,
        };

        match received {
            Ok(reading) => Some(self.apply(reading)),
            Err(RecvTimeoutError::Timeout) => {
                if self.feed_ended() {
                    self.drain_ended_feed()
                } else {
                    None
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Feed channel disconnected");
                self.release_subscription();
                None
            }
        }
    }

    /// Apply one control command; returns `false` when the session should end
    pub fn handle_command(&mut self, command: Command) -> bool {
        debug!("Handling command {:?}", command);
        match command {
            Command::Start => {
                if let Err(e) = self.start() {
                    warn!("Start failed: {}", e);
                }
            }
            Command::Stop => self.stop(),
            Command::Toggle => {
                if let Err(e) = self.toggle() {
                    warn!("Start failed: {}", e);
                }
            }
            Command::Quit => return false,
        }
        true
    }

    /// Process commands and readings until `Quit` or the command channel closes
    ///
    /// The subscription is released before returning.
    pub fn run(&mut self, commands: Receiver<Command>) {
        info!("Session loop started");
        self.render();

        loop {
            if self.subscription.is_some() {
                match commands.try_recv() {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                        continue;
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => break,
                }
                self.process_next(FEED_POLL_INTERVAL);
            } else {
                // Nothing to ingest: block until the user acts
                match commands.recv() {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }

        self.release_subscription();
        info!("Session loop finished");
    }

    pub fn aggregator(&self) -> &SensorAggregator {
        &self.aggregator
    }

    /// Whether a feed subscription is currently held
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::capture(&self.aggregator)
    }

    fn apply(&mut self, reading: SensorReading) -> ReadingOutcome {
        let outcome = self.aggregator.on_reading(&reading);
        match outcome {
            ReadingOutcome::Ignored => {}
            ReadingOutcome::Accepted => self.render(),
            ReadingOutcome::FaultStop => {
                warn!("Critical fault detected, detaching from feed");
                self.release_subscription();
                self.render();
            }
        }
        outcome
    }

    fn feed_ended(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|subscription| !subscription.collector.is_running())
            .unwrap_or(false)
    }

    /// Apply whatever the finished collector left in the channel, then release it
    fn drain_ended_feed(&mut self) -> Option<ReadingOutcome> {
        warn!("Feed ended; start again to resubscribe");
        let mut last = None;
        while let Some(Ok(reading)) = self
            .subscription
            .as_ref()
            .map(|subscription| subscription.receiver.try_recv())
        {
            last = Some(self.apply(reading));
        }
        self.release_subscription();
        last
    }

    fn release_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.close() {
                error!("Failed to close feed subscription: {}", e);
            }
        }
    }

    fn render(&mut self) {
        let snapshot = DashboardSnapshot::capture(&self.aggregator);
        if let Err(e) = self.renderer.render(&snapshot) {
            error!("Failed to render dashboard: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::MockRenderer;
    use crate::events::{Prediction, SensorKey};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Collector that sends a fixed script of readings when started
    struct ScriptedCollector {
        script: Vec<SensorReading>,
        channel: Sender<SensorReading>,
        running: Arc<AtomicBool>,
        stops: Arc<AtomicUsize>,
        /// Leave the collector running after the script is sent
        keep_running: bool,
    }

    impl FeedCollector for ScriptedCollector {
        fn start(&mut self) -> Result<(), CollectorError> {
            self.running.store(true, Ordering::SeqCst);
            for reading in self.script.drain(..) {
                let _ = self.channel.send(reading);
            }
            if !self.keep_running {
                self.running.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CollectorError> {
            if self.running.swap(false, Ordering::SeqCst) {
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        opens: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        frames: Arc<Mutex<Vec<DashboardSnapshot>>>,
    }

    fn temperature(value: f64) -> SensorReading {
        SensorReading::new(Utc::now()).with_value(SensorKey::ProcessTemperature, value)
    }

    fn recording_renderer(frames: Arc<Mutex<Vec<DashboardSnapshot>>>) -> Box<dyn Renderer> {
        let mut renderer = MockRenderer::new();
        renderer.expect_render().returning(move |snapshot| {
            frames.lock().unwrap().push(snapshot.clone());
            Ok(())
        });
        Box::new(renderer)
    }

    /// Session whose every subscription replays `script`
    fn scripted_session(script: Vec<SensorReading>, keep_running: bool) -> (Session, Harness) {
        let opens = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(Mutex::new(Vec::new()));

        let factory: CollectorFactory = {
            let opens = Arc::clone(&opens);
            let stops = Arc::clone(&stops);
            Box::new(move |channel| {
                opens.fetch_add(1, Ordering::SeqCst);
                Box::new(ScriptedCollector {
                    script: script.clone(),
                    channel,
                    running: Arc::new(AtomicBool::new(false)),
                    stops: Arc::clone(&stops),
                    keep_running,
                }) as Box<dyn FeedCollector>
            })
        };

        let session = Session::new(30, recording_renderer(Arc::clone(&frames)), factory);
        (
            session,
            Harness {
                opens,
                stops,
                frames,
            },
        )
    }

    fn temperatures(session: &Session) -> Vec<f64> {
        session
            .aggregator()
            .history(SensorKey::ProcessTemperature)
            .iter()
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse(""), Some(Command::Toggle));
        assert_eq!(Command::parse(" START \n"), Some(Command::Start));
        assert_eq!(Command::parse("stop"), Some(Command::Stop));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("reboot"), None);
    }

    #[test]
    fn test_start_subscribes_and_processes_readings() {
        let (mut session, harness) =
            scripted_session(vec![temperature(300.0), temperature(301.0)], true);

        assert!(session.start().is_ok());
        assert!(session.is_subscribed());
        assert_eq!(harness.opens.load(Ordering::SeqCst), 1);

        let timeout = Duration::from_millis(50);
        assert_eq!(session.process_next(timeout), Some(ReadingOutcome::Accepted));
        assert_eq!(session.process_next(timeout), Some(ReadingOutcome::Accepted));
        assert_eq!(session.process_next(timeout), None);

        assert_eq!(temperatures(&session), vec![300.0, 301.0]);
        // One frame for start plus one per reading
        assert_eq!(harness.frames.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_second_start_is_noop() {
        let (mut session, harness) = scripted_session(vec![], true);

        assert!(session.start().is_ok());
        assert!(session.start().is_ok());
        assert_eq!(harness.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_releases_subscription_and_discards_pending_readings() {
        let (mut session, harness) =
            scripted_session(vec![temperature(300.0), temperature(301.0)], true);

        session.start().unwrap();
        session.stop();

        assert!(!session.is_subscribed());
        assert_eq!(harness.stops.load(Ordering::SeqCst), 1);
        assert_eq!(session.process_next(Duration::from_millis(10)), None);
        assert!(temperatures(&session).is_empty());
        assert!(!harness.frames.lock().unwrap().last().unwrap().running);
    }

    #[test]
    fn test_fault_stops_session_and_detaches() {
        let script = vec![
            temperature(300.0),
            temperature(330.0).with_prediction(Prediction::Fault),
            temperature(340.0),
        ];
        let (mut session, harness) = scripted_session(script, true);

        session.start().unwrap();
        let timeout = Duration::from_millis(50);
        assert_eq!(session.process_next(timeout), Some(ReadingOutcome::Accepted));
        assert_eq!(session.process_next(timeout), Some(ReadingOutcome::FaultStop));

        assert!(!session.is_subscribed());
        assert!(!session.aggregator().is_running());
        assert!(session.aggregator().critical_fault());
        assert_eq!(harness.stops.load(Ordering::SeqCst), 1);

        // The reading queued after the fault never reaches the aggregator
        assert_eq!(session.process_next(timeout), None);
        assert_eq!(temperatures(&session), vec![300.0, 330.0]);
        assert!(harness
            .frames
            .lock()
            .unwrap()
            .last()
            .unwrap()
            .show_critical_warning());

        // Restart clears the fault and resubscribes
        session.start().unwrap();
        assert!(!session.aggregator().critical_fault());
        assert_eq!(harness.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ended_feed_is_drained_then_released() {
        let (mut session, _harness) =
            scripted_session(vec![temperature(300.0), temperature(305.0)], false);

        session.start().unwrap();
        let timeout = Duration::from_millis(20);
        while session.is_subscribed() {
            session.process_next(timeout);
        }

        assert_eq!(temperatures(&session), vec![300.0, 305.0]);
        // A feed ending is not a stop request
        assert!(session.aggregator().is_running());

        // Starting again resubscribes
        session.start().unwrap();
        assert!(session.is_subscribed());
    }

    #[test]
    fn test_failed_start_leaves_session_stopped() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let factory: CollectorFactory = Box::new(|channel| {
            let source = crate::collectors::FileSource::new("/nonexistent/feed.ndjson".into());
            Box::new(crate::collectors::StreamCollector::new(
                source,
                Duration::ZERO,
                channel,
            )) as Box<dyn FeedCollector>
        });
        let mut session = Session::new(30, recording_renderer(Arc::clone(&frames)), factory);

        assert!(session.start().is_err());
        assert!(!session.aggregator().is_running());
        assert!(!session.is_subscribed());
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_toggle() {
        let (mut session, _harness) = scripted_session(vec![], true);

        assert!(session.toggle().is_ok());
        assert!(session.aggregator().is_running());
        assert!(session.toggle().is_ok());
        assert!(!session.aggregator().is_running());
        assert!(!session.is_subscribed());
    }

    #[test]
    fn test_run_loop_until_quit() {
        let (mut session, harness) =
            scripted_session(vec![temperature(310.0), temperature(311.0)], true);
        let (commands, receiver) = mpsc::channel();

        commands.send(Command::Start).unwrap();
        let quitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            commands.send(Command::Quit).unwrap();
        });

        session.run(receiver);
        quitter.join().unwrap();

        assert_eq!(temperatures(&session), vec![310.0, 311.0]);
        assert!(!session.is_subscribed());
        assert_eq!(harness.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_loop_ends_when_commands_close() {
        let (mut session, _harness) = scripted_session(vec![], true);
        let (commands, receiver) = mpsc::channel();
        drop(commands);

        session.run(receiver);
        assert!(!session.is_subscribed());
    }

    #[test]
    fn test_from_config_builds_stopped_session() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let session = Session::from_config(&Config::default(), recording_renderer(frames));

        assert!(!session.aggregator().is_running());
        assert_eq!(session.aggregator().capacity(), 30);
        assert_eq!(session.snapshot().panels.len(), 4);
    }
}
