use crate::collectors::{interruptible_sleep, FeedCollector};
use crate::error::CollectorError;
use crate::events::SensorReading;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a blocked socket read waits before the running flag is rechecked
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest event line accepted from a feed
const MAX_LINE_BYTES: usize = 64 * 1024;

/// A byte stream carrying newline-delimited JSON reading events
#[cfg_attr(test, mockall::automock)]
pub trait StreamSource: Send + Sync + 'static {
    /// Open the stream, performing any handshake the feed requires
    fn open(&self) -> Result<Box<dyn Read + Send>, CollectorError>;

    /// Human-readable name of the source for log lines
    fn describe(&self) -> String;
}

/// Push feed over TCP
///
/// Connects to the feed server, announces itself with a start signal line and
/// then receives one JSON event per line.
#[derive(Debug, Clone)]
pub struct TcpSource {
    address: String,
    start_signal: String,
    connect_timeout: Duration,
}

impl TcpSource {
    /// Create a TCP source
    ///
    /// # Arguments
    ///
    /// * `address` - `host:port` of the feed server
    /// * `start_signal` - Line written once connected (e.g. `start_stream`)
    /// * `connect_timeout` - Upper bound on connection establishment
    pub fn new(address: String, start_signal: String, connect_timeout: Duration) -> Self {
        Self {
            address,
            start_signal,
            connect_timeout,
        }
    }
}

impl StreamSource for TcpSource {
    fn open(&self) -> Result<Box<dyn Read + Send>, CollectorError> {
        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|e| CollectorError::ConnectFailed(format!("{}: {}", self.address, e)))?
            .next()
            .ok_or_else(|| {
                CollectorError::ConnectFailed(format!("{}: no address resolved", self.address))
            })?;

        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| CollectorError::ConnectFailed(format!("{}: {}", self.address, e)))?;

        // Bounded reads so shutdown is noticed while the server is quiet
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        if !self.start_signal.is_empty() {
            debug!("Sending start signal '{}' to {}", self.start_signal, self.address);
            stream.write_all(self.start_signal.as_bytes())?;
            stream.write_all(b"\n")?;
            stream.flush()?;
        }

        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Replay of recorded reading events from a newline-delimited JSON file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StreamSource for FileSource {
    fn open(&self) -> Result<Box<dyn Read + Send>, CollectorError> {
        let file = File::open(&self.path).map_err(|e| {
            CollectorError::ConnectFailed(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Collector for newline-delimited JSON reading events
///
/// Opens its [`StreamSource`] on start, then forwards each parsed event over
/// the output channel after a fixed pacing delay. Malformed lines are skipped.
/// When the stream ends or fails the collector finishes; reconnecting is left
/// to whoever owns the collector.
pub struct StreamCollector<S: StreamSource> {
    /// Where events come from
    source: Arc<S>,
    /// Delay applied before forwarding each event
    event_delay: Duration,
    /// Channel to send parsed readings
    output_channel: Sender<SensorReading>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Shared state for controlling the collector
    running: Arc<AtomicBool>,
}

impl<S: StreamSource> StreamCollector<S> {
    /// Create a new StreamCollector
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::mpsc;
    /// use std::time::Duration;
    /// use motordash::collectors::{StreamCollector, TcpSource};
    ///
    /// let (tx, rx) = mpsc::channel();
    /// let source = TcpSource::new(
    ///     "127.0.0.1:5001".to_string(),
    ///     "start_stream".to_string(),
    ///     Duration::from_secs(5),
    /// );
    /// let collector = StreamCollector::new(source, Duration::from_secs(2), tx);
    /// ```
    pub fn new(source: S, event_delay: Duration, channel: Sender<SensorReading>) -> Self {
        Self {
            source: Arc::new(source),
            event_delay,
            output_channel: channel,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read events from `reader` until EOF, error, or shutdown
    ///
    /// Lines are split on raw bytes and decoded only once complete. A line
    /// longer than `MAX_LINE_BYTES` is discarded up to its terminating newline.
    fn process_stream(
        mut reader: Box<dyn Read + Send>,
        channel: &Sender<SensorReading>,
        running: &AtomicBool,
        event_delay: Duration,
    ) -> Result<(), CollectorError> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut temp_buf = [0u8; 4096];
        let mut discarding = false;

        loop {
            if !running.load(Ordering::SeqCst) {
                debug!("Stopping stream processing due to shutdown signal");
                return Ok(());
            }

            match reader.read(&mut temp_buf) {
                Ok(0) => {
                    debug!("Feed stream closed");
                    break;
                }
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);

                    while let Some(line) = take_line(&mut buffer) {
                        if discarding {
                            discarding = false;
                            continue;
                        }

                        if !Self::forward_line(&line, channel, running, event_delay) {
                            return Ok(());
                        }
                    }

                    if buffer.len() > MAX_LINE_BYTES {
                        if !discarding {
                            warn!("Discarding feed line longer than {} bytes", MAX_LINE_BYTES);
                        }
                        buffer.clear();
                        discarding = true;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CollectorError::IoError(e)),
            }
        }

        // A final event may lack its trailing newline
        if !discarding {
            Self::forward_line(&String::from_utf8_lossy(&buffer), channel, running, event_delay);
        }
        Ok(())
    }

    /// Parse and forward one line; returns `false` once forwarding should stop
    fn forward_line(
        line: &str,
        channel: &Sender<SensorReading>,
        running: &AtomicBool,
        event_delay: Duration,
    ) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        let reading = match SensorReading::from_push_json(line) {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Failed to parse feed event '{}': {}", line, e);
                return true;
            }
        };

        if !event_delay.is_zero()
            && !interruptible_sleep(event_delay, || running.load(Ordering::SeqCst))
        {
            debug!("Dropping paced event due to shutdown signal");
            return false;
        }

        if let Err(e) = channel.send(reading) {
            warn!("Failed to send reading to channel: {}", e);
            return false;
        }
        true
    }

    fn collector_thread(
        source: Arc<S>,
        reader: Box<dyn Read + Send>,
        channel: Sender<SensorReading>,
        running: Arc<AtomicBool>,
        event_delay: Duration,
    ) {
        let name = source.describe();
        info!("Stream collector thread started for {}", name);

        if let Err(e) = Self::process_stream(reader, &channel, &running, event_delay) {
            error!("Error reading feed {}: {}", name, e);
        }

        running.store(false, Ordering::SeqCst);
        info!("Stream collector thread finished for {}", name);
    }
}

/// Remove the first complete line from `buffer` and decode it
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let newline_pos = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
    Some(String::from_utf8_lossy(&line[..newline_pos]).into_owned())
}

impl<S: StreamSource> FeedCollector for StreamCollector<S> {
    /// Open the source and spawn the forwarding thread
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::ConnectFailed` if the source cannot be opened.
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("StreamCollector already running, skipping start");
            return Ok(());
        }

        // Reap a thread that already finished on its own
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let reader = match self.source.open() {
            Ok(reader) => reader,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let source = Arc::clone(&self.source);
        let channel = self.output_channel.clone();
        let running = Arc::clone(&self.running);
        let event_delay = self.event_delay;

        let handle = thread::spawn(move || {
            Self::collector_thread(source, reader, channel, running, event_delay);
        });

        self.thread_handle = Some(handle);
        info!(
            "StreamCollector started on {} with event delay {:?}",
            self.source.describe(),
            self.event_delay
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CollectorError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                CollectorError::ThreadTerminated("Failed to join collector thread".to_string())
            })?;
            info!("StreamCollector stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<S: StreamSource> Drop for StreamCollector<S> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
