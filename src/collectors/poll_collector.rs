use crate::collectors::FeedCollector;
use crate::error::CollectorError;
use crate::events::{parse_prediction, Prediction, SensorReading};
use log::{debug, error, info, warn};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

/// Collector that polls an HTTP endpoint for sensor readings
///
/// Every `interval` it fetches a JSON object of sensor values from `url`.
/// When a prediction endpoint is configured, the values are posted there and
/// the returned `prediction` is attached to the reading. A failed fetch is
/// logged and the tick is skipped; the next tick tries again.
pub struct PollCollector {
    /// Endpoint returning the current sensor values
    url: String,
    /// Optional endpoint classifying a set of sensor values
    predict_url: Option<String>,
    /// Time between polls
    interval: Duration,
    /// Upper bound on each HTTP request
    request_timeout: Duration,
    /// Channel to send parsed readings
    output_channel: Sender<SensorReading>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Shared state for controlling the collector
    running: Arc<AtomicBool>,
    /// Wakes the polling thread out of an in-flight request or wait
    shutdown: Option<Arc<Notify>>,
}

impl PollCollector {
    /// Create a new PollCollector
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::mpsc;
    /// use std::time::Duration;
    /// use motordash::collectors::PollCollector;
    ///
    /// let (tx, rx) = mpsc::channel();
    /// let collector = PollCollector::new(
    ///     "http://127.0.0.1:5001/random_input".to_string(),
    ///     Some("http://127.0.0.1:5002/predict".to_string()),
    ///     Duration::from_secs(1),
    ///     Duration::from_secs(5),
    ///     tx,
    /// );
    /// ```
    pub fn new(
        url: String,
        predict_url: Option<String>,
        interval: Duration,
        request_timeout: Duration,
        channel: Sender<SensorReading>,
    ) -> Self {
        Self {
            url,
            predict_url,
            interval,
            request_timeout,
            output_channel: channel,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: None,
        }
    }

    /// Fetch one reading, attaching a prediction when an endpoint is configured
    async fn fetch_reading(
        client: &Client,
        url: &str,
        predict_url: Option<&str>,
    ) -> Result<SensorReading, CollectorError> {
        let body = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let mut reading = SensorReading::from_poll_json(&body)?;

        if let Some(predict_url) = predict_url {
            match Self::request_prediction(client, predict_url, &reading).await {
                Ok(prediction) => reading.prediction = prediction,
                Err(e) => warn!("Prediction request to {} failed: {}", predict_url, e),
            }
        }

        Ok(reading)
    }

    /// Post sensor values to a prediction endpoint and read `{"prediction": 0|1}`
    async fn request_prediction(
        client: &Client,
        predict_url: &str,
        reading: &SensorReading,
    ) -> Result<Option<Prediction>, CollectorError> {
        let body: Value = client
            .post(predict_url)
            .json(&reading.to_input_json())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body.get("prediction").and_then(parse_prediction))
    }

    #[allow(clippy::too_many_arguments)]
    fn collector_thread(
        runtime: Runtime,
        client: Client,
        url: String,
        predict_url: Option<String>,
        interval: Duration,
        channel: Sender<SensorReading>,
        running: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
    ) {
        info!("Poll collector thread started for {}", url);

        // Requests and waits both race the shutdown signal
        runtime.block_on(async {
            while running.load(Ordering::SeqCst) {
                let tick_started = Instant::now();

                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("Poll request abandoned due to shutdown signal");
                        break;
                    }
                    result = Self::fetch_reading(&client, &url, predict_url.as_deref()) => {
                        match result {
                            Ok(reading) => {
                                debug!("Polled reading with prediction {:?}", reading.prediction);
                                if let Err(e) = channel.send(reading) {
                                    warn!("Failed to send reading to channel: {}", e);
                                    break;
                                }
                            }
                            Err(e) => warn!("Polling {} failed: {}", url, e),
                        }
                    }
                }

                let remaining = interval.saturating_sub(tick_started.elapsed());
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
        });

        running.store(false, Ordering::SeqCst);
        info!("Poll collector thread finished for {}", url);
    }
}

impl FeedCollector for PollCollector {
    /// Build the HTTP client and spawn the polling thread
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::HttpError` if the HTTP client cannot be built,
    /// or `CollectorError::IoError` if the async runtime cannot be created.
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            debug!("PollCollector already running, skipping start");
            return Ok(());
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let client = Client::builder()
            .timeout(self.request_timeout)
            .no_proxy()
            .build()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        self.running.store(true, Ordering::SeqCst);

        let url = self.url.clone();
        let predict_url = self.predict_url.clone();
        let interval = self.interval;
        let channel = self.output_channel.clone();
        let running = Arc::clone(&self.running);
        let shutdown = Arc::new(Notify::new());
        self.shutdown = Some(Arc::clone(&shutdown));

        let handle = thread::spawn(move || {
            Self::collector_thread(
                runtime,
                client,
                url,
                predict_url,
                interval,
                channel,
                running,
                shutdown,
            );
        });

        self.thread_handle = Some(handle);
        info!(
            "PollCollector started for {} with interval {:?}",
            self.url, self.interval
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CollectorError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.take() {
            // Stores a permit if the thread is not waiting yet
            shutdown.notify_one();
        }

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                error!("Failed to join PollCollector thread");
                CollectorError::ThreadTerminated("Failed to join collector thread".to_string())
            })?;
            info!("PollCollector stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for PollCollector {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
