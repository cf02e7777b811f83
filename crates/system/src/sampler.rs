use chrono::{DateTime, Utc};
use pulse_config::MonitoringConfig;
use pulse_core::{estimate, CounterSource, HistoryWindow, PulseError, RateRecord, Result, Sample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::task::{run_blocking, StopSignal, TaskSlot};

/// Runtime settings for a [`SamplingLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Fixed tick interval.
    pub interval: Duration,
    /// Rate records retained in the history window. The raw-sample history
    /// holds as many readings.
    pub history_capacity: usize,
    /// Bound on how long `stop()` waits for the task to exit.
    pub shutdown_timeout: Duration,
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(PulseError::Config("sampling interval must be positive".into()));
        }
        if self.history_capacity == 0 {
            return Err(PulseError::Config("history capacity must be positive".into()));
        }
        Ok(())
    }
}

impl From<&MonitoringConfig> for LoopConfig {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            interval:         config.update_interval(),
            history_capacity: config.history_capacity,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// State written by the sampling task and read by everyone else.
#[derive(Debug)]
struct Shared {
    history:     HistoryWindow,
    samples:     HistoryWindow<Sample>,
    last_sample: RwLock<Option<Sample>>,
    ticks:       AtomicU64,
    errors:      AtomicU64,
}

impl Shared {
    fn set_last_sample(&self, sample: Option<Sample>) {
        *self.last_sample.write().unwrap_or_else(PoisonError::into_inner) = sample;
    }
}

/// Background task that samples a [`CounterSource`] at a fixed interval and
/// keeps a bounded history of derived [`RateRecord`]s.
///
/// `start()` and `stop()` are idempotent. At most one task runs per loop.
/// `start()` must be called from within a Tokio runtime.
#[derive(Debug)]
pub struct SamplingLoop<S: CounterSource> {
    config: LoopConfig,
    source: Arc<Mutex<S>>,
    shared: Arc<Shared>,
    task:   TaskSlot,
}

impl<S: CounterSource> SamplingLoop<S> {
    /// Fails with [`PulseError::Config`] on a zero interval or capacity.
    pub fn new(source: S, config: LoopConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            history:     HistoryWindow::new(config.history_capacity)?,
            samples:     HistoryWindow::new(config.history_capacity)?,
            last_sample: RwLock::new(None),
            ticks:       AtomicU64::new(0),
            errors:      AtomicU64::new(0),
        };
        Ok(Self {
            task: TaskSlot::new(source.id(), config.shutdown_timeout),
            config,
            source: Arc::new(Mutex::new(source)),
            shared: Arc::new(shared),
        })
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Launch the sampling task. No-op if it is already running.
    ///
    /// The previous sample is cleared, so the first tick after a (re)start
    /// only seeds the baseline and produces no rate record.
    pub fn start(&self) {
        let name = self.name().to_string();
        let interval = self.config.interval;
        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);

        let started = self.task.start(
            || self.shared.set_last_sample(None),
            move |stop| tick_loop(name, interval, source, shared, stop),
        );
        if started {
            info!("{}: sampling started ({:?} interval)", self.name(), interval);
        } else {
            debug!("{}: sampling already running", self.name());
        }
    }

    /// Signal the task to exit and wait for it, up to the configured timeout.
    ///
    /// The loop is marked stopped either way. A task that is still stuck in a
    /// source read after the timeout is abandoned and reported as
    /// [`PulseError::ShutdownTimeout`].
    pub async fn stop(&self) -> Result<()> {
        let was_running = self.task.is_running();
        self.task.stop().await?;
        if was_running {
            info!("{}: sampling stopped", self.name());
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// When the current run started, `None` while stopped.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.task.started_at()
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.shared.history
    }

    /// Rate records from the last `minutes` minutes.
    pub fn history_minutes(&self, minutes: u32) -> Vec<RateRecord> {
        self.shared.history.query_minutes(minutes, Utc::now())
    }

    /// Raw counter readings, across runs.
    pub fn sample_history(&self) -> &HistoryWindow<Sample> {
        &self.shared.samples
    }

    /// Raw counter readings from the last `minutes` minutes.
    pub fn samples_minutes(&self, minutes: u32) -> Vec<Sample> {
        self.shared.samples.query_minutes(minutes, Utc::now())
    }

    pub fn latest(&self) -> Option<RateRecord> {
        self.shared.history.latest()
    }

    /// The most recent successful reading of the current run.
    pub fn last_sample(&self) -> Option<Sample> {
        self.shared
            .last_sample
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ticks completed since construction, including failed ones.
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the source could not be read.
    pub fn error_count(&self) -> u64 {
        self.shared.errors.load(Ordering::Relaxed)
    }
}

async fn tick_loop<S: CounterSource>(
    name: String,
    interval: Duration,
    source: Arc<Mutex<S>>,
    shared: Arc<Shared>,
    mut stop: StopSignal,
) {
    let mut previous: Option<Sample> = None;

    while !stop.is_set() {
        let tick_start = Instant::now();

        match read_source(&name, &source).await {
            Ok(sample) => {
                if let Some(prev) = &previous {
                    record_rate(&name, &shared.history, &sample, prev);
                }
                shared.samples.append(sample.clone());
                shared.set_last_sample(Some(sample.clone()));
                previous = Some(sample);
            }
            Err(e) => {
                // `previous` stays put so the next good tick spans the gap.
                shared.errors.fetch_add(1, Ordering::Relaxed);
                if e.is_per_tick() {
                    warn!("{name}: skipping tick: {e}");
                } else {
                    error!("{name}: skipping tick: {e}");
                }
            }
        }
        shared.ticks.fetch_add(1, Ordering::Relaxed);

        if stop.sleep(interval.saturating_sub(tick_start.elapsed())).await {
            break;
        }
    }

    debug!("{name}: sampling task exited");
}

fn record_rate(name: &str, history: &HistoryWindow, current: &Sample, previous: &Sample) {
    match estimate(current, previous) {
        Ok(record) => {
            for counter in record.discontinuities() {
                let e = PulseError::CounterDiscontinuity {
                    counter: counter.to_string(),
                };
                warn!("{name}: {e}; rate unavailable this tick");
            }
            trace!("{name}: {:?}", record.rates());
            history.append(record);
        }
        Err(e) => warn!("{name}: discarding tick: {e}"),
    }
}

async fn read_source<S: CounterSource>(name: &str, source: &Arc<Mutex<S>>) -> Result<Sample> {
    let source = Arc::clone(source);
    run_blocking(
        move || {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read_snapshot()
        },
        |e| PulseError::unavailable(name, format!("source read panicked: {e}")),
    )
    .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use tokio::time;

    /// Replays a fixed list of readings, then reports itself unavailable.
    #[derive(Debug)]
    pub(crate) struct ScriptedSource {
        id:     String,
        script: VecDeque<Result<Sample>>,
        delay:  Duration,
    }

    impl ScriptedSource {
        pub(crate) fn new(id: &str, script: impl IntoIterator<Item = Result<Sample>>) -> Self {
            Self {
                id:     id.to_string(),
                script: script.into_iter().collect(),
                delay:  Duration::ZERO,
            }
        }

        /// Endless source whose counter grows by 1000 per second of synthetic time.
        pub(crate) fn counting(id: &str) -> Self {
            Self::new(id, (0..10_000).map(|i| Ok(bytes_at(i, i as u64 * 1_000))))
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl CounterSource for ScriptedSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn read_snapshot(&mut self) -> Result<Sample> {
            std::thread::sleep(self.delay);
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(PulseError::unavailable(&self.id, "script exhausted")))
        }
    }

    /// Stamps each reading with the wall clock after blocking for `delay`.
    struct ClockedSource {
        delay: Duration,
        reads: u64,
    }

    impl CounterSource for ClockedSource {
        fn id(&self) -> &str {
            "clocked"
        }

        fn read_snapshot(&mut self) -> Result<Sample> {
            std::thread::sleep(self.delay);
            self.reads += 1;
            Ok(Sample::now().with("bytes", self.reads * 1_000))
        }
    }

    /// Average wall-clock spacing between consecutive readings.
    fn mean_gap_ms(samples: &[Sample]) -> f64 {
        let (first, last) = (&samples[0], &samples[samples.len() - 1]);
        let span = (last.timestamp() - first.timestamp()).num_microseconds().unwrap();
        span as f64 / 1_000.0 / (samples.len() - 1) as f64
    }

    async fn spacing_ms(interval_ms: u64, delay_ms: u64, readings: usize) -> f64 {
        let source = ClockedSource {
            delay: Duration::from_millis(delay_ms),
            reads: 0,
        };
        let config = LoopConfig {
            interval:         Duration::from_millis(interval_ms),
            history_capacity: 100,
            shutdown_timeout: Duration::from_secs(2),
        };
        let sampler = SamplingLoop::new(source, config).unwrap();
        sampler.start();
        wait_until("readings", || sampler.sample_history().len() >= readings).await;
        sampler.stop().await.unwrap();
        mean_gap_ms(&sampler.sample_history().snapshot())
    }

    pub(crate) fn bytes_at(secs: i64, bytes: u64) -> Sample {
        let t = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Sample::new(t).with("bytes", bytes)
    }

    pub(crate) fn fast_config(capacity: usize) -> LoopConfig {
        LoopConfig {
            interval:         Duration::from_millis(10),
            history_capacity: capacity,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    pub(crate) async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn zero_interval_or_capacity_is_fatal() {
        let mut config = fast_config(5);
        config.interval = Duration::ZERO;
        assert!(matches!(
            SamplingLoop::new(ScriptedSource::counting("x"), config),
            Err(PulseError::Config(_))
        ));
        assert!(matches!(
            SamplingLoop::new(ScriptedSource::counting("x"), fast_config(0)),
            Err(PulseError::Config(_))
        ));
    }

    #[tokio::test]
    async fn end_to_end_rates_with_discontinuity() {
        let source = ScriptedSource::new(
            "eth0",
            [
                Ok(bytes_at(0, 0)),
                Ok(bytes_at(1, 1_000)),
                Ok(bytes_at(2, 3_000)),
                Ok(bytes_at(3, 2_500)),
            ],
        );
        let sampler = SamplingLoop::new(source, fast_config(5)).unwrap();
        sampler.start();
        wait_until("script to drain", || sampler.error_count() >= 2).await;
        sampler.stop().await.unwrap();

        let records = sampler.history().snapshot();
        assert_eq!(records.len(), 3);
        assert!((records[0].rate("bytes").unwrap() - 1_000.0).abs() < 1e-9);
        assert!((records[1].rate("bytes").unwrap() - 2_000.0).abs() < 1e-9);
        assert_eq!(records[2].rate("bytes"), None);
        assert!(records[2].is_discontinuous());
        assert_eq!(sampler.sample_history().len(), 4);
        assert!(records.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[tokio::test]
    async fn failed_read_keeps_previous_sample() {
        let source = ScriptedSource::new(
            "eth0",
            [
                Ok(bytes_at(0, 0)),
                Err(PulseError::unavailable("eth0", "down")),
                Ok(bytes_at(4, 8_000)),
            ],
        );
        let sampler = SamplingLoop::new(source, fast_config(5)).unwrap();
        sampler.start();
        wait_until("third read", || sampler.tick_count() >= 3).await;
        sampler.stop().await.unwrap();

        let records = sampler.history().snapshot();
        assert_eq!(records.len(), 1);
        assert!((records[0].rate("bytes").unwrap() - 2_000.0).abs() < 1e-9);
        assert!((records[0].elapsed_secs() - 4.0).abs() < 1e-9);
        assert!(sampler.error_count() >= 1);
    }

    #[tokio::test]
    async fn clock_anomaly_discards_the_tick() {
        let source = ScriptedSource::new(
            "eth0",
            [
                Ok(bytes_at(5, 0)),
                Ok(bytes_at(5, 100)),
                Ok(bytes_at(6, 600)),
            ],
        );
        let sampler = SamplingLoop::new(source, fast_config(5)).unwrap();
        sampler.start();
        wait_until("third read", || sampler.tick_count() >= 3).await;
        sampler.stop().await.unwrap();

        let records = sampler.history().snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rate("bytes"), Some(500.0));
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let mut config = fast_config(100);
        config.interval = Duration::from_secs(60);
        let sampler = SamplingLoop::new(ScriptedSource::counting("eth0"), config).unwrap();

        sampler.start();
        wait_until("first tick", || sampler.tick_count() == 1).await;
        let started = sampler.started_at();
        let before = sampler.last_sample();
        assert!(before.is_some());

        sampler.start();
        // a restarted task would tick (and reseed) right away
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sampler.started_at(), started);
        assert_eq!(sampler.tick_count(), 1);
        assert_eq!(sampler.last_sample(), before);
        assert_eq!(sampler.sample_history().len(), 1);
        assert!(sampler.is_running());

        sampler.stop().await.unwrap();
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn slow_reads_do_not_stretch_the_interval() {
        // 30 ms read inside a 60 ms tick: next tick starts 60 ms after the
        // previous one, not 90 ms.
        let gap = spacing_ms(60, 30, 8).await;
        assert!((50.0..80.0).contains(&gap), "mean gap {gap:.1} ms");
    }

    #[tokio::test]
    async fn overlong_reads_run_back_to_back() {
        // 40 ms read against a 30 ms interval: no sleep at all between ticks.
        let gap = spacing_ms(30, 40, 8).await;
        assert!((35.0..60.0).contains(&gap), "mean gap {gap:.1} ms");
    }

    #[tokio::test]
    async fn restart_skips_rate_on_first_tick() {
        let mut config = fast_config(100);
        config.interval = Duration::from_millis(200);
        let sampler = SamplingLoop::new(ScriptedSource::counting("eth0"), config).unwrap();

        sampler.start();
        wait_until("one record", || sampler.history().len() >= 1).await;
        sampler.stop().await.unwrap();
        let records_before = sampler.history().len();
        let ticks_before = sampler.tick_count();

        sampler.start();
        wait_until("first tick after restart", || sampler.tick_count() > ticks_before).await;
        assert_eq!(sampler.history().len(), records_before);
        sampler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_wakes_sleeping_task() {
        let mut config = fast_config(5);
        config.interval = Duration::from_secs(60);
        let sampler = SamplingLoop::new(ScriptedSource::counting("eth0"), config).unwrap();

        sampler.stop().await.unwrap();
        sampler.start();
        wait_until("first tick", || sampler.tick_count() >= 1).await;

        let begun = Instant::now();
        sampler.stop().await.unwrap();
        assert!(begun.elapsed() < Duration::from_secs(1));
        sampler.stop().await.unwrap();
        assert!(!sampler.is_running());
        assert_eq!(sampler.started_at(), None);
    }

    #[tokio::test]
    async fn stuck_source_reports_shutdown_timeout() {
        let source = ScriptedSource::counting("eth0").with_delay(Duration::from_millis(400));
        let config = LoopConfig {
            interval:         Duration::from_millis(10),
            history_capacity: 5,
            shutdown_timeout: Duration::from_millis(20),
        };
        let sampler = SamplingLoop::new(source, config).unwrap();
        sampler.start();
        time::sleep(Duration::from_millis(50)).await;

        let result = sampler.stop().await;
        assert!(matches!(result, Err(PulseError::ShutdownTimeout { .. })));
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn queries_work_while_stopped() {
        let sampler = SamplingLoop::new(ScriptedSource::counting("eth0"), fast_config(5)).unwrap();
        assert!(sampler.history_minutes(60).is_empty());
        assert!(sampler.latest().is_none());
        assert!(sampler.last_sample().is_none());
    }
}
