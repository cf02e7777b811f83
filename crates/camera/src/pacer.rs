use chrono::{DateTime, Utc};
use pulse_config::CameraConfig;
use pulse_core::{Frame, FrameSource, HistoryWindow, PulseError, Result, Timestamped};
use pulse_system::{run_blocking, StopSignal, TaskSlot};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::bandwidth::{raw_mbps, Geometry};
use crate::stats::{FrameStats, StreamStats};
use crate::window::FrameWindow;

const NAME: &str = "camera";

/// Runtime settings for a [`FramePacer`].
#[derive(Debug, Clone, PartialEq)]
pub struct PacerConfig {
    /// Cadence the pacer holds, in frames per second.
    pub target_fps:       f64,
    /// Used for the uncompressed reference bandwidth.
    pub bit_depth:        u32,
    pub channels:         u32,
    /// Per-frame bandwidth records retained.
    pub history_capacity: usize,
    pub shutdown_timeout: Duration,
}

impl PacerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(PulseError::Config(format!(
                "target fps must be a positive number, got {}",
                self.target_fps
            )));
        }
        if self.bit_depth == 0 || self.channels == 0 {
            return Err(PulseError::Config("bit depth and channels must be positive".into()));
        }
        if self.history_capacity == 0 {
            return Err(PulseError::Config("history capacity must be positive".into()));
        }
        Ok(())
    }

    /// Time budget of one capture cycle.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }
}

impl From<&CameraConfig> for PacerConfig {
    fn from(config: &CameraConfig) -> Self {
        Self {
            target_fps:       config.fps,
            bit_depth:        config.bit_depth,
            channels:         config.channels,
            history_capacity: config.history_capacity,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Stream figures at the moment a frame was captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthRecord {
    pub timestamp:          DateTime<Utc>,
    pub fps:                f64,
    pub bandwidth_mbps:     f64,
    pub raw_bandwidth_mbps: f64,
    pub frame_size:         u64,
}

impl Timestamped for BandwidthRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Default)]
struct StreamState {
    stats:      FrameStats,
    resolution: Option<(u32, u32)>,
    started:    Option<Instant>,
    stopped:    Option<Instant>,
}

impl StreamState {
    fn runtime(&self) -> Duration {
        match (self.started, self.stopped) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state:   RwLock<StreamState>,
    history: HistoryWindow<BandwidthRecord>,
}

impl Shared {
    fn update<T>(&self, f: impl FnOnce(&mut StreamState) -> T) -> T {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn read<T>(&self, f: impl FnOnce(&StreamState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Paced capture loop over a [`FrameSource`].
///
/// Each cycle captures one frame, updates the short-horizon frame window and
/// [`FrameStats`], then sleeps whatever is left of the `1 / target_fps`
/// budget. Captures slower than the budget run back to back. A failed
/// capture counts as a dropped frame and skips the analysis.
#[derive(Debug)]
pub struct FramePacer<F: FrameSource> {
    config: PacerConfig,
    source: Arc<Mutex<F>>,
    shared: Arc<Shared>,
    task:   TaskSlot,
}

impl<F: FrameSource> FramePacer<F> {
    /// Fails with [`PulseError::Config`] on a missing or non-positive target
    /// rate, geometry or capacity.
    pub fn new(source: F, config: PacerConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            state:   RwLock::new(StreamState {
                stats: FrameStats::new(config.target_fps),
                ..StreamState::default()
            }),
            history: HistoryWindow::new(config.history_capacity)?,
        };
        Ok(Self {
            task: TaskSlot::new(NAME, config.shutdown_timeout),
            config,
            source: Arc::new(Mutex::new(source)),
            shared: Arc::new(shared),
        })
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Start capturing. No-op if already streaming; otherwise counters are
    /// reset to zero first.
    pub fn start(&self) {
        let config = self.config.clone();
        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);

        let started = self.task.start(
            || {
                self.shared.update(|s| {
                    *s = StreamState {
                        stats: FrameStats::new(self.config.target_fps),
                        started: Some(Instant::now()),
                        ..StreamState::default()
                    };
                });
            },
            move |stop| pace_loop(config, source, shared, stop),
        );
        if started {
            info!("Camera streaming started (target {} fps)", self.config.target_fps);
        } else {
            debug!("Camera streaming already active");
        }
    }

    /// Stop capturing and wait for the loop to exit, up to the shutdown
    /// timeout. Runtime is frozen at this point either way.
    pub async fn stop(&self) -> Result<()> {
        let was_running = self.task.is_running();
        let result = self.task.stop().await;
        self.shared.update(|s| {
            if s.started.is_some() && s.stopped.is_none() {
                s.stopped = Some(Instant::now());
            }
        });
        if was_running {
            info!("Camera streaming stopped");
        }
        result
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Current counters.
    pub fn stats(&self) -> FrameStats {
        self.shared.read(|s| s.stats)
    }

    /// Frozen report including runtime-derived figures.
    pub fn snapshot(&self) -> StreamStats {
        let active = self.is_running();
        self.shared
            .read(|s| StreamStats::new(s.stats, s.runtime(), active, s.resolution))
    }

    /// Per-frame records from the last `minutes` minutes.
    pub fn bandwidth_history(&self, minutes: u32) -> Vec<BandwidthRecord> {
        self.shared.history.query_minutes(minutes, Utc::now())
    }

    pub fn history(&self) -> &HistoryWindow<BandwidthRecord> {
        &self.shared.history
    }
}

async fn pace_loop<F: FrameSource>(
    config: PacerConfig,
    source: Arc<Mutex<F>>,
    shared: Arc<Shared>,
    mut stop: StopSignal,
) {
    let period = config.period();
    let mut window = FrameWindow::new();

    while !stop.is_set() {
        let cycle_start = Instant::now();

        match capture(&source).await {
            Ok(frame) => {
                window.record(Instant::now(), frame.size_bytes);
                let geometry = Geometry {
                    width:     frame.width,
                    height:    frame.height,
                    bit_depth: config.bit_depth,
                    channels:  config.channels,
                };
                let raw = raw_mbps(geometry, window.current_fps());
                let stats = shared.update(|s| {
                    s.stats
                        .record_frame(window.current_fps(), window.bandwidth_mbps(), raw);
                    s.resolution = Some((frame.width, frame.height));
                    s.stats
                });
                shared.history.append(BandwidthRecord {
                    timestamp:          Utc::now(),
                    fps:                stats.current_fps,
                    bandwidth_mbps:     stats.bandwidth_mbps,
                    raw_bandwidth_mbps: stats.raw_bandwidth_mbps,
                    frame_size:         frame.size_bytes,
                });
                trace!("frame {} ({} bytes)", stats.total_frames, frame.size_bytes);
            }
            Err(e) => {
                shared.update(|s| s.stats.record_drop());
                if e.is_per_tick() {
                    warn!("Failed to capture frame: {e}");
                } else {
                    error!("Failed to capture frame: {e}");
                }
            }
        }

        if stop.sleep(period.saturating_sub(cycle_start.elapsed())).await {
            break;
        }
    }

    debug!("camera capture loop exited");
}

async fn capture<F: FrameSource>(source: &Arc<Mutex<F>>) -> Result<Frame> {
    let source = Arc::clone(source);
    run_blocking(
        move || {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .capture_frame()
        },
        |e| PulseError::Capture(format!("capture call panicked: {e}")),
    )
    .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::synthetic::SyntheticCamera;
    use std::collections::VecDeque;
    use tokio::time;

    /// Replays scripted capture results, then fails every call.
    pub(crate) struct ScriptedCamera {
        script: VecDeque<Result<Frame>>,
    }

    impl ScriptedCamera {
        pub(crate) fn new(script: impl IntoIterator<Item = Result<Frame>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl FrameSource for ScriptedCamera {
        fn capture_frame(&mut self) -> Result<Frame> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(PulseError::Capture("script exhausted".into())))
        }
    }

    pub(crate) fn frame(size_bytes: u64) -> Frame {
        Frame { size_bytes, width: 640, height: 480 }
    }

    pub(crate) fn config(target_fps: f64) -> PacerConfig {
        PacerConfig {
            target_fps,
            bit_depth: 8,
            channels: 3,
            history_capacity: 1_000,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn invalid_target_rate_is_fatal() {
        for fps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                FramePacer::new(ScriptedCamera::new([]), config(fps)),
                Err(PulseError::Config(_))
            ));
        }
        let mut zero_capacity = config(30.0);
        zero_capacity.history_capacity = 0;
        assert!(FramePacer::new(ScriptedCamera::new([]), zero_capacity).is_err());
    }

    #[test]
    fn snapshot_before_start_is_empty() {
        let pacer = FramePacer::new(ScriptedCamera::new([]), config(30.0)).unwrap();
        let report = pacer.snapshot();
        assert!(!report.stream_active);
        assert_eq!(report.stats.total_frames, 0);
        assert_eq!(report.stats.target_fps, 30.0);
        assert_eq!(report.runtime_secs, 0.0);
        assert!(pacer.bandwidth_history(60).is_empty());
    }

    #[tokio::test]
    async fn failures_count_as_drops_only() {
        let script = (0..5).map(|_| Ok(frame(10_000)));
        let pacer = FramePacer::new(ScriptedCamera::new(script), config(500.0)).unwrap();

        pacer.start();
        wait_until("drops", || pacer.stats().dropped_frames >= 5).await;
        pacer.stop().await.unwrap();

        let report = pacer.snapshot();
        assert_eq!(report.stats.total_frames, 5);
        assert!(report.stats.dropped_frames >= 5);
        assert!(report.drop_rate_percent >= 50.0 && report.drop_rate_percent < 100.0);
        assert_eq!(report.resolution.as_deref(), Some("640x480"));
        assert_eq!(pacer.history().len(), 5);
        assert!(!report.stream_active);
    }

    #[tokio::test]
    async fn pacing_holds_target_rate() {
        let script = (0..10_000).map(|_| Ok(frame(50_000)));
        let pacer = FramePacer::new(ScriptedCamera::new(script), config(20.0)).unwrap();

        pacer.start();
        time::sleep(Duration::from_millis(500)).await;
        pacer.stop().await.unwrap();

        let stats = pacer.stats();
        // 500 ms at 50 ms per cycle: about ten frames, never a free-running burst.
        assert!((4..=12).contains(&stats.total_frames), "{}", stats.total_frames);
        assert!(stats.current_fps > 10.0 && stats.current_fps < 25.0, "{}", stats.current_fps);
        assert!(stats.raw_bandwidth_mbps > 0.0);
    }

    #[tokio::test]
    async fn slow_captures_run_back_to_back() {
        // 25 ms per capture against a 5 ms budget: capped near 40 fps.
        let camera = SyntheticCamera::new(320, 240).with_capture_time(Duration::from_millis(25));
        let pacer = FramePacer::new(camera, config(200.0)).unwrap();

        pacer.start();
        wait_until("frames", || pacer.stats().total_frames >= 8).await;
        pacer.stop().await.unwrap();

        let fps = pacer.stats().current_fps;
        assert!(fps > 20.0 && fps < 41.0, "{fps}");
        assert_eq!(pacer.stats().dropped_frames, 0);
    }

    #[tokio::test]
    async fn restart_resets_counters() {
        let script = (0..10_000).map(|_| Ok(frame(1_000)));
        let pacer = FramePacer::new(ScriptedCamera::new(script), config(200.0)).unwrap();

        pacer.start();
        wait_until("frames", || pacer.stats().total_frames >= 3).await;
        pacer.start();
        assert!(pacer.stats().total_frames >= 3);
        pacer.stop().await.unwrap();

        let frozen = pacer.snapshot().runtime_secs;
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pacer.snapshot().runtime_secs, frozen);

        pacer.start();
        assert_eq!(pacer.stats().total_frames, 0);
        assert_eq!(pacer.stats().dropped_frames, 0);
        pacer.stop().await.unwrap();
    }
}
