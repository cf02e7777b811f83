use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Live counters of a camera stream. Reset at stream start, updated once per
/// capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FrameStats {
    pub target_fps:         f64,
    /// Smoothed over the last 100 frames.
    pub current_fps:        f64,
    pub total_frames:       u64,
    pub dropped_frames:     u64,
    /// Observed throughput from the last 10 frame sizes, binary Mbps.
    pub bandwidth_mbps:     f64,
    /// Uncompressed reference throughput from frame geometry, binary Mbps.
    pub raw_bandwidth_mbps: f64,
}

impl FrameStats {
    pub fn new(target_fps: f64) -> Self {
        Self {
            target_fps,
            ..Self::default()
        }
    }

    pub fn record_drop(&mut self) {
        self.dropped_frames += 1;
    }

    pub fn record_frame(&mut self, current_fps: f64, bandwidth_mbps: f64, raw_bandwidth_mbps: f64) {
        self.total_frames += 1;
        self.current_fps = current_fps;
        self.bandwidth_mbps = bandwidth_mbps;
        self.raw_bandwidth_mbps = raw_bandwidth_mbps;
    }

    /// Dropped frames as a percentage of capture attempts.
    pub fn drop_rate_percent(&self) -> f64 {
        let attempts = self.total_frames + self.dropped_frames;
        self.dropped_frames as f64 / attempts.max(1) as f64 * 100.0
    }

    /// Successful frames per second of wall time.
    pub fn average_fps(&self, runtime: Duration) -> f64 {
        let secs = runtime.as_secs_f64();
        if secs > 0.0 {
            self.total_frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Frozen report of a stream, as handed to status consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStats {
    pub timestamp:         DateTime<Utc>,
    pub stream_active:     bool,
    /// `"WxH"` of the last captured frame, if any.
    pub resolution:        Option<String>,
    #[serde(flatten)]
    pub stats:             FrameStats,
    pub average_fps:       f64,
    pub drop_rate_percent: f64,
    pub runtime_secs:      f64,
}

impl StreamStats {
    pub fn new(
        stats: FrameStats,
        runtime: Duration,
        stream_active: bool,
        resolution: Option<(u32, u32)>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            stream_active,
            resolution: resolution.map(|(w, h)| format!("{w}x{h}")),
            stats,
            average_fps: stats.average_fps(runtime),
            drop_rate_percent: stats.drop_rate_percent(),
            runtime_secs: runtime.as_secs_f64(),
        }
    }
}
