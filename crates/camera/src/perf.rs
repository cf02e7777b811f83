//! Timed camera performance test: run the pacer for a while, sample its
//! report periodically and aggregate the readings.

use pulse_core::FrameSource;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::pacer::FramePacer;
use crate::stats::StreamStats;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub duration_secs:      f64,
    pub avg_fps:            f64,
    pub min_fps:            f64,
    pub max_fps:            f64,
    pub avg_bandwidth_mbps: f64,
    pub total_frames:       u64,
    pub dropped_frames:     u64,
    pub drop_rate_percent:  f64,
    pub samples:            Vec<StreamStats>,
}

/// Aggregate periodic readings. Zero fps/bandwidth readings (warm-up) are
/// left out of the averages; totals come from the last reading.
pub fn summarize(duration: Duration, samples: Vec<StreamStats>) -> Option<PerformanceSummary> {
    let last = samples.last()?.clone();

    let fps: Vec<f64> = samples
        .iter()
        .map(|s| s.stats.current_fps)
        .filter(|&v| v > 0.0)
        .collect();
    let bandwidth: Vec<f64> = samples
        .iter()
        .map(|s| s.stats.bandwidth_mbps)
        .filter(|&v| v > 0.0)
        .collect();

    Some(PerformanceSummary {
        duration_secs:      duration.as_secs_f64(),
        avg_fps:            mean(&fps),
        min_fps:            fps.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max_fps:            fps.iter().copied().reduce(f64::max).unwrap_or(0.0),
        avg_bandwidth_mbps: mean(&bandwidth),
        total_frames:       last.stats.total_frames,
        dropped_frames:     last.stats.dropped_frames,
        drop_rate_percent:  last.drop_rate_percent,
        samples,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Start `pacer`, take a report every `every` for `duration`, stop it and
/// summarize. A slow shutdown is logged, not fatal.
pub async fn run_performance_test<F: FrameSource>(
    pacer: &FramePacer<F>,
    duration: Duration,
    every: Duration,
) -> Option<PerformanceSummary> {
    info!("Starting {:?} camera performance test", duration);
    pacer.start();

    let begun = Instant::now();
    let mut samples = Vec::new();
    while begun.elapsed() < duration {
        time::sleep(every.min(duration.saturating_sub(begun.elapsed()))).await;
        samples.push(pacer.snapshot());
    }

    if let Err(e) = pacer.stop().await {
        warn!("Performance test: {e}");
    }
    samples.push(pacer.snapshot());

    let summary = summarize(duration, samples)?;
    info!(
        "Performance test completed: {:.2} avg FPS, {:.2} Mbps avg bandwidth, {:.2}% dropped",
        summary.avg_fps, summary.avg_bandwidth_mbps, summary.drop_rate_percent
    );
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::tests::config;
    use crate::stats::FrameStats;
    use crate::synthetic::SyntheticCamera;

    fn reading(fps: f64, mbps: f64, total: u64, dropped: u64) -> StreamStats {
        let stats = FrameStats {
            current_fps: fps,
            bandwidth_mbps: mbps,
            total_frames: total,
            dropped_frames: dropped,
            ..FrameStats::new(30.0)
        };
        StreamStats::new(stats, Duration::from_secs(1), true, None)
    }

    #[test]
    fn warm_up_zeros_are_ignored() {
        let samples = vec![
            reading(0.0, 0.0, 0, 0),
            reading(28.0, 10.0, 28, 1),
            reading(30.0, 14.0, 58, 2),
            reading(29.0, 12.0, 87, 3),
        ];
        let summary = summarize(Duration::from_secs(4), samples).unwrap();

        assert_eq!(summary.avg_fps, 29.0);
        assert_eq!(summary.min_fps, 28.0);
        assert_eq!(summary.max_fps, 30.0);
        assert_eq!(summary.avg_bandwidth_mbps, 12.0);
        assert_eq!(summary.total_frames, 87);
        assert_eq!(summary.dropped_frames, 3);
        assert_eq!(summary.samples.len(), 4);
    }

    #[test]
    fn no_readings_no_summary() {
        assert!(summarize(Duration::from_secs(1), Vec::new()).is_none());
    }

    #[tokio::test]
    async fn short_run_against_synthetic_camera() {
        let camera = SyntheticCamera::new(320, 240).with_fail_every(4);
        let pacer = FramePacer::new(camera, config(100.0)).unwrap();

        let summary = run_performance_test(
            &pacer,
            Duration::from_millis(300),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert!(!pacer.is_running());
        assert!(summary.total_frames > 0);
        assert!(summary.dropped_frames > 0);
        assert!(summary.samples.len() >= 3);
        assert!(summary.max_fps >= summary.min_fps);
    }
}
