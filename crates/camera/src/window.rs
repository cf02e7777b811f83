use pulse_core::units::bytes_per_sec_to_mbps;
use pulse_core::RingBuffer;
use std::num::NonZeroUsize;
use tokio::time::Instant;

/// Frame timestamps used for the smoothed frame rate.
pub const FPS_WINDOW: usize = 100;
/// Frame sizes averaged for the observed bandwidth.
pub const BANDWIDTH_WINDOW: usize = 10;

const fn non_zero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => panic!("window size must be positive"),
    }
}

/// Short-horizon view of recent frames: capture time and size of the last
/// [`FPS_WINDOW`] frames. Bandwidth uses only the newest [`BANDWIDTH_WINDOW`].
#[derive(Debug, Clone)]
pub struct FrameWindow {
    frames:         RingBuffer<(Instant, u64)>,
    current_fps:    f64,
    bandwidth_mbps: f64,
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWindow {
    pub fn new() -> Self {
        Self {
            frames:         RingBuffer::new(non_zero(FPS_WINDOW)),
            current_fps:    0.0,
            bandwidth_mbps: 0.0,
        }
    }

    /// Record a captured frame and refresh the derived figures.
    ///
    /// The frame rate keeps its previous value until two frames with distinct
    /// timestamps are known; bandwidth waits for a full size window and a
    /// non-zero frame rate.
    pub fn record(&mut self, at: Instant, size_bytes: u64) {
        self.frames.push((at, size_bytes));
        let count = self.frames.len();

        if let (Some(&(oldest, _)), Some(&(newest, _))) = (self.frames.oldest(), self.frames.newest()) {
            let span = newest.saturating_duration_since(oldest).as_secs_f64();
            if count >= 2 && span > 0.0 {
                self.current_fps = (count - 1) as f64 / span;
            }
        }

        if count >= BANDWIDTH_WINDOW && self.current_fps > 0.0 {
            let total: u64 = self.frames.last_n(BANDWIDTH_WINDOW).map(|&(_, size)| size).sum();
            let average = total as f64 / BANDWIDTH_WINDOW as f64;
            self.bandwidth_mbps = bytes_per_sec_to_mbps(average * self.current_fps);
        }
    }

    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn bandwidth_mbps(&self) -> f64 {
        self.bandwidth_mbps
    }

    pub fn frames(&self) -> usize {
        self.frames.len()
    }
}
