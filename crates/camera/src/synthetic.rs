use pulse_core::{Frame, FrameSource, PulseError, Result};
use std::num::NonZeroU64;
use std::time::Duration;

/// Deterministic stand-in for a camera.
///
/// Frames have a fixed geometry and a size that wobbles around
/// `base_size ± jitter`. Every `fail_every`-th capture fails.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width:        u32,
    height:       u32,
    base_size:    u64,
    jitter:       u64,
    fail_every:   Option<NonZeroU64>,
    capture_time: Duration,
    captures:     u64,
}

impl SyntheticCamera {
    /// Frame sizes default to a tenth of 8-bit RGB, roughly MJPEG output.
    pub fn new(width: u32, height: u32) -> Self {
        let raw = u64::from(width) * u64::from(height) * 3;
        Self {
            width,
            height,
            base_size: raw / 10,
            jitter: raw / 100,
            fail_every: None,
            capture_time: Duration::ZERO,
            captures: 0,
        }
    }

    #[must_use]
    pub fn with_frame_size(mut self, base_size: u64, jitter: u64) -> Self {
        self.base_size = base_size;
        self.jitter = jitter;
        self
    }

    /// Fail every `n`-th capture. `0` disables failures.
    #[must_use]
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = NonZeroU64::new(n);
        self
    }

    /// Block for `capture_time` in every capture call.
    #[must_use]
    pub fn with_capture_time(mut self, capture_time: Duration) -> Self {
        self.capture_time = capture_time;
        self
    }

    fn frame_size(&self) -> u64 {
        let spread = self.jitter * 2 + 1;
        self.base_size.saturating_sub(self.jitter) + self.captures.wrapping_mul(7_919) % spread
    }
}

impl FrameSource for SyntheticCamera {
    fn capture_frame(&mut self) -> Result<Frame> {
        self.captures += 1;
        if !self.capture_time.is_zero() {
            std::thread::sleep(self.capture_time);
        }
        if let Some(n) = self.fail_every {
            if self.captures % n.get() == 0 {
                return Err(PulseError::Capture(format!("synthetic drop #{}", self.captures)));
            }
        }
        Ok(Frame {
            size_bytes: self.frame_size(),
            width:      self.width,
            height:     self.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_stay_within_jitter() {
        let mut cam = SyntheticCamera::new(640, 480).with_frame_size(10_000, 500);
        for _ in 0..200 {
            let frame = cam.capture_frame().unwrap();
            assert!((9_500..=10_500).contains(&frame.size_bytes));
            assert_eq!((frame.width, frame.height), (640, 480));
        }
    }

    #[test]
    fn fails_on_schedule() {
        let mut cam = SyntheticCamera::new(320, 240).with_fail_every(3);
        let outcomes: Vec<bool> = (0..6).map(|_| cam.capture_frame().is_ok()).collect();
        assert_eq!(outcomes, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn zero_disables_failures() {
        let mut cam = SyntheticCamera::new(320, 240).with_fail_every(0);
        assert!((0..10).all(|_| cam.capture_frame().is_ok()));
    }
}
