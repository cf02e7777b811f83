use serde::{Deserialize, Serialize};

use crate::sample::Sample;
use crate::Result;

/// A monotonically increasing counter set read by a sampling loop.
///
/// Implementations may block (OS calls, library calls). Only the owning loop's
/// task ever calls `read_snapshot`, never concurrently.
pub trait CounterSource: Send + 'static {
    /// Stable identifier used in logs and errors, e.g. `"eth0"`.
    fn id(&self) -> &str;

    /// Take one reading. Errors are expected to be
    /// [`PulseError::SourceUnavailable`](crate::PulseError::SourceUnavailable).
    fn read_snapshot(&mut self) -> Result<Sample>;
}

/// One successfully captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Encoded size of the frame as delivered by the capture library.
    pub size_bytes: u64,
    pub width:      u32,
    pub height:     u32,
}

/// A camera-like source polled once per pacing cycle.
///
/// An `Err` from `capture_frame` counts as a dropped frame.
pub trait FrameSource: Send + 'static {
    fn capture_frame(&mut self) -> Result<Frame>;
}
