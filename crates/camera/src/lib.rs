//! Frame-paced camera stream monitoring.
//!
//! [`FramePacer`] drives a [`FrameSource`](pulse_core::FrameSource) at a target
//! cadence, counts dropped frames and derives frame rate and bandwidth from a
//! short window of recent frames. [`bandwidth`] holds the theoretical
//! raw/compressed calculator used for the uncompressed reference figure.

pub mod bandwidth;
pub mod pacer;
pub mod perf;
pub mod stats;
pub mod synthetic;
pub mod window;

pub use bandwidth::{BandwidthReport, Compression, Geometry, Resolution};
pub use pacer::{BandwidthRecord, FramePacer, PacerConfig};
pub use perf::{run_performance_test, summarize, PerformanceSummary};
pub use stats::{FrameStats, StreamStats};
pub use synthetic::SyntheticCamera;
pub use window::FrameWindow;
