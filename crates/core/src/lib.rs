pub mod error;
pub mod history;
pub mod rate;
pub mod ring;
pub mod sample;
pub mod source;
pub mod units;

pub use error::{PulseError, Result};
pub use history::{HistoryWindow, Timestamped};
pub use rate::estimate;
pub use ring::RingBuffer;
pub use sample::{CounterName, RateRecord, Sample};
pub use source::{CounterSource, Frame, FrameSource};
