use std::time::Duration;
use thiserror::Error;

/// Top-level error type shared by every pulse crate.
///
/// Only `Config` is fatal. The per-tick variants are logged and skipped by the
/// sampling loops; `ShutdownTimeout` is surfaced by `stop()` as a warning.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("config error: {0}")]
    Config(String),

    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("non-positive interval between samples ({elapsed_ms} ms)")]
    InvalidInterval { elapsed_ms: i64 },

    #[error("counter '{counter}' decreased between samples")]
    CounterDiscontinuity { counter: String },

    #[error("'{name}' did not shut down within {waited:?}")]
    ShutdownTimeout { name: String, waited: Duration },

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl PulseError {
    pub fn unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason:    reason.into(),
        }
    }

    /// `true` for errors a sampling loop recovers from by skipping the tick.
    #[must_use]
    pub fn is_per_tick(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::InvalidInterval { .. }
                | Self::CounterDiscontinuity { .. }
                | Self::Capture(_)
        )
    }
}

pub type Result<T, E = PulseError> = std::result::Result<T, E>;
