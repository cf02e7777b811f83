use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure parsed from `pulse.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Network interface sampling.
    pub monitoring: MonitoringConfig,
    /// Camera stream pacing and reference geometry.
    pub camera: CameraConfig,
    pub logging: LoggingConfig,
}

/// Network monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Interfaces to sample, e.g. `["wlan0", "eth0"]`. Empty = all interfaces
    /// aggregated into one counter set.
    pub interfaces: Vec<String>,
    /// Sampling interval in milliseconds.
    pub update_interval_ms: u64,
    /// Rate records kept per interface (one per tick).
    pub history_capacity: usize,
    /// How long `stop()` waits for a sampling task to exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interfaces:          Vec::new(),
            update_interval_ms:  1_000,
            history_capacity:    3_600, // one hour at 1 s
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl MonitoringConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Camera stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width:  u32,
    pub height: u32,
    /// Target capture rate the pacer holds.
    pub fps: f64,
    /// Bits per channel for the uncompressed reference figure.
    pub bit_depth: u32,
    /// Colour channels for the uncompressed reference figure.
    pub channels: u32,
    /// Per-frame bandwidth records kept.
    pub history_capacity: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width:               1280,
            height:              720,
            fps:                 30.0,
            bit_depth:           8,
            channels:            3,
            history_capacity:    3_600,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl CameraConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
