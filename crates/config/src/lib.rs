pub mod schema;

pub use schema::{CameraConfig, LoggingConfig, MonitoringConfig, PulseConfig};

use pulse_core::{PulseError, Result};
use std::path::{Path, PathBuf};

/// Load and validate configuration from a TOML file. Returns
/// `PulseConfig::default()` if the file doesn't exist.
pub fn load(path: impl AsRef<Path>) -> Result<PulseConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            "Config file not found at '{}'; using defaults.",
            path.display()
        );
        return Ok(PulseConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| PulseError::Config(format!("cannot read '{}': {e}", path.display())))?;

    parse(&raw)
}

/// Parse and validate a TOML document.
pub fn parse(raw: &str) -> Result<PulseConfig> {
    let config: PulseConfig =
        toml::from_str(raw).map_err(|e| PulseError::Config(format!("TOML parse error: {e}")))?;
    validate(&config)?;
    Ok(config)
}

/// Reject values no component can run with.
pub fn validate(config: &PulseConfig) -> Result<()> {
    let m = &config.monitoring;
    if m.update_interval_ms == 0 {
        return Err(invalid("monitoring.update_interval_ms must be positive"));
    }
    if m.history_capacity == 0 {
        return Err(invalid("monitoring.history_capacity must be positive"));
    }
    if m.interfaces.iter().any(|i| i.trim().is_empty()) {
        return Err(invalid("monitoring.interfaces contains an empty name"));
    }

    let c = &config.camera;
    if !(c.fps.is_finite() && c.fps > 0.0) {
        return Err(invalid("camera.fps must be a positive number"));
    }
    if c.width == 0 || c.height == 0 {
        return Err(invalid("camera.width and camera.height must be positive"));
    }
    if c.bit_depth == 0 || c.channels == 0 {
        return Err(invalid("camera.bit_depth and camera.channels must be positive"));
    }
    if c.history_capacity == 0 {
        return Err(invalid("camera.history_capacity must be positive"));
    }
    Ok(())
}

fn invalid(msg: &str) -> PulseError {
    PulseError::Config(msg.to_string())
}

/// Return the default config path, honouring `$XDG_CONFIG_HOME`.
pub fn default_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("pulse").join("pulse.toml")
}
