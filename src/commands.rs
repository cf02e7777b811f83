use anyhow::{bail, Context, Result};
use pulse_camera::{
    run_performance_test, BandwidthReport, Compression, FramePacer, Geometry, PacerConfig,
    PerformanceSummary, SyntheticCamera,
};
use pulse_config::PulseConfig;
use std::path::Path;
use pulse_core::units::{format_bytes, format_mbps};
use pulse_system::{list_interfaces, NetworkBandwidthSnapshot, NetworkMonitor};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Load the config file before the real subscriber exists. Anything logged
/// while loading goes to `writer`, filtered by `RUST_LOG` or `warn`.
pub fn load_config<W>(path: &Path, writer: W) -> Result<PulseConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(writer)
        .finish();
    let config = tracing::subscriber::with_default(subscriber, || pulse_config::load(path))?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise the configured level, raised by `-v`.
pub fn init_tracing(configured: &str, verbose: u8) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

pub async fn net(config: &PulseConfig, duration: Option<u64>, export: Option<PathBuf>) -> Result<()> {
    let monitor = NetworkMonitor::new(&config.monitoring)?;
    let interval = config.monitoring.update_interval();
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));

    monitor.start();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let wake = Instant::now() + interval;
        let wake = deadline.map_or(wake, |d| wake.min(d));
        tokio::select! {
            _ = time::sleep_until(wake) => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
        print_status(&monitor.current_status());
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    if let Err(e) = monitor.stop().await {
        warn!("{e}");
    }
    if let Some(path) = export {
        monitor
            .export_json(&path)
            .with_context(|| format!("exporting to {}", path.display()))?;
    }
    Ok(())
}

fn print_status(status: &NetworkBandwidthSnapshot) {
    let host = &status.system_info;
    println!(
        "host         cpu {:>5.1}%  mem {:>5.1}%  disk {:>5.1}%  load {:.2}",
        host.cpu_usage_percent, host.memory_percent, host.disk_percent, host.load_average.one,
    );
    for (name, iface) in &status.interfaces {
        match &iface.latest {
            Some(_) => println!(
                "{name:<12} up {:>14}  down {:>14}  ({} ticks, {} errors)",
                format_mbps(iface.mbps_sent),
                format_mbps(iface.mbps_recv),
                iface.ticks,
                iface.errors,
            ),
            None => println!("{name:<12} waiting for a second reading"),
        }
    }
}

pub fn interfaces() -> Result<()> {
    let interfaces = list_interfaces();
    if interfaces.is_empty() {
        println!("No network interfaces found");
        return Ok(());
    }
    for iface in interfaces {
        println!(
            "{:<12} {:<9} {}  sent {:>10}  recv {:>10}  {}",
            iface.name,
            format!("{:?}", iface.kind).to_lowercase(),
            iface.mac_address,
            format_bytes(iface.bytes_sent),
            format_bytes(iface.bytes_recv),
            iface.addresses.join(", "),
        );
    }
    Ok(())
}

pub async fn camera_test(
    config: &PulseConfig,
    duration: u64,
    fail_every: u64,
    capture_time: Duration,
    json: bool,
) -> Result<()> {
    if duration == 0 {
        bail!("duration must be at least one second");
    }
    let camera = SyntheticCamera::new(config.camera.width, config.camera.height)
        .with_fail_every(fail_every)
        .with_capture_time(capture_time);
    let pacer = FramePacer::new(camera, PacerConfig::from(&config.camera))?;

    let summary = run_performance_test(&pacer, Duration::from_secs(duration), Duration::from_secs(1))
        .await
        .context("performance test produced no readings")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &PerformanceSummary) {
    println!("Duration:        {:.1} s", s.duration_secs);
    println!("Frames:          {} ({} dropped, {:.2}%)", s.total_frames, s.dropped_frames, s.drop_rate_percent);
    println!("FPS:             {:.2} avg, {:.2} min, {:.2} max", s.avg_fps, s.min_fps, s.max_fps);
    println!("Bandwidth:       {} avg", format_mbps(s.avg_bandwidth_mbps));
    if let Some(last) = s.samples.last() {
        println!("Raw reference:   {}", format_mbps(last.stats.raw_bandwidth_mbps));
    }
}

pub fn bandwidth(
    config: &PulseConfig,
    (width, height): (u32, u32),
    fps: f64,
    compression: Option<Compression>,
    json: bool,
) -> Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("fps must be a positive number");
    }
    let geometry = Geometry {
        width,
        height,
        bit_depth: config.camera.bit_depth,
        channels: config.camera.channels,
    };

    let mut reports = vec![BandwidthReport::raw(geometry, fps)];
    if let Some(c) = compression.filter(|&c| c != Compression::Raw) {
        reports.push(BandwidthReport::compressed(geometry, fps, c));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for r in &reports {
        println!(
            "{} @ {} fps, {} ({}): {}  {:.2} GiB/h  {:.1} GiB/day",
            r.resolution,
            r.fps,
            r.compression,
            r.ratio,
            format_mbps(r.bandwidth.mbps),
            r.storage.gib_per_hour,
            r.storage.gib_per_day,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_config_warning_is_not_lost() {
        let captured = Captured::default();
        let writer = captured.clone();
        let path = std::env::temp_dir().join(format!("pulse-missing-{}.toml", std::process::id()));

        let config = load_config(&path, move || writer.clone()).unwrap();

        assert_eq!(config, PulseConfig::default());
        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Config file not found"), "{logged}");
    }
}
