//! pulse: network interface and camera stream bandwidth monitor.
//!
//! Run with:  `pulse net --duration 30` or `RUST_LOG=debug pulse camera-test`

mod commands;

use clap::{Parser, Subcommand};
use pulse_camera::{Compression, Resolution};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pulse", about = "Periodic sampling and bandwidth estimation", version)]
struct Cli {
    /// Path to a TOML configuration file (default: $XDG_CONFIG_HOME/pulse/pulse.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample network interfaces and print their rates every interval.
    Net {
        /// Seconds to monitor; runs until Ctrl-C when omitted.
        #[arg(short, long)]
        duration: Option<u64>,

        /// Write status and history as JSON when done.
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// List network interfaces with their cumulative counters.
    Interfaces,

    /// Pace a synthetic camera and report frame rate, drops and bandwidth.
    CameraTest {
        /// Seconds to run.
        #[arg(short, long, default_value_t = 10)]
        duration: u64,

        /// Fail every n-th capture (0 = never).
        #[arg(long, default_value_t = 0)]
        fail_every: u64,

        /// Milliseconds each synthetic capture blocks for.
        #[arg(long, default_value_t = 0)]
        capture_time_ms: u64,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Theoretical bandwidth and storage of a video stream.
    Bandwidth {
        /// Named resolution: qvga, vga, svga, 720p, 1080p, 1440p, 4k, 8k.
        #[arg(short, long, conflicts_with_all = ["width", "height"])]
        resolution: Option<Resolution>,

        #[arg(long, requires = "height")]
        width: Option<u32>,

        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Frame rate; defaults to the configured camera rate.
        #[arg(short, long)]
        fps: Option<f64>,

        /// Compression profile, e.g. mjpeg or h264-medium.
        #[arg(long)]
        compression: Option<Compression>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(pulse_config::default_path);
    let config = commands::load_config(&path, std::io::stderr)?;
    commands::init_tracing(&config.logging.level, cli.verbose);

    tracing::debug!("pulse v{} using config {}", env!("CARGO_PKG_VERSION"), path.display());

    match cli.command {
        Commands::Net { duration, export } => commands::net(&config, duration, export).await,
        Commands::Interfaces => commands::interfaces(),
        Commands::CameraTest {
            duration,
            fail_every,
            capture_time_ms,
            json,
        } => {
            let capture_time = Duration::from_millis(capture_time_ms);
            commands::camera_test(&config, duration, fail_every, capture_time, json).await
        }
        Commands::Bandwidth {
            resolution,
            width,
            height,
            fps,
            compression,
            json,
        } => {
            let size = match (resolution, width.zip(height)) {
                (Some(r), _) => r.dimensions(),
                (None, Some(size)) => size,
                (None, None) => (config.camera.width, config.camera.height),
            };
            let fps = fps.unwrap_or(config.camera.fps);
            commands::bandwidth(&config, size, fps, compression, json)
        }
    }
}
