//! Theoretical video bandwidth: uncompressed figures from frame geometry and
//! rough compressed figures from typical codec ratios.

use pulse_core::units::{bits_to_mbps, bytes_to_gib};
use pulse_core::PulseError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Pixel layout of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub width:     u32,
    pub height:    u32,
    /// Bits per channel.
    pub bit_depth: u32,
    pub channels:  u32,
}

impl Geometry {
    /// 8-bit RGB at the given size.
    pub fn rgb8(width: u32, height: u32) -> Self {
        Self { width, height, bit_depth: 8, channels: 3 }
    }

    pub fn bits_per_pixel(&self) -> u64 {
        u64::from(self.bit_depth) * u64::from(self.channels)
    }

    pub fn bits_per_frame(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * self.bits_per_pixel()
    }
}

/// Uncompressed throughput in binary Mbps.
pub fn raw_mbps(geometry: Geometry, fps: f64) -> f64 {
    bits_to_mbps(geometry.bits_per_frame() as f64 * fps)
}

/// Named resolutions accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Qvga,
    Vga,
    Svga,
    Hd720,
    Hd1080,
    Qhd1440,
    Uhd4k,
    Uhd8k,
}

impl Resolution {
    pub const ALL: [Resolution; 8] = [
        Self::Qvga,
        Self::Vga,
        Self::Svga,
        Self::Hd720,
        Self::Hd1080,
        Self::Qhd1440,
        Self::Uhd4k,
        Self::Uhd8k,
    ];

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Qvga => (320, 240),
            Self::Vga => (640, 480),
            Self::Svga => (800, 600),
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
            Self::Qhd1440 => (2560, 1440),
            Self::Uhd4k => (3840, 2160),
            Self::Uhd8k => (7680, 4320),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Qvga => "qvga",
            Self::Vga => "vga",
            Self::Svga => "svga",
            Self::Hd720 => "720p",
            Self::Hd1080 => "1080p",
            Self::Qhd1440 => "1440p",
            Self::Uhd4k => "4k",
            Self::Uhd8k => "8k",
        }
    }
}

impl FromStr for Resolution {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.name() == wanted)
            .ok_or_else(|| PulseError::Config(format!("unknown resolution '{s}'")))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typical size ratio of a codec/quality setting relative to raw video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Raw,
    Mjpeg,
    H264Low,
    H264Medium,
    H264High,
    H265Low,
    H265Medium,
    H265High,
}

impl Compression {
    pub const ALL: [Compression; 8] = [
        Self::Raw,
        Self::Mjpeg,
        Self::H264Low,
        Self::H264Medium,
        Self::H264High,
        Self::H265Low,
        Self::H265Medium,
        Self::H265High,
    ];

    /// Fraction of the raw size that survives compression.
    pub fn factor(self) -> f64 {
        match self {
            Self::Raw => 1.0,
            Self::Mjpeg => 0.1,
            Self::H264Low => 0.02,
            Self::H264Medium | Self::H265Low => 0.015,
            Self::H264High | Self::H265Medium => 0.01,
            Self::H265High => 0.005,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Mjpeg => "mjpeg",
            Self::H264Low => "h264-low",
            Self::H264Medium => "h264-medium",
            Self::H264High => "h264-high",
            Self::H265Low => "h265-low",
            Self::H265Medium => "h265-medium",
            Self::H265High => "h265-high",
        }
    }

    /// Human-readable ratio, e.g. `"67:1"`.
    pub fn ratio(self) -> String {
        format!("{:.0}:1", 1.0 / self.factor())
    }
}

impl FromStr for Compression {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| PulseError::Config(format!("unknown compression profile '{s}'")))
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub bits_per_second:  f64,
    pub bytes_per_second: f64,
    pub mbps:             f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Storage {
    pub gib_per_hour: f64,
    pub gib_per_day:  f64,
}

/// Bandwidth and storage needs of a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthReport {
    pub resolution:     String,
    pub fps:            f64,
    pub geometry:       Geometry,
    pub bits_per_frame: u64,
    /// `"raw"` for the uncompressed figure.
    pub compression:    String,
    pub ratio:          String,
    pub bandwidth:      Throughput,
    pub storage:        Storage,
}

impl BandwidthReport {
    /// Uncompressed requirements of `geometry` at `fps`.
    pub fn raw(geometry: Geometry, fps: f64) -> Self {
        Self::scaled(geometry, fps, Compression::Raw)
    }

    /// Requirements after applying `compression` to the raw stream.
    pub fn compressed(geometry: Geometry, fps: f64, compression: Compression) -> Self {
        Self::scaled(geometry, fps, compression)
    }

    fn scaled(geometry: Geometry, fps: f64, compression: Compression) -> Self {
        let bits_per_frame = geometry.bits_per_frame();
        let bits_per_second = bits_per_frame as f64 * fps * compression.factor();
        let bytes_per_second = bits_per_second / 8.0;
        Self {
            resolution: format!("{}x{}", geometry.width, geometry.height),
            fps,
            geometry,
            bits_per_frame,
            compression: compression.name().to_string(),
            ratio: compression.ratio(),
            bandwidth: Throughput {
                bits_per_second,
                bytes_per_second,
                mbps: bits_to_mbps(bits_per_second),
            },
            storage: Storage {
                gib_per_hour: bytes_to_gib(bytes_per_second * 3_600.0),
                gib_per_day:  bytes_to_gib(bytes_per_second * 86_400.0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_1080p30_rgb() {
        let g = Geometry::rgb8(1920, 1080);
        assert_eq!(g.bits_per_pixel(), 24);
        assert_eq!(g.bits_per_frame(), 49_766_400);

        let mbps = raw_mbps(g, 30.0);
        assert!((mbps - 49_766_400.0 * 30.0 / 1_048_576.0).abs() < 1e-6);
        assert!((mbps - 1423.828125).abs() < 1e-6);
    }

    #[test]
    fn compression_scales_bandwidth_and_storage() {
        let g = Geometry::rgb8(1280, 720);
        let raw = BandwidthReport::raw(g, 25.0);
        let h264 = BandwidthReport::compressed(g, 25.0, Compression::H264High);

        assert_eq!(raw.ratio, "1:1");
        assert_eq!(h264.ratio, "100:1");
        assert!((h264.bandwidth.mbps - raw.bandwidth.mbps * 0.01).abs() < 1e-9);
        assert!((h264.storage.gib_per_day - raw.storage.gib_per_day * 0.01).abs() < 1e-9);
        assert!((raw.storage.gib_per_day - raw.storage.gib_per_hour * 24.0).abs() < 1e-9);
        assert_eq!(h264.resolution, "1280x720");
    }

    #[test]
    fn parse_names() {
        assert_eq!("1080P".parse::<Resolution>().unwrap(), Resolution::Hd1080);
        assert_eq!("4k".parse::<Resolution>().unwrap().dimensions(), (3840, 2160));
        assert!("potato".parse::<Resolution>().is_err());

        assert_eq!("h264_medium".parse::<Compression>().unwrap(), Compression::H264Medium);
        assert_eq!("h265-high".parse::<Compression>().unwrap().ratio(), "200:1");
        assert!("divx".parse::<Compression>().is_err());
    }
}
