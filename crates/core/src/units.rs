//! Unit conversions.
//!
//! All megabit figures in pulse are binary: 1 Mbps here is 1024 × 1024 bits
//! per second, for network and camera paths alike.

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Bits in one (binary) megabit.
pub const BITS_PER_MEGABIT: f64 = MIB as f64;

/// Convert a byte rate to binary megabits per second.
pub fn bytes_per_sec_to_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / BITS_PER_MEGABIT
}

/// Convert a bit rate to binary megabits per second.
pub fn bits_to_mbps(bits_per_sec: f64) -> f64 {
    bits_per_sec / BITS_PER_MEGABIT
}

/// Convert a byte count to GiB.
pub fn bytes_to_gib(bytes: f64) -> f64 {
    bytes / GIB as f64
}

/// Format a byte count with a binary suffix, e.g. `"7.3 GiB"`.
pub fn format_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= GIB => format!("{:.1} GiB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}

/// Format a megabit rate, dropping to kbps below 1 Mbps.
pub fn format_mbps(mbps: f64) -> String {
    if mbps >= 1.0 {
        format!("{mbps:.2} Mbps")
    } else {
        format!("{:.1} kbps", mbps * 1024.0)
    }
}
