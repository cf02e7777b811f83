//! Periodic counter sampling and network interface monitoring.
//!
//! [`SamplingLoop`] is the generic engine: a background Tokio task that reads a
//! [`CounterSource`](pulse_core::CounterSource) every interval, derives rates
//! against the previous reading and keeps them in a bounded history.
//! [`NetworkMonitor`] runs one loop per interface over `sysinfo` counters.

pub mod host;
pub mod monitor;
pub mod network;
pub mod sampler;
pub mod task;

pub use host::{HostStats, LoadAverage, SystemInfo};
pub use monitor::{InterfaceStatus, NetworkBandwidthSnapshot, NetworkMonitor};
pub use network::{list_interfaces, InterfaceCounters, InterfaceInfo, InterfaceKind};
pub use sampler::{LoopConfig, SamplingLoop};
pub use task::{run_blocking, StopSignal, TaskSlot};
