use chrono::{DateTime, Utc};
use pulse_config::MonitoringConfig;
use pulse_core::{CounterSource, PulseError, RateRecord, Result, Sample};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::host::{HostStats, SystemInfo};
use crate::network::{InterfaceCounters, BYTES_RECV, BYTES_SENT};
use crate::sampler::{LoopConfig, SamplingLoop};

/// Point-in-time view of every monitored interface.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkBandwidthSnapshot {
    pub timestamp:         DateTime<Utc>,
    pub monitoring_active: bool,
    pub system_info:       SystemInfo,
    pub interfaces:        BTreeMap<String, InterfaceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceStatus {
    /// Latest raw counter reading of the current run.
    pub counters: Option<Sample>,
    /// Latest derived rates.
    pub latest:    Option<RateRecord>,
    /// Binary Mbps from `latest`; 0 when unknown.
    pub mbps_sent: f64,
    pub mbps_recv: f64,
    pub ticks:     u64,
    pub errors:    u64,
}

#[derive(Serialize)]
struct Export<'a> {
    exported_at:       DateTime<Utc>,
    status:            &'a NetworkBandwidthSnapshot,
    bandwidth_history: BTreeMap<&'a str, Vec<RateRecord>>,
    /// Raw counter readings per interface.
    network_history:   BTreeMap<&'a str, Vec<Sample>>,
}

/// One [`SamplingLoop`] per monitored interface.
pub struct NetworkMonitor<S: CounterSource = InterfaceCounters> {
    loops: BTreeMap<String, SamplingLoop<S>>,
    host:  Mutex<HostStats>,
}

impl NetworkMonitor<InterfaceCounters> {
    /// Monitor the configured interfaces, or all interfaces aggregated when
    /// the list is empty.
    pub fn new(config: &MonitoringConfig) -> Result<Self> {
        if config.interfaces.is_empty() {
            Self::with_sources(config, [InterfaceCounters::all()])
        } else {
            Self::with_sources(
                config,
                config.interfaces.iter().map(InterfaceCounters::named),
            )
        }
    }
}

impl<S: CounterSource> NetworkMonitor<S> {
    /// Build a monitor over arbitrary counter sources, keyed by their ids.
    pub fn with_sources(
        config: &MonitoringConfig,
        sources: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let loop_config = LoopConfig::from(config);
        let mut loops = BTreeMap::new();
        for source in sources {
            let id = source.id().to_string();
            if loops.contains_key(&id) {
                return Err(PulseError::Config(format!("interface '{id}' listed twice")));
            }
            loops.insert(id, SamplingLoop::new(source, loop_config.clone())?);
        }
        if loops.is_empty() {
            return Err(PulseError::Config("no interfaces to monitor".into()));
        }
        Ok(Self {
            loops,
            host: Mutex::new(HostStats::new()),
        })
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.loops.keys().map(String::as_str)
    }

    pub fn sampler(&self, interface: &str) -> Option<&SamplingLoop<S>> {
        self.loops.get(interface)
    }

    pub fn start(&self) {
        for sampler in self.loops.values() {
            sampler.start();
        }
        info!("Network monitoring started ({} source(s))", self.loops.len());
    }

    /// Stop every loop. All loops are stopped even if one times out; the
    /// first timeout is returned.
    pub async fn stop(&self) -> Result<()> {
        let mut first_err = None;
        for sampler in self.loops.values() {
            if let Err(e) = sampler.stop().await {
                first_err.get_or_insert(e);
            }
        }
        info!("Network monitoring stopped");
        first_err.map_or(Ok(()), Err)
    }

    pub fn is_running(&self) -> bool {
        self.loops.values().any(SamplingLoop::is_running)
    }

    pub fn current_status(&self) -> NetworkBandwidthSnapshot {
        let interfaces = self
            .loops
            .iter()
            .map(|(name, sampler)| {
                let latest = sampler.latest();
                let mbps = |counter| {
                    latest
                        .as_ref()
                        .and_then(|r| r.mbps(counter))
                        .unwrap_or(0.0)
                };
                let status = InterfaceStatus {
                    counters:  sampler.last_sample(),
                    mbps_sent: mbps(BYTES_SENT),
                    mbps_recv: mbps(BYTES_RECV),
                    latest:    latest.clone(),
                    ticks:     sampler.tick_count(),
                    errors:    sampler.error_count(),
                };
                (name.clone(), status)
            })
            .collect();

        NetworkBandwidthSnapshot {
            timestamp: Utc::now(),
            monitoring_active: self.is_running(),
            system_info: self.host.lock().unwrap_or_else(PoisonError::into_inner).read(),
            interfaces,
        }
    }

    /// Rate records of `interface` from the last `minutes` minutes. Unknown
    /// interfaces yield an empty history.
    pub fn bandwidth_history(&self, interface: &str, minutes: u32) -> Vec<RateRecord> {
        self.loops
            .get(interface)
            .map(|sampler| sampler.history_minutes(minutes))
            .unwrap_or_default()
    }

    /// Raw counter readings of `interface` from the last `minutes` minutes.
    pub fn counter_history(&self, interface: &str, minutes: u32) -> Vec<Sample> {
        self.loops
            .get(interface)
            .map(|sampler| sampler.samples_minutes(minutes))
            .unwrap_or_default()
    }

    /// Write the current status and every retained record as pretty JSON.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let status = self.current_status();
        let export = Export {
            exported_at:       Utc::now(),
            status:            &status,
            bandwidth_history: self
                .loops
                .iter()
                .map(|(name, sampler)| (name.as_str(), sampler.history().snapshot()))
                .collect(),
            network_history:   self
                .loops
                .iter()
                .map(|(name, sampler)| (name.as_str(), sampler.sample_history().snapshot()))
                .collect(),
        };

        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &export)
            .map_err(|e| PulseError::Serialize(e.to_string()))?;
        info!("Monitoring data exported to {}", path.display());
        Ok(())
    }
}
