use chrono::Utc;
use pulse_core::{CounterSource, PulseError, Result, Sample};
use serde::Serialize;
use sysinfo::{NetworkData, Networks};

pub const BYTES_SENT: &str = "bytes_sent";
pub const BYTES_RECV: &str = "bytes_recv";
pub const PACKETS_SENT: &str = "packets_sent";
pub const PACKETS_RECV: &str = "packets_recv";
pub const ERRORS_IN: &str = "errors_in";
pub const ERRORS_OUT: &str = "errors_out";

/// Source id used when every interface is summed into one counter set.
pub const ALL_INTERFACES: &str = "all";

/// Cumulative interface counters read through `sysinfo`.
///
/// Each instance owns its own [`Networks`] handle so several sources can be
/// sampled by independent loops.
pub struct InterfaceCounters {
    id:       String,
    /// `None` = aggregate of every interface.
    name:     Option<String>,
    networks: Networks,
}

impl InterfaceCounters {
    /// Counters of a single interface, e.g. `"wlan0"`.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id:       name.clone(),
            name:     Some(name),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Sum of the counters of every interface the OS reports.
    pub fn all() -> Self {
        Self {
            id:       ALL_INTERFACES.to_string(),
            name:     None,
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl std::fmt::Debug for InterfaceCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceCounters").field("id", &self.id).finish()
    }
}

impl CounterSource for InterfaceCounters {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_snapshot(&mut self) -> Result<Sample> {
        // true = forget interfaces that have gone away
        self.networks.refresh(true);
        let list = self.networks.list();

        let totals = match &self.name {
            Some(name) => list
                .get(name)
                .map(Totals::of)
                .ok_or_else(|| PulseError::unavailable(&self.id, "interface not present"))?,
            None => {
                if list.is_empty() {
                    return Err(PulseError::unavailable(&self.id, "no network interfaces"));
                }
                list.values().map(Totals::of).fold(Totals::default(), Totals::add)
            }
        };

        Ok(totals.into_sample())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct Totals {
    bytes_sent:   u64,
    bytes_recv:   u64,
    packets_sent: u64,
    packets_recv: u64,
    errors_in:    u64,
    errors_out:   u64,
}

impl Totals {
    fn of(data: &NetworkData) -> Self {
        Self {
            bytes_sent:   data.total_transmitted(),
            bytes_recv:   data.total_received(),
            packets_sent: data.total_packets_transmitted(),
            packets_recv: data.total_packets_received(),
            errors_in:    data.total_errors_on_received(),
            errors_out:   data.total_errors_on_transmitted(),
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            bytes_sent:   self.bytes_sent.saturating_add(other.bytes_sent),
            bytes_recv:   self.bytes_recv.saturating_add(other.bytes_recv),
            packets_sent: self.packets_sent.saturating_add(other.packets_sent),
            packets_recv: self.packets_recv.saturating_add(other.packets_recv),
            errors_in:    self.errors_in.saturating_add(other.errors_in),
            errors_out:   self.errors_out.saturating_add(other.errors_out),
        }
    }

    fn into_sample(self) -> Sample {
        Sample::new(Utc::now())
            .with(BYTES_SENT, self.bytes_sent)
            .with(BYTES_RECV, self.bytes_recv)
            .with(PACKETS_SENT, self.packets_sent)
            .with(PACKETS_RECV, self.packets_recv)
            .with(ERRORS_IN, self.errors_in)
            .with(ERRORS_OUT, self.errors_out)
    }
}

/// Rough interface category, from the kernel naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Ethernet,
    Wireless,
    Usb,
    Ppp,
    Loopback,
    Unknown,
}

impl InterfaceKind {
    pub fn classify(name: &str) -> Self {
        match name {
            "lo" => Self::Loopback,
            n if n.starts_with("eth") || n.starts_with("en") => Self::Ethernet,
            n if n.starts_with("wlan") || n.starts_with("wl") || n.starts_with("wifi") => {
                Self::Wireless
            }
            n if n.starts_with("usb") => Self::Usb,
            n if n.starts_with("ppp") => Self::Ppp,
            _ => Self::Unknown,
        }
    }
}

/// One interface as currently reported by the OS.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceInfo {
    pub name:         String,
    pub kind:         InterfaceKind,
    pub mac_address:  String,
    pub addresses:    Vec<String>,
    pub bytes_sent:   u64,
    pub bytes_recv:   u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// List every non-loopback interface with its cumulative counters.
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<InterfaceInfo> = networks
        .list()
        .iter()
        .filter(|(name, _)| InterfaceKind::classify(name) != InterfaceKind::Loopback)
        .map(|(name, data)| {
            let totals = Totals::of(data);
            InterfaceInfo {
                name:         name.clone(),
                kind:         InterfaceKind::classify(name),
                mac_address:  data.mac_address().to_string(),
                addresses:    data
                    .ip_networks()
                    .iter()
                    .map(|net| format!("{}/{}", net.addr, net.prefix))
                    .collect(),
                bytes_sent:   totals.bytes_sent,
                bytes_recv:   totals.bytes_recv,
                packets_sent: totals.packets_sent,
                packets_recv: totals.packets_recv,
            }
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}
