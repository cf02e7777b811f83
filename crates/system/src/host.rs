use serde::Serialize;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};

/// Host-wide figures attached to network status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub cpu_count:         usize,
    /// Average over all cores since the previous reading.
    pub cpu_usage_percent: f32,
    pub memory_total:      u64,
    pub memory_used:       u64,
    pub memory_percent:    f64,
    /// Root filesystem.
    pub disk_total:        u64,
    pub disk_used:         u64,
    pub disk_percent:      f64,
    pub load_average:      LoadAverage,
    pub uptime_secs:       u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one:     f64,
    pub five:    f64,
    pub fifteen: f64,
}

/// Keeps one `System` alive so CPU usage is measured between readings.
#[derive(Debug)]
pub struct HostStats {
    sys: System,
}

impl Default for HostStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStats {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self { sys }
    }

    pub fn read(&mut self) -> SystemInfo {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let (disk_used, disk_total) = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .map(|d| (d.total_space().saturating_sub(d.available_space()), d.total_space()))
            .unwrap_or((0, 0));

        let load = System::load_average();
        let memory_total = self.sys.total_memory();
        let memory_used = self.sys.used_memory();

        SystemInfo {
            cpu_count: self.sys.cpus().len(),
            cpu_usage_percent: self.sys.global_cpu_usage(),
            memory_total,
            memory_used,
            memory_percent: percent(memory_used, memory_total),
            disk_total,
            disk_used,
            disk_percent: percent(disk_used, disk_total),
            load_average: LoadAverage {
                one:     load.one,
                five:    load.five,
                fifteen: load.fifteen,
            },
            uptime_secs: System::uptime(),
        }
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}
