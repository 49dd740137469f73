//! Process runtime figures for the stats endpoints.

use sysinfo::System;

/// Host load and this process's resident memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeInfo {
    /// 1, 5 and 15 minute load averages. Zero on platforms without them.
    pub loadavg: [f64; 3],
    /// Resident set size in MiB.
    pub rss_mb: u64,
}

/// Sample load average and RSS.
///
/// Creates a fresh `System` per call and refreshes only this process.
#[must_use]
pub fn gather_runtime_info() -> RuntimeInfo {
    let load = System::load_average();

    let rss_mb = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| {
            let mut sys = System::new();
            sys.refresh_process(pid);
            sys.process(pid).map(|p| p.memory() / (1024 * 1024))
        })
        .unwrap_or(0);

    RuntimeInfo {
        loadavg: [load.one, load.five, load.fifteen],
        rss_mb,
    }
}
