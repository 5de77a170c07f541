//! Resident memory for the current process (spec §4.3, §4.7).
//!
//! Linux reads `VmRSS` from `/proc/self/status` directly; other
//! platforms fall back to `sysinfo`. Shared by the Pool Observer's
//! heap-divided-by-connections estimate and the System Sampler's
//! per-process memory sample.

/// Resident set size, in bytes.
pub fn resident_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest.split_whitespace().next().and_then(|s| s.parse::<u64>().ok()) {
                        return kb * 1024;
                    }
                }
            }
        }
    }

    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let pid = sysinfo::get_current_pid().unwrap_or(sysinfo::Pid::from(0));
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}
