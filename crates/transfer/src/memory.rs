//! Memory probing for the transfer-strategy decision.

/// Kept free regardless of the projected cost.
pub const SAFETY_MARGIN_BYTES: u64 = 200 * 1024 * 1024;

/// Detect the memory limit from cgroup (for containerized environments)
/// or system memory, defaulting to 16 GiB when nothing is readable.
pub fn detect_memory_limit() -> u64 {
    // Try cgroup v2 first
    if let Ok(limit) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
        if let Ok(bytes) = limit.trim().parse::<u64>() {
            if bytes < u64::MAX / 2 {
                return bytes;
            }
        }
    }

    // Try cgroup v1
    if let Ok(limit) = std::fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        if let Ok(bytes) = limit.trim().parse::<u64>() {
            if bytes < u64::MAX / 2 {
                return bytes;
            }
        }
    }

    // Fall back to system memory
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if line.starts_with("MemTotal:") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 {
                    if let Ok(kb) = parts[1].parse::<u64>() {
                        return kb * 1024;
                    }
                }
            }
        }
    }

    16 * 1024 * 1024 * 1024
}

/// Current process RSS (Resident Set Size) in bytes.
pub fn process_rss() -> u64 {
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        for line in status.lines() {
            if line.starts_with("VmRSS:") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 {
                    if let Ok(kb) = parts[1].parse::<u64>() {
                        return kb * 1024;
                    }
                }
            }
        }
    }
    0
}

/// Memory available for a transfer: the limit minus the safety margin
/// minus what the process already holds.
pub fn available_budget(limit: u64) -> u64 {
    limit
        .saturating_sub(SAFETY_MARGIN_BYTES)
        .saturating_sub(process_rss())
}
