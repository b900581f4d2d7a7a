//! Real-time thread and host setup: SCHED_FIFO priority, CPU pinning,
//! memory locking, and the cpu_dma_latency C-state veto.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;

use anyhow::{anyhow, bail, Result};
use tracing::warn;

/// Number of CPUs the kernel was configured with (including offline ones).
pub fn configured_cpus() -> usize {
    // SAFETY: sysconf has no memory side effects.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if count > 0 {
        count as usize
    } else {
        1
    }
}

/// Number of CPUs currently online.
pub fn online_cpus() -> usize {
    // SAFETY: sysconf has no memory side effects.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if count > 0 {
        count as usize
    } else {
        1
    }
}

/// Whether the process runs with effective uid 0. Raw sockets and several
/// sysctl reads need it.
pub fn is_root() -> bool {
    // SAFETY: geteuid cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Capacity of `cpu_set_t` in bits; pinning beyond it is undefined behavior
/// in the CPU_SET macro.
const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

/// Switch the calling thread to SCHED_FIFO at `priority` and pin it to
/// `cpu`. Must run before the thread records its first timing sample.
pub fn configure_current_thread(priority: i32, cpu: usize) -> Result<()> {
    if cpu >= CPU_SET_CAPACITY {
        bail!("CPU {cpu} exceeds cpu_set_t capacity ({CPU_SET_CAPACITY})");
    }

    let params = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pthread_self is always valid; params outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &params) };
    if rc != 0 {
        return Err(anyhow!(std::io::Error::from_raw_os_error(rc))
            .context(format!("setting SCHED_FIFO priority {priority}")));
    }

    // SAFETY: cpu_set_t is plain bytes; CPU_SET is bounds-checked above.
    let mut mask: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { libc::CPU_SET(cpu, &mut mask) };
    let rc = unsafe {
        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &mask,
        )
    };
    if rc != 0 {
        return Err(anyhow!(std::io::Error::from_raw_os_error(rc))
            .context(format!("pinning thread to CPU {cpu}")));
    }

    Ok(())
}

/// Lock all current and future pages in memory so the measurement loops
/// never take a major fault.
pub fn lock_memory() -> Result<()> {
    // SAFETY: mlockall takes only flags.
    if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
        return Err(anyhow!(std::io::Error::last_os_error()).context("mlockall"));
    }
    Ok(())
}

/// Scoped C-state veto via `/dev/cpu_dma_latency`.
///
/// Writing a 32-bit zero tells power management to stay out of deep idle
/// states for as long as the descriptor is held open; dropping the handle
/// restores the system default. Borrowed from the cyclictest latency trick.
pub struct LatencyTarget {
    _file: std::fs::File,
}

impl LatencyTarget {
    /// Request zero allowed DMA latency. Unavailability is a warning, not an
    /// error: the run proceeds without the veto.
    pub fn acquire() -> Option<Self> {
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open("/dev/cpu_dma_latency")
        {
            Ok(file) => file,
            Err(error) => {
                warn!(%error, "cannot open /dev/cpu_dma_latency; deep C-states stay enabled");
                return None;
            }
        };
        if let Err(error) = file.write_all(&0i32.to_ne_bytes()) {
            warn!(%error, "cannot write /dev/cpu_dma_latency");
            return None;
        }
        Some(Self { _file: file })
    }
}

/// Best-effort marker into the kernel trace buffer, visible to trace-cmd.
/// Newer kernels mount tracefs at /sys/kernel/tracing; older ones only under
/// debugfs.
pub fn write_trace_marker(message: &str) {
    const PATHS: [&str; 2] = [
        "/sys/kernel/tracing/trace_marker",
        "/sys/kernel/debug/tracing/trace_marker",
    ];
    for path in PATHS {
        if let Ok(mut file) = OpenOptions::new().write(true).open(path) {
            if let Err(error) = file.write_all(message.as_bytes()) {
                warn!(%error, path, "trace_marker write failed");
            }
            return;
        }
    }
    warn!("no writable trace_marker; tracing markers disabled");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_counts_are_sane() {
        assert!(online_cpus() >= 1);
        assert!(configured_cpus() >= online_cpus());
    }

    #[test]
    fn test_configure_rejects_out_of_range_cpu() {
        let result = configure_current_thread(1, CPU_SET_CAPACITY);
        assert!(result.is_err());
    }
}
