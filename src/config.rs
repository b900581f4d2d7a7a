//! Measurement run parameters, immutable once argument parsing is done.

use crate::clock::{NANOS_PER_MICRO, NANOS_PER_SEC};

/// Iteration sentinel: run until cancelled.
pub const RUN_INDEFINITELY: u64 = u64::MAX;

/// Default sender period in microseconds.
pub const DEFAULT_SEND_SLEEP_US: u64 = 1000;

/// Default SCHED_FIFO priority of the sender thread.
pub const DEFAULT_SEND_PRIORITY: i32 = 42;

/// Default SCHED_FIFO priority of the receiver thread. Higher than the
/// sender so frame arrival preempts the next send.
pub const DEFAULT_RECEIVE_PRIORITY: i32 = 45;

/// Everything the measurement threads need to know, fixed before spawn.
#[derive(Clone, Debug)]
pub struct TestParameters {
    /// NIC under test; `None` selects the cyclic-only mode.
    pub nic_name: Option<String>,
    pub iterations: u64,
    pub send_sleep_ns: u64,
    pub bucket_width_ns: u64,
    pub send_priority: i32,
    pub receive_priority: i32,
    pub send_cpu: usize,
    pub receive_cpu: usize,
    pub verbose: bool,
}

impl TestParameters {
    /// Total run time as `HH:MM:SS.mmm`, when the iteration count is finite.
    pub fn estimated_run_time(&self) -> Option<String> {
        if self.iterations == RUN_INDEFINITELY {
            return None;
        }
        let total_ns = self.iterations.saturating_mul(self.send_sleep_ns);
        Some(format_ns_hms(total_ns))
    }
}

/// Render a nanosecond span as `HH:MM:SS.mmm`.
pub fn format_ns_hms(total_ns: u64) -> String {
    let hours = total_ns / (3600 * NANOS_PER_SEC);
    let minutes = (total_ns / (60 * NANOS_PER_SEC)) % 60;
    let seconds = (total_ns / NANOS_PER_SEC) % 60;
    let millis = (total_ns / 1_000_000) % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Auto bucket width: an eighth of the sender period.
pub fn auto_bucket_width_ns(send_sleep_ns: u64) -> u64 {
    send_sleep_ns / 8
}

/// Microseconds (CLI unit) to nanoseconds (internal unit).
pub fn micros_to_ns(us: u64) -> u64 {
    us * NANOS_PER_MICRO
}
