//! Monotonic nanosecond clock reads and absolute-deadline sleep.
//!
//! All measurement timing runs against `CLOCK_MONOTONIC`. Deadlines are
//! carried as plain nanosecond counts since the (arbitrary) monotonic epoch
//! and converted to `timespec` only at the syscall boundary.

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_MICRO: u64 = 1_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Current `CLOCK_MONOTONIC` time in nanoseconds.
pub fn monotonic_ns() -> u64 {
    // SAFETY: clock_gettime only writes the timespec out-param.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    timespec_to_ns(&ts)
}

/// Collapse a `timespec` into nanoseconds since the clock epoch.
pub fn timespec_to_ns(ts: &libc::timespec) -> u64 {
    (ts.tv_sec as u64) * NANOS_PER_SEC + ts.tv_nsec as u64
}

/// Expand nanoseconds into a normalized `timespec`.
pub fn ns_to_timespec(ns: u64) -> libc::timespec {
    libc::timespec {
        tv_sec: (ns / NANOS_PER_SEC) as libc::time_t,
        tv_nsec: (ns % NANOS_PER_SEC) as libc::c_long,
    }
}

/// Advance a deadline by one period, then keep advancing while it still lies
/// in the past. After a schedule delay the next wake lands on a future grid
/// point; missed periods are never replayed back-to-back.
pub fn advance_deadline(next: u64, current: u64, period: u64) -> u64 {
    debug_assert!(period > 0);
    let mut next = next + period;
    while current > next {
        next += period;
    }
    next
}

/// Sleep until an absolute `CLOCK_MONOTONIC` deadline, restarting on signal
/// interruption.
pub fn sleep_until(deadline_ns: u64) {
    let ts = ns_to_timespec(deadline_ns);
    loop {
        // SAFETY: ts is a valid, normalized timespec; remain is unused with
        // TIMER_ABSTIME.
        let rc = unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &ts,
                std::ptr::null_mut(),
            )
        };
        if rc != libc::EINTR {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timespec_round_trip() {
        let ns = 3 * NANOS_PER_SEC + 250;
        let ts = ns_to_timespec(ns);
        assert_eq!(ts.tv_sec, 3);
        assert_eq!(ts.tv_nsec, 250);
        assert_eq!(timespec_to_ns(&ts), ns);
    }

    #[test]
    fn test_advance_deadline_on_time() {
        // Woke before the next grid point: plain single-period advance.
        let next = advance_deadline(1_000_000, 900_000, 1_000_000);
        assert_eq!(next, 2_000_000);
    }

    #[test]
    fn test_advance_deadline_catches_up_to_future_grid() {
        // 1 ms period, last deadline 1 ms, woke at 5.3 ms: the next deadline
        // must be 6 ms, not 2 ms.
        let next = advance_deadline(1_000_000, 5_300_000, 1_000_000);
        assert_eq!(next, 6_000_000);
    }

    #[test]
    fn test_advance_deadline_exact_boundary() {
        // current == next + period is not "past"; no extra skip.
        let next = advance_deadline(1_000_000, 2_000_000, 1_000_000);
        assert_eq!(next, 2_000_000);
    }

    #[test]
    fn test_advance_deadline_never_moves_backwards() {
        let period = 500_000;
        let mut next = 0u64;
        for current in [100_000u64, 700_000, 5_000_000, 5_100_000, 12_000_000] {
            let advanced = advance_deadline(next, current, period);
            assert!(advanced > next);
            next = advanced;
        }
    }

    #[test]
    fn test_monotonic_ns_advances() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }
}
