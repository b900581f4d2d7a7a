//! The two measurement workers: a periodic sender and a blocking receiver.
//!
//! Both run under SCHED_FIFO pinned to their configured CPUs. The loop
//! bodies are plain functions over injected state so the timing semantics
//! (first/last exclusion, catch-up, cancellation) are testable without
//! elevated privileges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::error;

use crate::clock;
use crate::config::{TestParameters, RUN_INDEFINITELY};
use crate::nic::NicTester;
use crate::report::ReportData;

/// Sender loop: absolute-deadline periodic wakeups on CLOCK_MONOTONIC.
///
/// Each iteration optionally sends a frame, records the interval since the
/// previous wake (excluding the first and last iterations), then sleeps
/// until the next grid point. A late wake skips ahead to the next future
/// grid point; missed periods are never replayed.
pub fn sender_loop(
    iterations: u64,
    send_sleep_ns: u64,
    tester: Option<&dyn NicTester>,
    running: &AtomicBool,
    data: &ReportData,
) -> Result<()> {
    let mut index: u64 = 0;
    let mut previous: u64 = 0;
    let mut next = clock::monotonic_ns();

    while running.load(Ordering::Acquire) && (iterations == RUN_INDEFINITELY || index < iterations)
    {
        // Startup and teardown transients stay out of the statistics.
        let record = index != 0 && index != iterations - 1;

        if let Some(tester) = tester {
            tester.send().context("sending probe frame")?;
        }

        let current = clock::monotonic_ns();
        if record {
            data.record(current - previous);
        }

        next = clock::advance_deadline(next, current, send_sleep_ns);
        clock::sleep_until(next);

        previous = current;
        index += 1;
    }

    Ok(())
}

/// Receiver loop: pacing comes from the wire, not from a timer.
///
/// `Ok(false)` from the tester is an unrecoverable receive failure: the run
/// is terminated by clearing `running`.
pub fn receiver_loop(
    iterations: u64,
    tester: &dyn NicTester,
    running: &AtomicBool,
    data: &ReportData,
) -> Result<()> {
    let mut index: u64 = 0;
    let mut previous: u64 = 0;

    while running.load(Ordering::Acquire) && (iterations == RUN_INDEFINITELY || index < iterations)
    {
        let record = index != 0 && index != iterations - 1;

        if !tester.receive().context("receiving probe frame")? {
            running.store(false, Ordering::Release);
            error!(index, "receive failed; stopping run");
            break;
        }

        let current = clock::monotonic_ns();
        if record {
            data.record(current - previous);
        }

        previous = current;
        index += 1;
    }

    Ok(())
}

/// Sender thread entry: elevate, pin, then run the loop. Any failure clears
/// `running` and logs exactly one line.
pub fn run_sender(
    params: TestParameters,
    tester: Option<Arc<dyn NicTester>>,
    running: Arc<AtomicBool>,
    data: Arc<ReportData>,
) {
    let result = crate::rt::configure_current_thread(params.send_priority, params.send_cpu)
        .and_then(|()| {
            sender_loop(
                params.iterations,
                params.send_sleep_ns,
                tester.as_deref(),
                &running,
                &data,
            )
        });

    if let Err(error) = result {
        running.store(false, Ordering::Release);
        error!("sender thread failed: {error:#}");
    }
}

/// Receiver thread entry, mirroring [`run_sender`].
pub fn run_receiver(
    params: TestParameters,
    tester: Arc<dyn NicTester>,
    running: Arc<AtomicBool>,
    data: Arc<ReportData>,
) {
    let result = crate::rt::configure_current_thread(params.receive_priority, params.receive_cpu)
        .and_then(|()| receiver_loop(params.iterations, tester.as_ref(), &running, &data));

    if let Err(error) = result {
        running.store(false, Ordering::Release);
        error!("receiver thread failed: {error:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    /// Tester that paces receives with a short sleep and can be told to
    /// fail after a fixed number of frames.
    struct FakeTester {
        sends: AtomicU64,
        receives: AtomicU64,
        fail_after: u64,
    }

    impl FakeTester {
        fn new(fail_after: u64) -> Self {
            Self {
                sends: AtomicU64::new(0),
                receives: AtomicU64::new(0),
                fail_after,
            }
        }
    }

    impl NicTester for FakeTester {
        fn send(&self) -> Result<()> {
            self.sends.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn receive(&self) -> Result<bool> {
            std::thread::sleep(Duration::from_micros(200));
            let seen = self.receives.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(seen <= self.fail_after)
        }
    }

    #[test]
    fn test_sender_excludes_first_and_last() {
        let data = ReportData::new(1_000);
        let running = AtomicBool::new(true);

        sender_loop(6, 100_000, None, &running, &data).unwrap();

        // Six iterations, minus the first and the last.
        assert_eq!(data.count(), 4);
    }

    #[test]
    fn test_sender_two_iterations_record_nothing() {
        let data = ReportData::new(1_000);
        let running = AtomicBool::new(true);

        sender_loop(2, 50_000, None, &running, &data).unwrap();
        assert_eq!(data.count(), 0);
    }

    #[test]
    fn test_sender_cancellation_within_one_iteration() {
        let data = Arc::new(ReportData::new(1_000));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let data = Arc::clone(&data);
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                sender_loop(RUN_INDEFINITELY, 1_000_000, None, &running, &data)
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        running.store(false, Ordering::Release);
        handle.join().expect("sender joins").unwrap();
    }

    #[test]
    fn test_sender_invokes_tester_every_iteration() {
        let data = ReportData::new(1_000);
        let running = AtomicBool::new(true);
        let tester = FakeTester::new(u64::MAX);

        sender_loop(4, 50_000, Some(&tester), &running, &data).unwrap();
        assert_eq!(tester.sends.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_receiver_counts_intervals() {
        let data = ReportData::new(1_000);
        let running = AtomicBool::new(true);
        let tester = FakeTester::new(u64::MAX);

        receiver_loop(5, &tester, &running, &data).unwrap();

        assert_eq!(tester.receives.load(Ordering::Relaxed), 5);
        assert_eq!(data.count(), 3);
        assert!(running.load(Ordering::Acquire));
    }

    #[test]
    fn test_receiver_stops_run_on_failed_receive() {
        let data = ReportData::new(1_000);
        let running = AtomicBool::new(true);
        let tester = FakeTester::new(3);

        receiver_loop(RUN_INDEFINITELY, &tester, &running, &data).unwrap();

        assert!(!running.load(Ordering::Acquire));
        // Three good frames then the failing one.
        assert_eq!(tester.receives.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_sender_interval_tracks_period() {
        let data = ReportData::new(10_000);
        let running = AtomicBool::new(true);
        let period = 200_000; // 200 us

        sender_loop(12, period, None, &running, &data).unwrap();

        let snap = data.snapshot();
        assert_eq!(snap.count, 10);
        // Absolute-deadline pacing: every interval is a positive span and
        // the median sits near the grid even on a loaded test host.
        assert!(snap.min_ns > 0);
        assert!(snap.p50_ns >= period / 2, "p50 {} below half period", snap.p50_ns);
    }
}
