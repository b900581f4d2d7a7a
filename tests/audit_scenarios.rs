//! End-to-end audit scenarios against stub host fixtures.

use rtprobe::audit::checks::{CheckContext, CheckKind, Status};
use rtprobe::audit::{evaluate_audit, StubDataSource};

const COMPLIANT_INTERRUPTS: &str = "\
           CPU0       CPU1       CPU2       CPU3
  10:       1000        200         30          0   IR-IO-APIC   10-edge      acpi
  31:        250          9          0          0   IR-PCI-MSI   31-edge      ahci[0000:00:17.0]
 120:      88211          0          0          0   IR-PCI-MSI 524288-edge    eno1-rx-0
";

/// A host tuned exactly as the audit wants it, core 3 as the RT core.
fn compliant_host() -> StubDataSource {
    StubDataSource::new()
        .with_file("/sys/kernel/realtime", "1\n")
        .with_file("/proc/swaps", "Filename Type Size Used Priority\n")
        .with_file("/proc/sys/kernel/timer_migration", "0\n")
        .with_file("/proc/sys/kernel/sched_rt_runtime_us", "-1\n")
        .with_file(
            "/sys/devices/system/clocksource/clocksource0/current_clocksource",
            "tsc\n",
        )
        .with_file("/sys/devices/system/cpu/isolated", "3\n")
        .with_file("/sys/devices/system/cpu/nohz_full", "3\n")
        .with_file("/sys/devices/system/cpu/rcu_nocbs", "3\n")
        .with_file(
            "/sys/devices/system/cpu/cpu3/cpufreq/scaling_governor",
            "performance\n",
        )
        .with_file("/sys/devices/system/cpu/cpu3/cpufreq/scaling_cur_freq", "2400000\n")
        .with_file("/sys/devices/system/cpu/cpu3/cpufreq/scaling_min_freq", "2400000\n")
        .with_file("/sys/devices/system/cpu/cpu3/cpufreq/scaling_max_freq", "2400000\n")
        .with_file(
            "/sys/devices/system/cpu/cpu3/topology/thread_siblings_list",
            "3\n",
        )
        .with_file("/proc/interrupts", COMPLIANT_INTERRUPTS)
        .with_file("/sys/devices/system/cpu/cpufreq/boost", "0\n")
        .with_cmdline("quiet irqaffinity=0-2 intel_idle.max_cstate=1 nohz_full=3 rcu_nocbs=3")
}

fn rt_core_ctx(cpu: u32, nic: Option<&str>) -> CheckContext {
    CheckContext {
        cpu: Some(cpu),
        nic: nic.map(str::to_string),
    }
}

#[test]
fn fully_compliant_host_passes_every_system_and_core_check() {
    let report = evaluate_audit(&rt_core_ctx(3, None), &compliant_host());

    for result in report.system.iter().chain(&report.core) {
        assert_eq!(
            result.status,
            Status::Pass,
            "{:?} expected Pass, got {:?}: {}",
            result.kind,
            result.status,
            result.reason
        );
    }
    assert!(report.nic.is_empty(), "cyclic audit has no NIC section");
}

#[test]
fn cpu0_subject_fails_isolation_regardless_of_isolated_set() {
    for isolated in ["", "0", "0-3"] {
        let stub = StubDataSource::new().with_file("/sys/devices/system/cpu/isolated", isolated);
        let report = evaluate_audit(&rt_core_ctx(0, None), &stub);

        let result = report
            .core
            .iter()
            .find(|r| r.kind == CheckKind::CoreIsolated)
            .expect("isolation check present");
        assert_eq!(result.status, Status::Fail, "isolated={isolated:?}");
        assert_eq!(result.reason, "CPU0 selected; choose non-CPU0");
    }
}

#[test]
fn locked_frequency_with_excess_drift_fails() {
    // min == max == 2400000 but cur drifted by 200000; the 5% band around
    // the locked frequency is only 120000 wide.
    let stub = compliant_host()
        .with_file("/sys/devices/system/cpu/cpu3/cpufreq/scaling_cur_freq", "2600000\n");
    let report = evaluate_audit(&rt_core_ctx(3, None), &stub);

    let result = report
        .core
        .iter()
        .find(|r| r.kind == CheckKind::CpuFrequency)
        .expect("frequency check present");
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.reason, "cur=2600000 kHz, locked=2400000 kHz");
}

#[test]
fn absent_nic_reports_unknown_and_skips_dependent_checks() {
    let report = evaluate_audit(&rt_core_ctx(3, Some("eth9")), &compliant_host());

    assert_eq!(report.nic.len(), 1);
    assert_eq!(report.nic[0].kind, CheckKind::NicPresent);
    assert_eq!(report.nic[0].status, Status::Unknown);
    assert_eq!(report.nic[0].reason, "interface not found");
}

#[test]
fn present_nic_dispatches_full_section_in_order() {
    let stub = compliant_host()
        .with_file("/sys/class/net/eno1/operstate", "up\n")
        .with_file("/sys/class/net/eno1/queues/rx-0/rps_cpus", "0\n")
        .with_file("/proc/irq/120/smp_affinity_list", "3\n")
        .with_interface_addrs("eno1", 0, 0);
    let report = evaluate_audit(&rt_core_ctx(3, Some("eno1")), &stub);

    let kinds: Vec<CheckKind> = report.nic.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CheckKind::NicPresent,
            CheckKind::NicLinkUp,
            CheckKind::NicQuiet,
            CheckKind::NicIrqsPinned,
            CheckKind::RpsDisabled,
        ]
    );
    for result in &report.nic {
        assert_eq!(
            result.status,
            Status::Pass,
            "{:?}: {}",
            result.kind,
            result.reason
        );
    }
}

#[test]
fn report_sections_keep_catalog_order() {
    let report = evaluate_audit(&rt_core_ctx(3, None), &StubDataSource::new());

    let system: Vec<CheckKind> = report.system.iter().map(|r| r.kind).collect();
    assert_eq!(
        system,
        vec![
            CheckKind::PreemptRtActive,
            CheckKind::SwapDisabled,
            CheckKind::TimerMigration,
            CheckKind::RtThrottlingDisabled,
            CheckKind::ClocksourceStable,
        ]
    );

    let core: Vec<CheckKind> = report.core.iter().map(|r| r.kind).collect();
    assert_eq!(
        core,
        vec![
            CheckKind::CoreIsolated,
            CheckKind::NohzFull,
            CheckKind::RcuNoCbs,
            CheckKind::CpuGovernor,
            CheckKind::CpuFrequency,
            CheckKind::IrqAffinityDefaultAvoidsRt,
            CheckKind::NoUnrelatedIrqsOnRt,
            CheckKind::SmtSiblingIsolated,
            CheckKind::DeepCStatesCapped,
            CheckKind::TurboBoostPolicy,
        ]
    );
}

#[test]
fn unconfigured_host_yields_no_panics_and_no_passes_needing_evidence() {
    // A stub with nothing seeded: every check must settle on Unknown or
    // Fail without panicking, never Pass.
    let report = evaluate_audit(&rt_core_ctx(3, Some("eno1")), &StubDataSource::new());

    for result in report.system.iter().chain(&report.core).chain(&report.nic) {
        assert_ne!(
            result.status,
            Status::Pass,
            "{:?} passed with no evidence: {}",
            result.kind,
            result.reason
        );
        assert!(!result.reason.is_empty(), "{:?} has no reason", result.kind);
    }
}
