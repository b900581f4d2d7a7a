//! The RT readiness check catalog.
//!
//! Each check is a pure function of `(CheckContext, &dyn DataSource)`
//! classifying host evidence into a three-valued [`Status`]. `Unknown` always
//! means "evidence not available", never "warn". The catalog is a plain list
//! of [`Check`] records; there is no trait hierarchy over checks.

use super::cpulist::parse_cpu_list;
use super::source::DataSource;

/// Outcome of one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Pass,
    Fail,
    Unknown,
}

/// Stable identity of each check, independent of its display name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckKind {
    PreemptRtActive,
    SwapDisabled,
    TimerMigration,
    RtThrottlingDisabled,
    ClocksourceStable,
    CoreIsolated,
    NohzFull,
    RcuNoCbs,
    CpuGovernor,
    CpuFrequency,
    IrqAffinityDefaultAvoidsRt,
    NoUnrelatedIrqsOnRt,
    SmtSiblingIsolated,
    DeepCStatesCapped,
    TurboBoostPolicy,
    NicPresent,
    NicLinkUp,
    NicIrqsPinned,
    RpsDisabled,
    NicQuiet,
}

/// Report grouping only; dispatch order is fixed separately by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    System,
    Cpu,
    Nic,
}

/// The audit subject: the RT core under test and the NIC to be exercised.
/// Checks that need a missing subject return `Unknown` with a reason.
#[derive(Clone, Debug, Default)]
pub struct CheckContext {
    pub cpu: Option<u32>,
    pub nic: Option<String>,
}

/// One evaluated finding.
#[derive(Clone, Debug)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub status: Status,
    pub name: &'static str,
    pub reason: String,
}

type EvalFn = fn(&CheckContext, &dyn DataSource) -> (Status, String);

/// A catalog entry: identity, display metadata, and the decision function.
pub struct Check {
    pub kind: CheckKind,
    pub name: &'static str,
    pub domain: Domain,
    eval: EvalFn,
}

impl Check {
    pub fn evaluate(&self, ctx: &CheckContext, source: &dyn DataSource) -> CheckResult {
        let (status, reason) = (self.eval)(ctx, source);
        CheckResult {
            kind: self.kind,
            status,
            name: self.name,
            reason,
        }
    }
}

/// System-wide checks, in report order. `RtThrottlingDisabled` carries
/// `Domain::Cpu` but has always been reported in the System section.
pub fn system_checks() -> Vec<Check> {
    vec![
        Check {
            kind: CheckKind::PreemptRtActive,
            name: "PREEMPT_RT active",
            domain: Domain::System,
            eval: eval_preempt_rt,
        },
        Check {
            kind: CheckKind::SwapDisabled,
            name: "Swap disabled",
            domain: Domain::System,
            eval: eval_swap_disabled,
        },
        Check {
            kind: CheckKind::TimerMigration,
            name: "Timer Migration disabled",
            domain: Domain::System,
            eval: eval_timer_migration,
        },
        Check {
            kind: CheckKind::RtThrottlingDisabled,
            name: "RT throttling disabled",
            domain: Domain::Cpu,
            eval: eval_rt_throttling,
        },
        Check {
            kind: CheckKind::ClocksourceStable,
            name: "Clocksource stable",
            domain: Domain::System,
            eval: eval_clocksource,
        },
    ]
}

/// Per-core checks, in report order. `NoUnrelatedIrqsOnRt` carries
/// `Domain::System` but has always been reported in the Core section.
pub fn core_checks() -> Vec<Check> {
    vec![
        Check {
            kind: CheckKind::CoreIsolated,
            name: "RT core isolated",
            domain: Domain::Cpu,
            eval: eval_core_isolated,
        },
        Check {
            kind: CheckKind::NohzFull,
            name: "nohz_full on RT core",
            domain: Domain::Cpu,
            eval: eval_nohz_full,
        },
        Check {
            kind: CheckKind::RcuNoCbs,
            name: "rcu_nocbs includes RT core",
            domain: Domain::Cpu,
            eval: eval_rcu_nocbs,
        },
        Check {
            kind: CheckKind::CpuGovernor,
            name: "CPU governor = performance",
            domain: Domain::Cpu,
            eval: eval_cpu_governor,
        },
        Check {
            kind: CheckKind::CpuFrequency,
            name: "CPU current frequency",
            domain: Domain::Cpu,
            eval: eval_cpu_frequency,
        },
        Check {
            kind: CheckKind::IrqAffinityDefaultAvoidsRt,
            name: "irqaffinity excludes RT core",
            domain: Domain::Cpu,
            eval: eval_irq_affinity_default,
        },
        Check {
            kind: CheckKind::NoUnrelatedIrqsOnRt,
            name: "No unrelated IRQs on RT core",
            domain: Domain::System,
            eval: eval_no_unrelated_irqs,
        },
        Check {
            kind: CheckKind::SmtSiblingIsolated,
            name: "SMT sibling isolated/disabled",
            domain: Domain::Cpu,
            eval: eval_smt_sibling,
        },
        Check {
            kind: CheckKind::DeepCStatesCapped,
            name: "Deep C-states capped",
            domain: Domain::Cpu,
            eval: eval_cstates_capped,
        },
        Check {
            kind: CheckKind::TurboBoostPolicy,
            name: "Turbo/boost disabled",
            domain: Domain::Cpu,
            eval: eval_turbo_policy,
        },
    ]
}

/// The NIC presence gate. Dependent NIC checks are only dispatched when this
/// one passes; a missing NIC is "no subject", not a failure.
pub fn nic_present_check() -> Check {
    Check {
        kind: CheckKind::NicPresent,
        name: "NIC interface present",
        domain: Domain::Nic,
        eval: eval_nic_present,
    }
}

/// NIC checks dispatched after the presence gate, in report order.
pub fn nic_checks() -> Vec<Check> {
    vec![
        Check {
            kind: CheckKind::NicLinkUp,
            name: "NIC link is UP",
            domain: Domain::Nic,
            eval: eval_nic_link_up,
        },
        Check {
            kind: CheckKind::NicQuiet,
            name: "NIC is quiet",
            domain: Domain::Nic,
            eval: eval_nic_quiet,
        },
        Check {
            kind: CheckKind::NicIrqsPinned,
            name: "NIC IRQs pinned to RT core",
            domain: Domain::Nic,
            eval: eval_nic_irqs_pinned,
        },
        Check {
            kind: CheckKind::RpsDisabled,
            name: "RPS disabled on NIC",
            domain: Domain::Nic,
            eval: eval_rps_disabled,
        },
    ]
}

// Shared helpers

fn read_trimmed(source: &dyn DataSource, path: &str) -> Option<String> {
    source.read(path).map(|s| s.trim().to_string())
}

fn read_i64(source: &dyn DataSource, path: &str) -> Option<i64> {
    read_trimmed(source, path)?.parse().ok()
}

fn nic_exists(source: &dyn DataSource, nic: &str) -> bool {
    source.read(&format!("/sys/class/net/{nic}/operstate")).is_some()
        || source.read(&format!("/sys/class/net/{nic}/carrier")).is_some()
        || source.read(&format!("/sys/class/net/{nic}/address")).is_some()
}

fn or_empty(raw: &str) -> &str {
    if raw.is_empty() {
        "(empty)"
    } else {
        raw
    }
}

// System checks

fn eval_preempt_rt(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    if let Some(value) = read_trimmed(source, "/sys/kernel/realtime") {
        if value == "1" {
            return (Status::Pass, "/sys/kernel/realtime=1".to_string());
        }
        if value == "0" {
            return (Status::Fail, "/sys/kernel/realtime=0".to_string());
        }
    }

    // The kernel version banner carries the preemption model.
    if let Some(version) = source.read("/proc/version") {
        if version.contains("PREEMPT RT") || version.contains("PREEMPT_RT") {
            return (Status::Pass, "PREEMPT RT in /proc/version".to_string());
        }
    }

    if let Some(release) = read_trimmed(source, "/proc/sys/kernel/osrelease") {
        if let Some(config) = source.read(&format!("/boot/config-{release}")) {
            if config.contains("CONFIG_PREEMPT_RT=y") || config.contains("CONFIG_PREEMPT_RT_FULL=y")
            {
                return (
                    Status::Pass,
                    format!("/boot/config-{release} has CONFIG_PREEMPT_RT=y"),
                );
            }
            if config.contains("CONFIG_PREEMPT=y") {
                return (
                    Status::Fail,
                    "Only low-latency PREEMPT, not RT".to_string(),
                );
            }
        }
    }

    (Status::Fail, "No evidence of RT kernel".to_string())
}

fn eval_swap_disabled(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(swaps) = source.read("/proc/swaps") else {
        return (Status::Unknown, "cannot read /proc/swaps".to_string());
    };

    let mut lines = swaps.lines();
    if lines.next().is_none() {
        return (Status::Unknown, "unexpected /proc/swaps format".to_string());
    }

    let mut active = Vec::new();
    for line in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() >= 4 {
            active.push(format!("{} size={} used={}", tokens[0], tokens[2], tokens[3]));
        } else {
            active.push(tokens[0].to_string());
        }
    }

    if active.is_empty() {
        return (Status::Pass, "/proc/swaps empty".to_string());
    }
    (Status::Fail, format!("active: {}", active.join(", ")))
}

fn eval_timer_migration(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(value) = read_trimmed(source, "/proc/sys/kernel/timer_migration") else {
        return (Status::Unknown, "cannot read timer_migration".to_string());
    };
    if value == "0" {
        return (Status::Pass, "timer_migration=0".to_string());
    }
    (Status::Fail, format!("timer_migration={value}"))
}

fn eval_rt_throttling(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(value) = read_trimmed(source, "/proc/sys/kernel/sched_rt_runtime_us") else {
        return (Status::Unknown, "cannot read sched_rt_runtime_us".to_string());
    };
    if value == "-1" {
        return (Status::Pass, "sched_rt_runtime_us=-1".to_string());
    }
    (Status::Fail, format!("sched_rt_runtime_us={value}"))
}

fn eval_clocksource(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    const BASE: &str = "/sys/devices/system/clocksource/clocksource0";

    let Some(current) = read_trimmed(source, &format!("{BASE}/current_clocksource")) else {
        return (Status::Unknown, "cannot read current_clocksource".to_string());
    };

    match current.as_str() {
        "tsc" => return (Status::Pass, "tsc".to_string()),
        "hpet" => return (Status::Pass, "hpet".to_string()),
        // ARM systems have no alternative worth switching to.
        "arch_sys_counter" => {
            if let Some(available) = read_trimmed(source, &format!("{BASE}/available_clocksource"))
            {
                if !available.contains(' ') {
                    return (Status::Pass, "arch_sys_counter (ARM standard)".to_string());
                }
            }
            return (Status::Pass, "arch_sys_counter".to_string());
        }
        _ => {}
    }

    let mut detail = current.clone();
    if let Some(available) = read_trimmed(source, &format!("{BASE}/available_clocksource")) {
        detail.push_str("; available=");
        detail.push_str(&available);
    }

    if current == "jiffies" {
        return (Status::Fail, detail);
    }
    (Status::Unknown, detail)
}

// Core checks

fn eval_core_isolated(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let Some(raw) = read_trimmed(source, "/sys/devices/system/cpu/isolated") else {
        return (Status::Unknown, "no /sys/.../isolated".to_string());
    };

    // CPU0 services housekeeping IRQs and timekeeping; it is never a good
    // RT core even when listed as isolated.
    if cpu == 0 {
        return (Status::Fail, "CPU0 selected; choose non-CPU0".to_string());
    }

    let isolated = parse_cpu_list(&raw);
    if isolated.contains(&cpu) {
        return (Status::Pass, format!("isolated list: {}", or_empty(&raw)));
    }
    (
        Status::Fail,
        format!("CPU{cpu} not in isolated: {}", or_empty(&raw)),
    )
}

fn eval_nohz_full(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };

    if let Some(raw) = read_trimmed(source, "/sys/devices/system/cpu/nohz_full") {
        if parse_cpu_list(&raw).contains(&cpu) {
            return (Status::Pass, format!("nohz_full list: {}", or_empty(&raw)));
        }
        return (
            Status::Fail,
            format!("CPU{cpu} not in nohz_full: {}", or_empty(&raw)),
        );
    }

    if let Some(value) = source.cmdline_param("nohz_full") {
        if parse_cpu_list(&value).contains(&cpu) {
            return (Status::Pass, format!("cmdline nohz_full={value}"));
        }
        return (
            Status::Fail,
            format!("RT core not in cmdline nohz_full={value}"),
        );
    }

    (
        Status::Unknown,
        "no sysfs entry and no cmdline param".to_string(),
    )
}

fn eval_rcu_nocbs(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };

    let raw = if let Some(sysfs) = read_trimmed(source, "/sys/devices/system/cpu/rcu_nocbs") {
        sysfs
    } else if let Some(cmdline) = source.cmdline_param("rcu_nocbs") {
        cmdline.trim().to_string()
    } else {
        return (Status::Unknown, "no sysfs and no cmdline param".to_string());
    };

    if parse_cpu_list(&raw).contains(&cpu) {
        return (Status::Pass, raw);
    }
    (
        Status::Fail,
        format!("CPU{cpu} not in rcu_nocbs: {}", or_empty(&raw)),
    )
}

fn eval_cpu_governor(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let path = format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/scaling_governor");
    let Some(governor) = read_trimmed(source, &path) else {
        return (Status::Unknown, format!("no cpufreq governor for cpu{cpu}"));
    };
    if governor == "performance" {
        return (Status::Pass, format!("governor={governor}"));
    }
    (Status::Fail, format!("governor={governor}"))
}

fn eval_cpu_frequency(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let base = format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq");
    let cur = read_i64(source, &format!("{base}/scaling_cur_freq"));
    let min = read_i64(source, &format!("{base}/scaling_min_freq"));
    let max = read_i64(source, &format!("{base}/scaling_max_freq"));

    match (cur, min, max) {
        (Some(cur), Some(min), Some(max)) => {
            if min == max {
                // Tolerance is 5% of the locked frequency, not of cur.
                let tolerance = max * 5 / 100;
                if (cur - max).abs() <= tolerance {
                    (Status::Pass, format!("{max} kHz (locked)"))
                } else {
                    (Status::Fail, format!("cur={cur} kHz, locked={max} kHz"))
                }
            } else {
                (
                    Status::Fail,
                    format!("cur={cur} kHz, min={min} kHz, max={max} kHz"),
                )
            }
        }
        (None, None, None) => eval_cpuinfo_mhz_fallback(cpu, source),
        (cur, min, max) => {
            let fmt = |v: Option<i64>| match v {
                Some(v) => format!("{v} kHz"),
                None => "?".to_string(),
            };
            (
                Status::Unknown,
                format!("cur={}, min={}, max={}", fmt(cur), fmt(min), fmt(max)),
            )
        }
    }
}

fn eval_cpuinfo_mhz_fallback(cpu: u32, source: &dyn DataSource) -> (Status, String) {
    if let Some(cpuinfo) = source.read("/proc/cpuinfo") {
        let mut current_processor: Option<u32> = None;
        for line in cpuinfo.lines() {
            if line.starts_with("processor") {
                current_processor = line
                    .split_once(':')
                    .and_then(|(_, v)| v.trim().parse().ok());
            } else if line.starts_with("cpu MHz") && current_processor == Some(cpu) {
                if let Some(mhz) = line
                    .split_once(':')
                    .and_then(|(_, v)| v.trim().parse::<f64>().ok())
                {
                    return (Status::Unknown, format!("{mhz} MHz (/proc/cpuinfo)"));
                }
            }
        }
    }
    (Status::Unknown, "unavailable".to_string())
}

fn eval_irq_affinity_default(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let Some(value) = source.cmdline_param("irqaffinity") else {
        return (Status::Unknown, "no irqaffinity kernel param".to_string());
    };
    let set = parse_cpu_list(&value);
    if set.is_empty() {
        return (Status::Unknown, "empty list".to_string());
    }
    if set.contains(&cpu) {
        return (
            Status::Fail,
            format!("RT core present in irqaffinity: {value}"),
        );
    }
    (Status::Pass, value)
}

/// How many offending IRQs to name before eliding the rest.
const MAX_IRQS_TO_SHOW: usize = 5;

fn eval_no_unrelated_irqs(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let Some(content) = source.read("/proc/interrupts") else {
        return (Status::Unknown, "cannot read /proc/interrupts".to_string());
    };

    // The NIC's own IRQs are expected on the RT core; everything else firing
    // there is an offender. Matching is by substring of the row label.
    let nic_filter = ctx.nic.clone().unwrap_or_default();

    let mut cpu_column: Option<usize> = None;
    let mut header_done = false;
    let mut offenders: Vec<String> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !header_done {
            if line.contains("CPU0") {
                let mut index = 0usize;
                for column in line.split_whitespace() {
                    if let Some(id) = column.strip_prefix("CPU") {
                        if id == cpu.to_string() {
                            cpu_column = Some(index);
                        }
                        index += 1;
                    }
                }
                header_done = true;
            }
            continue;
        }

        let trimmed = line.trim_start();
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let Some((irq_number, rest)) = trimmed.split_once(':') else {
            continue;
        };

        // Leading numeric tokens are per-CPU counts; the first non-numeric
        // token starts the label, which runs to end of line.
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let mut column = 0usize;
        let mut value_at_rt_core = 0i64;
        let mut label: Option<String> = None;
        for (i, token) in tokens.iter().enumerate() {
            if token.chars().all(|c| c.is_ascii_digit()) {
                if Some(column) == cpu_column {
                    value_at_rt_core = token.parse().unwrap_or(0);
                }
                column += 1;
            } else {
                label = Some(tokens[i..].join(" "));
                break;
            }
        }

        if value_at_rt_core > 0 {
            match &label {
                Some(label) if !label.contains(&nic_filter) => {
                    offenders.push(format!("{irq_number} {label}"));
                }
                Some(_) => {}
                None => offenders.push(format!("{irq_number} (unlabeled)")),
            }
        }
    }

    if cpu_column.is_none() {
        return (Status::Unknown, "could not map CPU column".to_string());
    }
    if offenders.is_empty() {
        return (Status::Pass, "clean".to_string());
    }

    let mut reason = offenders
        .iter()
        .take(MAX_IRQS_TO_SHOW)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if offenders.len() > MAX_IRQS_TO_SHOW {
        reason.push_str(&format!(", +{} more", offenders.len() - MAX_IRQS_TO_SHOW));
    }
    (Status::Fail, reason)
}

fn eval_smt_sibling(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let path = format!("/sys/devices/system/cpu/cpu{cpu}/topology/thread_siblings_list");
    let Some(raw) = source.read(&path) else {
        return (Status::Unknown, "no thread_siblings_list".to_string());
    };

    let mut siblings = parse_cpu_list(&raw);
    siblings.remove(&cpu);
    if siblings.is_empty() {
        return (Status::Pass, "no sibling".to_string());
    }

    let Some(isolated_raw) = source.read("/sys/devices/system/cpu/isolated") else {
        return (Status::Unknown, "cannot read isolated".to_string());
    };
    let isolated = parse_cpu_list(&isolated_raw);
    for sibling in siblings {
        if !isolated.contains(&sibling) {
            return (Status::Fail, format!("sibling CPU{sibling} not isolated"));
        }
    }
    (Status::Pass, "siblings all isolated".to_string())
}

fn eval_cstates_capped(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    if let Some(cmdline) = source.read("/proc/cmdline") {
        if cmdline.contains("cpuidle.off=1") {
            return (Status::Pass, "cpuidle.off=1".to_string());
        }
        if cmdline.contains("intel_idle.max_cstate=1")
            || cmdline.contains("processor.max_cstate=1")
        {
            return (Status::Pass, "cmdline caps to C1".to_string());
        }
    }

    if let Some(value) = read_trimmed(source, "/sys/module/intel_idle/parameters/max_cstate") {
        if value == "1" || value == "0" {
            return (Status::Pass, format!("intel_idle.max_cstate={value}"));
        }
        return (Status::Fail, format!("intel_idle.max_cstate={value}"));
    }

    if let Some(value) = read_trimmed(source, "/sys/module/processor/parameters/max_cstate") {
        if value == "1" || value == "0" {
            return (Status::Pass, format!("processor.max_cstate={value}"));
        }
        return (Status::Fail, format!("processor.max_cstate={value}"));
    }

    (Status::Unknown, "no indicators".to_string())
}

fn eval_turbo_policy(_ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    if let Some(value) = read_trimmed(source, "/sys/devices/system/cpu/cpufreq/boost") {
        if value == "0" {
            return (Status::Pass, "cpufreq/boost=0".to_string());
        }
        if value == "1" {
            return (Status::Fail, "cpufreq/boost=1".to_string());
        }
    }
    if let Some(value) = read_trimmed(source, "/sys/devices/system/cpu/intel_pstate/no_turbo") {
        if value == "1" {
            return (Status::Pass, "intel_pstate/no_turbo=1".to_string());
        }
        if value == "0" {
            return (Status::Fail, "intel_pstate/no_turbo=0".to_string());
        }
    }
    (Status::Unknown, "no boost knobs".to_string())
}

// NIC checks

fn eval_nic_present(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(nic) = &ctx.nic else {
        return (Status::Unknown, "no NIC in context".to_string());
    };
    if nic_exists(source, nic) {
        return (Status::Pass, "exists".to_string());
    }
    (Status::Unknown, "interface not found".to_string())
}

fn eval_nic_link_up(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(nic) = &ctx.nic else {
        return (Status::Unknown, "no NIC in context".to_string());
    };
    if !nic_exists(source, nic) {
        return (Status::Unknown, "NIC not found".to_string());
    }

    if let Some(operstate) = read_trimmed(source, &format!("/sys/class/net/{nic}/operstate")) {
        if operstate == "up" {
            return (Status::Pass, "operstate=up".to_string());
        }
        if !operstate.is_empty() {
            return (Status::Fail, format!("operstate={operstate}"));
        }
    }
    if let Some(carrier) = read_trimmed(source, &format!("/sys/class/net/{nic}/carrier")) {
        if carrier == "1" {
            return (Status::Pass, "carrier=1".to_string());
        }
        if carrier == "0" {
            return (Status::Fail, "carrier=0".to_string());
        }
    }
    (Status::Unknown, "no operstate/carrier".to_string())
}

fn eval_nic_irqs_pinned(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(cpu) = ctx.cpu else {
        return (Status::Unknown, "no CPU subject".to_string());
    };
    let Some(nic) = &ctx.nic else {
        return (Status::Unknown, "no NIC in context".to_string());
    };
    if !nic_exists(source, nic) {
        return (Status::Unknown, "NIC not found".to_string());
    }
    let Some(content) = source.read("/proc/interrupts") else {
        return (Status::Unknown, "cannot read /proc/interrupts".to_string());
    };

    let mut nic_irqs: Vec<u32> = Vec::new();
    for line in content.lines() {
        if !line.contains(nic.as_str()) {
            continue;
        }
        let trimmed = line.trim_start();
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if let Some((irq, _)) = trimmed.split_once(':') {
            if let Ok(irq) = irq.parse() {
                nic_irqs.push(irq);
            }
        }
    }
    if nic_irqs.is_empty() {
        return (Status::Unknown, "no NIC IRQs seen".to_string());
    }

    let mut bad_irqs: Vec<u32> = Vec::new();
    for irq in nic_irqs {
        let Some(list) = source.read(&format!("/proc/irq/{irq}/smp_affinity_list")) else {
            return (
                Status::Unknown,
                format!("cannot read smp_affinity_list for IRQ {irq}"),
            );
        };
        let affinity = parse_cpu_list(&list);
        if !(affinity.len() == 1 && affinity.contains(&cpu)) {
            bad_irqs.push(irq);
        }
    }

    if bad_irqs.is_empty() {
        return (Status::Pass, format!("all pinned to CPU{cpu}"));
    }
    let listed = bad_irqs
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    (Status::Fail, format!("not pinned: {listed}"))
}

fn eval_rps_disabled(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(nic) = &ctx.nic else {
        return (Status::Unknown, "no NIC in context".to_string());
    };
    if !nic_exists(source, nic) {
        return (Status::Unknown, "NIC not found".to_string());
    }

    let queues_dir = format!("/sys/class/net/{nic}/queues");
    let Some(entries) = source.list_dir(&queues_dir) else {
        return (Status::Unknown, "no queues dir".to_string());
    };

    let mut checked = 0usize;
    let mut any_bad = false;
    for entry in entries {
        if !entry.starts_with("rx-") {
            continue;
        }
        let path = format!("{queues_dir}/{entry}/rps_cpus");
        let Some(mask) = source.read(&path) else {
            return (Status::Unknown, format!("cannot read {path}"));
        };
        let zero = mask
            .chars()
            .filter(|c| !matches!(c, ',' | '\n' | ' ' | '\t'))
            .all(|c| c == '0');
        if !zero {
            any_bad = true;
        }
        checked += 1;
    }

    if checked == 0 {
        return (Status::Unknown, "no rx queues found".to_string());
    }
    if any_bad {
        return (Status::Fail, "non-zero masks present".to_string());
    }
    (Status::Pass, "all zero masks".to_string())
}

fn default_route_v4_via(source: &dyn DataSource, nic: &str) -> bool {
    let Some(content) = source.read("/proc/net/route") else {
        return false;
    };
    for line in content.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(iface), Some(dest)) = (fields.next(), fields.next()) else {
            continue;
        };
        if iface == nic && dest == "00000000" {
            return true;
        }
    }
    false
}

fn default_route_v6_via(source: &dyn DataSource, nic: &str) -> bool {
    let Some(content) = source.read("/proc/net/ipv6_route") else {
        return false;
    };
    let zeros = "0".repeat(32);
    for line in content.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 10 {
            continue;
        }
        let dest = tokens[0];
        let prefix_len = tokens[1];
        let device = tokens[tokens.len() - 1];
        if dest == zeros && (prefix_len == "0" || prefix_len == "00000000") && device == nic {
            return true;
        }
    }
    false
}

fn eval_nic_quiet(ctx: &CheckContext, source: &dyn DataSource) -> (Status, String) {
    let Some(nic) = &ctx.nic else {
        return (Status::Unknown, "no NIC in context".to_string());
    };
    if !nic_exists(source, nic) {
        return (Status::Unknown, "NIC not found".to_string());
    }

    let addrs = source.interface_addrs(nic);
    let default_v4 = default_route_v4_via(source, nic);
    let default_v6 = default_route_v6_via(source, nic);

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    match addrs {
        Some((0, 0)) if !default_v4 && !default_v6 => {
            (Status::Pass, "no IPs, no default route".to_string())
        }
        Some((v4, v6)) => (
            Status::Fail,
            format!(
                "v4={v4}, v6={v6}, def4={}, def6={}",
                yes_no(default_v4),
                yes_no(default_v6)
            ),
        ),
        None => (
            Status::Unknown,
            format!(
                "addr=?, def4={}, def6={}",
                yes_no(default_v4),
                yes_no(default_v6)
            ),
        ),
    }
}
