//! RT readiness audit: check catalog, data-source seam, and report driver.

pub mod checks;
pub mod cpulist;
pub mod source;

use std::collections::BTreeSet;

pub use checks::{Check, CheckContext, CheckKind, CheckResult, Domain, Status};
pub use source::{DataSource, FsDataSource, StubDataSource};

/// All results of one audit, grouped the way the report prints them.
pub struct AuditReport {
    pub system: Vec<CheckResult>,
    pub core: Vec<CheckResult>,
    /// Present only when a NIC subject was given. The presence gate comes
    /// first; dependent checks are skipped (not reported) when it fails.
    pub nic: Vec<CheckResult>,
}

/// Evaluate the full catalog against one context and data source.
///
/// Pure with respect to the data source: the same `(ctx, source)` pair
/// always yields the same report.
pub fn evaluate_audit(ctx: &CheckContext, source: &dyn DataSource) -> AuditReport {
    let system = checks::system_checks()
        .iter()
        .map(|c| c.evaluate(ctx, source))
        .collect();
    let core = checks::core_checks()
        .iter()
        .map(|c| c.evaluate(ctx, source))
        .collect();

    let mut nic = Vec::new();
    if ctx.nic.is_some() {
        let presence = checks::nic_present_check().evaluate(ctx, source);
        let nic_ok = presence.status == Status::Pass;
        nic.push(presence);
        if nic_ok {
            nic.extend(checks::nic_checks().iter().map(|c| c.evaluate(ctx, source)));
        }
    }

    AuditReport { system, core, nic }
}

/// Run the audit against the live host and print the report to stdout.
///
/// `cpu` is validated against the configured CPU count first; an invalid
/// subject prints one error line and skips the audit entirely.
pub fn run_audit(cpu: u32, nic: Option<&str>) {
    let cpu_count = crate::rt::configured_cpus();
    if u64::from(cpu) >= cpu_count as u64 {
        eprintln!("Invalid CPU core {cpu}; must be between 0 and {}", cpu_count - 1);
        return;
    }

    let source = FsDataSource;
    let ctx = CheckContext {
        cpu: Some(cpu),
        nic: nic.map(str::to_string),
    };

    print!("{}", host_summary(&source));

    let report = evaluate_audit(&ctx, &source);

    print_section("System Checks");
    for result in &report.system {
        print_result(result);
    }

    print_section(&format!("Core {cpu} Checks"));
    for result in &report.core {
        print_result(result);
    }

    if let Some(nic) = nic {
        print_section(&format!("NIC {nic} Checks"));
        for result in &report.nic {
            print_result(result);
        }
    }

    println!();
}

const RESET: &str = "\x1b[0m";

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Pass => "\x1b[32m",
        Status::Fail => "\x1b[31m",
        Status::Unknown => "\x1b[33m",
    }
}

fn status_glyph(status: Status) -> &'static str {
    match status {
        Status::Pass => "\u{2714}\u{fe0f}",
        Status::Fail => "\u{274c}",
        Status::Unknown => "\u{2754}",
    }
}

fn print_section(title: &str) {
    println!("\n{title}");
    println!("{}", "\u{2501}".repeat(73));
}

fn print_result(result: &CheckResult) {
    const NAME_WIDTH: usize = 36;
    // The pass glyph renders one cell narrower than the others.
    let pad = if result.status == Status::Pass { "    " } else { "   " };
    println!(
        "{name:<width$}{color}{glyph}{RESET}{pad}{reason}",
        name = result.name,
        width = NAME_WIDTH,
        color = status_color(result.status),
        glyph = status_glyph(result.status),
        reason = result.reason,
    );
}

// Host summary

struct Uname {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
}

fn uname() -> Option<Uname> {
    // SAFETY: utsname is plain bytes; uname fills it or fails.
    let mut raw: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut raw) } != 0 {
        return None;
    }
    let field = |buf: &[libc::c_char]| {
        let bytes: Vec<u8> = buf
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Some(Uname {
        sysname: field(&raw.sysname),
        nodename: field(&raw.nodename),
        release: field(&raw.release),
        version: field(&raw.version),
        machine: field(&raw.machine),
    })
}

fn os_pretty_name(source: &dyn DataSource) -> String {
    let Some(content) = source.read("/etc/os-release") else {
        return "unknown".to_string();
    };

    let unquote = |v: &str| v.trim().trim_matches('"').to_string();
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("PRETTY_NAME=") {
            return unquote(value);
        }
    }

    let mut name = String::new();
    let mut version = String::new();
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("NAME=") {
            name = unquote(value);
        } else if let Some(value) = line.strip_prefix("VERSION=") {
            version = unquote(value);
        }
    }
    if name.is_empty() {
        return "unknown".to_string();
    }
    if version.is_empty() {
        name
    } else {
        format!("{name} {version}")
    }
}

fn lscpu_field(output: &str, key: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix(key) {
            let value = rest.trim_start_matches(':').trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn cpu_model(source: &dyn DataSource) -> String {
    if let Ok(out) = std::process::Command::new("lscpu")
        .env("LC_ALL", "C")
        .output()
    {
        if out.status.success() {
            let text = String::from_utf8_lossy(&out.stdout);
            for key in ["Model name", "Hardware", "Architecture"] {
                if let Some(value) = lscpu_field(&text, key) {
                    return value;
                }
            }
        }
    }

    if let Some(cpuinfo) = source.read("/proc/cpuinfo") {
        for key in ["model name", "Hardware", "Processor", "cpu model"] {
            for line in cpuinfo.lines() {
                if line.starts_with(key) {
                    if let Some((_, value)) = line.split_once(':') {
                        let value = value.trim();
                        if !value.is_empty() {
                            return value.to_string();
                        }
                    }
                }
            }
        }
    }

    uname()
        .map(|u| u.machine)
        .unwrap_or_else(|| "Unknown CPU".to_string())
}

fn cpu_topology_summary(source: &dyn DataSource) -> String {
    let logical = crate::rt::online_cpus();
    let mut summary = format!(" ({logical} logical");

    let cpu_dirs: Vec<String> = source
        .list_dir("/sys/devices/system/cpu")
        .unwrap_or_default()
        .into_iter()
        .filter(|name| {
            name.strip_prefix("cpu")
                .is_some_and(|id| id.chars().all(|c| c.is_ascii_digit()) && !id.is_empty())
        })
        .collect();

    let mut cores: BTreeSet<(u32, u32)> = BTreeSet::new();
    let mut performance = 0u32;
    let mut efficiency = 0u32;
    for dir in &cpu_dirs {
        let base = format!("/sys/devices/system/cpu/{dir}/topology");
        let package = source
            .read(&format!("{base}/physical_package_id"))
            .and_then(|v| v.trim().parse::<u32>().ok());
        let core = source
            .read(&format!("{base}/core_id"))
            .and_then(|v| v.trim().parse::<u32>().ok());
        if let (Some(package), Some(core)) = (package, core) {
            cores.insert((package, core));
        }

        if let Some(core_type) = source.read(&format!("{base}/core_type")) {
            let core_type = core_type.trim().to_lowercase();
            if core_type.contains("perf") || core_type == "core" {
                performance += 1;
            } else if core_type.contains("eff") || core_type == "atom" {
                efficiency += 1;
            }
        }
    }

    if !cores.is_empty() {
        summary.push_str(&format!(", {} physical", cores.len()));
    }
    if performance + efficiency > 0 {
        summary.push_str(&format!("; P={performance}, E={efficiency}"));
    }
    summary.push(')');
    summary
}

/// Hostname, OS, CPU, and kernel lines printed above the audit sections.
fn host_summary(source: &dyn DataSource) -> String {
    let uts = uname();
    let hostname = uts
        .as_ref()
        .map(|u| u.nodename.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let kernel = uts
        .as_ref()
        .map(|u| format!("{} {} {} {}", u.sysname, u.release, u.version, u.machine))
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Hostname: {hostname} | OS: {}\nCPU: {}{}\nKernel: {kernel}\n",
        os_pretty_name(source),
        cpu_model(source),
        cpu_topology_summary(source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_pretty_name_prefers_pretty() {
        let stub = StubDataSource::new().with_file(
            "/etc/os-release",
            "NAME=\"Debian GNU/Linux\"\nVERSION=\"12 (bookworm)\"\nPRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\n",
        );
        assert_eq!(os_pretty_name(&stub), "Debian GNU/Linux 12 (bookworm)");
    }

    #[test]
    fn test_os_pretty_name_falls_back_to_name_version() {
        let stub = StubDataSource::new()
            .with_file("/etc/os-release", "NAME=\"Alpine\"\nVERSION=\"3.19\"\n");
        assert_eq!(os_pretty_name(&stub), "Alpine 3.19");

        assert_eq!(os_pretty_name(&StubDataSource::new()), "unknown");
    }

    #[test]
    fn test_lscpu_field_extraction() {
        let output = "Architecture:        x86_64\nModel name:          AMD Ryzen 9\n";
        assert_eq!(lscpu_field(output, "Model name").as_deref(), Some("AMD Ryzen 9"));
        assert_eq!(lscpu_field(output, "Hardware"), None);
    }

    #[test]
    fn test_nic_section_gated_on_presence() {
        let ctx = CheckContext {
            cpu: Some(3),
            nic: Some("eth9".to_string()),
        };
        let report = evaluate_audit(&ctx, &StubDataSource::new());
        assert_eq!(report.nic.len(), 1);
        assert_eq!(report.nic[0].kind, CheckKind::NicPresent);
        assert_eq!(report.nic[0].status, Status::Unknown);
    }

    #[test]
    fn test_no_nic_no_section() {
        let ctx = CheckContext {
            cpu: Some(3),
            nic: None,
        };
        let report = evaluate_audit(&ctx, &StubDataSource::new());
        assert!(report.nic.is_empty());
        assert_eq!(report.system.len(), 5);
        assert_eq!(report.core.len(), 10);
    }
}
