use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use rtprobe::audit;
use rtprobe::config::{
    self, TestParameters, DEFAULT_RECEIVE_PRIORITY, DEFAULT_SEND_PRIORITY, DEFAULT_SEND_SLEEP_US,
    RUN_INDEFINITELY,
};
use rtprobe::measure;
use rtprobe::nic::{NicTester, RawSocketTester};
use rtprobe::report::live::{Reporter, Row};
use rtprobe::report::{table, ReportData};
use rtprobe::rt;

/// Audit a Linux host's real-time readiness and measure cyclic or NIC
/// round-trip jitter using raw sockets.
#[derive(Parser)]
#[command(name = "rtprobe", about, disable_version_flag = true)]
struct Cli {
    /// Network interface card name (omit for cyclic-only mode).
    #[arg(short = 'n', long)]
    nic: Option<String>,

    /// Number of iterations (default: run until interrupted).
    #[arg(short = 'i', long)]
    iterations: Option<u64>,

    /// Send sleep duration in microseconds.
    #[arg(short = 's', long, default_value_t = DEFAULT_SEND_SLEEP_US)]
    send_sleep: u64,

    /// Send thread RT priority.
    #[arg(long, visible_alias = "sp", default_value_t = DEFAULT_SEND_PRIORITY)]
    send_priority: i32,

    /// Receive thread RT priority.
    #[arg(long, visible_alias = "rp", default_value_t = DEFAULT_RECEIVE_PRIORITY)]
    receive_priority: i32,

    /// CPU core for the sender thread (default: last online core).
    #[arg(long, visible_alias = "sc")]
    send_cpu: Option<usize>,

    /// CPU core for the receiver thread (default: last online core).
    #[arg(long, visible_alias = "rc")]
    receive_cpu: Option<usize>,

    /// Add hardware/software timestamp delta columns.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Histogram bucket width in microseconds (0 = period / 8).
    #[arg(short = 'b', long, default_value_t = 0)]
    bucket_width: u64,

    /// Skip the system configuration audit.
    #[arg(long, visible_alias = "nc", conflicts_with = "only_config")]
    no_config: bool,

    /// Run the configuration audit only, then exit.
    #[arg(long, visible_alias = "oc")]
    only_config: bool,

    /// Logging verbosity (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print version information and exit.
    #[arg(long)]
    version: bool,
}

mod version {
    /// Release version string, MAJOR.MINOR.MICRO.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if err.kind() == ErrorKind::DisplayHelp
                || err.kind() == ErrorKind::DisplayVersion =>
        {
            print!("{err}");
            return Ok(());
        }
        Err(err) => {
            eprint!("{err}");
            std::process::exit(1);
        }
    };

    if cli.version {
        println!("{}", version::RELEASE);
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    // Logs go to stderr so the live table redraw owns stdout.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if !rt::is_root() {
        bail!("not running as root; raw sockets and system configuration reads need euid 0");
    }

    if cli.send_sleep == 0 {
        bail!("--send-sleep must be positive");
    }

    let online = rt::online_cpus();
    let last_core = online.saturating_sub(1);
    let send_cpu = cli.send_cpu.unwrap_or(last_core);
    let receive_cpu = cli.receive_cpu.unwrap_or(last_core);
    if send_cpu >= online || receive_cpu >= online {
        bail!("CPU pin out of range; online cores are 0..{online}");
    }

    if !cli.no_config {
        audit::run_audit(send_cpu as u32, cli.nic.as_deref());
    }
    if cli.only_config {
        return Ok(());
    }

    rt::lock_memory().context("locking memory (measurement must never page)")?;

    let send_sleep_ns = config::micros_to_ns(cli.send_sleep);
    let bucket_width_ns = if cli.bucket_width == 0 {
        config::auto_bucket_width_ns(send_sleep_ns).max(1)
    } else {
        config::micros_to_ns(cli.bucket_width)
    };

    let params = TestParameters {
        nic_name: cli.nic.clone(),
        iterations: cli.iterations.unwrap_or(RUN_INDEFINITELY),
        send_sleep_ns,
        bucket_width_ns,
        send_priority: cli.send_priority,
        receive_priority: cli.receive_priority,
        send_cpu,
        receive_cpu,
        verbose: cli.verbose,
    };

    // Held for the whole run; dropping it re-enables deep C-states.
    let _latency_target = rt::LatencyTarget::acquire();

    if let Some(estimate) = params.estimated_run_time() {
        println!("Estimated run time: {estimate}");
    }
    println!("Target period: {} us\n", cli.send_sleep);

    let send_data = Arc::new(ReportData::new(bucket_width_ns));
    let receive_data = Arc::new(ReportData::new(bucket_width_ns));
    let hardware_data = Arc::new(ReportData::new(bucket_width_ns));
    let software_data = Arc::new(ReportData::new(bucket_width_ns));

    let test_running = Arc::new(AtomicBool::new(true));
    let live_report = Arc::new(AtomicBool::new(true));

    rt::write_trace_marker("rtprobe measurement start\n");

    let mut streams: Vec<(&'static str, Arc<ReportData>)> = Vec::new();
    match params.nic_name.clone() {
        None => {
            streams.push(("Cyclic", Arc::clone(&send_data)));
            let reporter = new_reporter(&streams);

            let sender = spawn_thread("sender", {
                let params = params.clone();
                let running = Arc::clone(&test_running);
                let data = Arc::clone(&send_data);
                move || measure::run_sender(params, None, running, data)
            })?;
            let report_thread = spawn_thread("reporter", {
                let reporter = Arc::clone(&reporter);
                let live = Arc::clone(&live_report);
                move || reporter.run(&live)
            })?;

            join_thread(sender, "sender")?;
            test_running.store(false, Ordering::Release);
            live_report.store(false, Ordering::Release);
            join_thread(report_thread, "reporter")?;
            reporter.render();
        }
        Some(nic) => {
            streams.push(("Sender", Arc::clone(&send_data)));
            streams.push(("Receiver", Arc::clone(&receive_data)));
            if params.verbose {
                streams.push(("HW delta", Arc::clone(&hardware_data)));
                streams.push(("SW delta", Arc::clone(&software_data)));
            }
            let reporter = new_reporter(&streams);

            let tester: Arc<dyn NicTester> = Arc::new(
                RawSocketTester::new(
                    &nic,
                    Arc::clone(&software_data),
                    Arc::clone(&hardware_data),
                )
                .with_context(|| format!("opening raw-socket tester on {nic}"))?,
            );

            let receiver = spawn_thread("receiver", {
                let params = params.clone();
                let tester = Arc::clone(&tester);
                let running = Arc::clone(&test_running);
                let data = Arc::clone(&receive_data);
                move || measure::run_receiver(params, tester, running, data)
            })?;
            let sender = spawn_thread("sender", {
                let params = params.clone();
                let tester = Arc::clone(&tester);
                let running = Arc::clone(&test_running);
                let data = Arc::clone(&send_data);
                move || measure::run_sender(params, Some(tester), running, data)
            })?;
            let report_thread = spawn_thread("reporter", {
                let reporter = Arc::clone(&reporter);
                let live = Arc::clone(&live_report);
                move || reporter.run(&live)
            })?;

            join_thread(receiver, "receiver")?;
            test_running.store(false, Ordering::Release);
            join_thread(sender, "sender")?;
            live_report.store(false, Ordering::Release);
            join_thread(report_thread, "reporter")?;
            reporter.render();
        }
    }

    rt::write_trace_marker("rtprobe measurement stop\n");

    if params.verbose {
        println!();
        for (label, data) in &streams {
            print!("{}", table::render_histogram(label, &data.snapshot(), bucket_width_ns));
        }
    }

    Ok(())
}

fn new_reporter(streams: &[(&'static str, Arc<ReportData>)]) -> Arc<Reporter> {
    let rows = streams
        .iter()
        .map(|&(label, ref data)| Row {
            label,
            data: Arc::clone(data),
        })
        .collect();
    Arc::new(Reporter::new(rows))
}

fn spawn_thread<F>(name: &str, body: F) -> Result<std::thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("spawning {name} thread"))
}

fn join_thread(handle: std::thread::JoinHandle<()>, name: &str) -> Result<()> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} thread panicked"))
}
