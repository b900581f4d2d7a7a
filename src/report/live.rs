//! Live 20 Hz table renderer.
//!
//! The reporter redraws in place using cursor-up / clear-to-end control
//! sequences, tracking how many lines the previous tick emitted. A single
//! mutex is held across each full redraw so every tick shows one consistent
//! snapshot of all streams.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::table::Table;
use super::{ReportData, Snapshot};

/// Redraw period: 20 Hz.
const REPORT_INTERVAL: Duration = Duration::from_millis(50);

/// One rendered stream: a fixed label and its data.
pub struct Row {
    pub label: &'static str,
    pub data: Arc<ReportData>,
}

struct RenderState {
    table: Table,
    lines_printed: usize,
}

/// Owns the table layout and redraw state for the whole run.
pub struct Reporter {
    rows: Vec<Row>,
    state: Mutex<RenderState>,
    started: Instant,
}

impl Reporter {
    pub fn new(rows: Vec<Row>) -> Self {
        let mut table = Table::new();
        table.fit_labels(rows.iter().map(|r| r.label));
        Self {
            rows,
            state: Mutex::new(RenderState {
                table,
                lines_printed: 0,
            }),
            started: Instant::now(),
        }
    }

    /// Redraw the report in place. Also used for the final render after the
    /// workers have joined.
    pub fn render(&self) {
        let mut state = self.state.lock();

        let snapshots: Vec<Snapshot> = self.rows.iter().map(|r| r.data.snapshot()).collect();
        state.table.fit_values(snapshots.iter());

        let mut frame = String::with_capacity(512);
        if state.lines_printed > 0 {
            // Cursor up over the previous frame, then clear to end of screen.
            frame.push_str(&format!("\x1b[{}A\x1b[J", state.lines_printed));
        }

        let mut body = String::with_capacity(512);
        body.push_str(&state.table.header());
        body.push('\n');
        let mut summary = String::new();
        for (row, snap) in self.rows.iter().zip(&snapshots) {
            body.push_str(&state.table.row(row.label, snap));
            body.push('\n');
            summary.push_str(&state.table.max_summary(row.label, snap));
            summary.push('\n');
        }
        body.push_str(&format!(
            "Duration: {}\n{summary}\n",
            format_duration(self.started.elapsed()),
        ));

        state.lines_printed = body.matches('\n').count();
        frame.push_str(&body);

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = out.write_all(frame.as_bytes());
        let _ = out.flush();
    }

    /// Run the redraw loop until `live` is cleared.
    pub fn run(&self, live: &AtomicBool) {
        while live.load(Ordering::Acquire) {
            self.render();
            std::thread::sleep(REPORT_INTERVAL);
        }
    }
}

/// `HH:MM:SS.mmm` wall-format for the footer.
pub fn format_duration(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}
