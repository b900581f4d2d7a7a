//! Fixed-column stat table for the live report.
//!
//! Columns hold microsecond values with three decimals; widths are refit
//! from the data each tick so growing values never shear the layout.

use super::Snapshot;

const STAT_COLUMNS: [&str; 6] = ["Samples", "Min", "p50", "p90", "p99", "Max"];
const MIN_VALUE_WIDTH: usize = 9;

/// Formats stream snapshots into aligned rows.
pub struct Table {
    label_width: usize,
    value_width: usize,
}

fn us(ns: u64) -> String {
    format!("{:.3}", ns as f64 / 1_000.0)
}

impl Table {
    pub fn new() -> Self {
        Self {
            label_width: 8,
            value_width: MIN_VALUE_WIDTH,
        }
    }

    /// Widen the label column to the longest stream label.
    pub fn fit_labels<'a>(&mut self, labels: impl IntoIterator<Item = &'a str>) {
        for label in labels {
            self.label_width = self.label_width.max(label.len() + 2);
        }
    }

    /// Refit value columns to the widest rendered cell in current data.
    pub fn fit_values<'a>(&mut self, snapshots: impl IntoIterator<Item = &'a Snapshot>) {
        let mut width = MIN_VALUE_WIDTH;
        for snap in snapshots {
            width = width.max(snap.count.to_string().len() + 2);
            for value in [snap.min_ns, snap.p50_ns, snap.p90_ns, snap.p99_ns, snap.max_ns] {
                width = width.max(us(value).len() + 2);
            }
        }
        self.value_width = width;
    }

    /// Header line. Stat values are reported in microseconds.
    pub fn header(&self) -> String {
        let mut line = format!("{:<width$}", "Stream", width = self.label_width);
        for column in STAT_COLUMNS {
            line.push_str(&format!("{column:>width$}", width = self.value_width));
        }
        line.push_str("  (us)");
        line
    }

    /// One data row.
    pub fn row(&self, label: &str, snap: &Snapshot) -> String {
        let mut line = format!("{label:<width$}", width = self.label_width);
        line.push_str(&format!(
            "{count:>width$}",
            count = snap.count,
            width = self.value_width
        ));
        for value in [snap.min_ns, snap.p50_ns, snap.p90_ns, snap.p99_ns, snap.max_ns] {
            line.push_str(&format!(
                "{cell:>width$}",
                cell = us(value),
                width = self.value_width
            ));
        }
        line
    }

    /// One-line worst-case summary used below the table.
    pub fn max_summary(&self, label: &str, snap: &Snapshot) -> String {
        format!("{label} max latency: {} us", us(snap.max_ns))
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the sparse bucket histogram of one stream, one bucket per line.
pub fn render_histogram(label: &str, snap: &Snapshot, bucket_width_ns: u64) -> String {
    let mut out = format!("{label} distribution (bucket {} us):\n", us(bucket_width_ns));
    for (index, count) in &snap.buckets {
        let lo = index * bucket_width_ns;
        let hi = lo + bucket_width_ns;
        out.push_str(&format!("  [{:>10} - {:>10}) {count}\n", us(lo), us(hi)));
    }
    out
}
