use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rtprobe::audit::cpulist::parse_cpu_list;
use rtprobe::report::ReportData;

fn bench_record(c: &mut Criterion) {
    let data = ReportData::new(125_000);
    let mut tick: u64 = 0;

    // The sender records one observation per period; this is the only work
    // on the RT thread besides the send itself.
    c.bench_function("report_data_record", |b| {
        b.iter(|| {
            tick = tick.wrapping_add(977);
            data.record(black_box(1_000_000 + tick % 50_000));
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let data = ReportData::new(125_000);
    for i in 0..100_000u64 {
        data.record(1_000_000 + i % 50_000);
    }

    c.bench_function("report_data_snapshot", |b| {
        b.iter(|| black_box(data.snapshot()))
    });
}

fn bench_parse_cpu_list(c: &mut Criterion) {
    c.bench_function("parse_cpu_list", |b| {
        b.iter(|| parse_cpu_list(black_box("0-3,5,8-15,17,20-23")))
    });
}

criterion_group!(benches, bench_record, bench_snapshot, bench_parse_cpu_list);
criterion_main!(benches);
