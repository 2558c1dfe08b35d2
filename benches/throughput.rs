//! Throughput Benchmark for Argopost
//!
//! This benchmark measures the per-line costs on the hot path:
//! command parsing, reply formatting and session identity hashing.

use argopost::connection::SessionManager;
use argopost::delivery::DeliveryQueue;
use argopost::protocol::{format_reply, CommandParser};
use argopost::session::SessionConfig;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Benchmark command parsing
fn bench_parse(c: &mut Criterion) {
    let parser = CommandParser::new();

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("helo", |b| {
        b.iter(|| black_box(parser.parse(black_box("HELO client.example.com\r\n"))));
    });

    group.bench_function("mail_from", |b| {
        b.iter(|| black_box(parser.parse(black_box("MAIL FROM:<sender@example.com>\r\n"))));
    });

    group.bench_function("unrecognized", |b| {
        b.iter(|| black_box(parser.parse(black_box("NOOP   with   extra   spacing\r\n"))));
    });

    group.bench_function("blank", |b| {
        b.iter(|| black_box(parser.parse(black_box("   \r\n"))));
    });

    group.finish();
}

/// Benchmark reply formatting
fn bench_reply(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply");
    group.throughput(Throughput::Elements(1));

    let single: &[&str] = &["Ok: queued"];
    group.bench_function("single_line", |b| {
        b.iter(|| black_box(format_reply(250, black_box(single))));
    });

    let lines: Vec<String> = (0..10).map(|i| format!("extension line {}", i)).collect();
    group.bench_function("ten_lines", |b| {
        b.iter(|| black_box(format_reply(250, black_box(lines.as_slice()))));
    });

    group.finish();
}

/// Benchmark session identity hashing
fn bench_session_id(c: &mut Criterion) {
    let (queue, _rx) = DeliveryQueue::channel();
    let manager = SessionManager::new(SessionConfig::default(), queue);

    let mut group = c.benchmark_group("registry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("session_id", |b| {
        let mut port = 0u16;
        b.iter(|| {
            let peer = format!("192.0.2.1:{}", port);
            black_box(manager.session_id("127.0.0.1:2525", &peer));
            port = port.wrapping_add(1);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_reply, bench_session_id);
criterion_main!(benches);
