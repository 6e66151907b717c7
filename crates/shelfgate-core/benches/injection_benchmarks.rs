//! Injection detector benchmarks using Criterion.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shelfgate_core::middleware::injection::{detect_in_str, detect_injection};
use std::hint::black_box;

/// Benchmark clean and hostile strings
fn bench_detect_in_str(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_in_str");

    let samples = [
        ("clean", "Searching for books by Ursula K. Le Guin published before 1975"),
        ("sql", "x' OR '1'='1"),
        ("xss", "<img src=x onerror=alert(1)>"),
        ("nosql", r#"{"$where": "sleep(100)"}"#),
    ];

    for (name, sample) in samples {
        group.throughput(Throughput::Bytes(sample.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), sample, |b, sample| {
            b.iter(|| detect_in_str(black_box(sample)));
        });
    }

    group.finish();
}

/// Benchmark a typical clean request, which has to be scanned in full
fn bench_detect_request(c: &mut Criterion) {
    let body = json!({
        "member": { "name": "Ada Lovelace", "email": "ada@example.org" },
        "books": (0..20).map(|i| json!({ "isbn": format!("978-0-{i:06}"), "copies": 1 }))
            .collect::<Vec<_>>(),
        "notes": "Collect after 5pm, thanks",
    });
    let query = vec![
        ("page".to_string(), "2".to_string()),
        ("sort".to_string(), "-created_at".to_string()),
        ("search".to_string(), "the dispossessed".to_string()),
    ];

    c.bench_function("detect_injection_clean_request", |b| {
        b.iter(|| detect_injection(black_box(Some(&body)), black_box(&query)));
    });
}

criterion_group!(benches, bench_detect_in_str, bench_detect_request);

criterion_main!(benches);
