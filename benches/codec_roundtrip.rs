//! Benchmarks for the binary wire codec: write and read, with and without
//! interning tables, at a few document sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use structural_delta::config::Options;
use structural_delta::document::Writer;
use structural_delta::value::{ScalarValue, Value};
use structural_delta::{read, write};

fn make_document(n: usize) -> structural_delta::Document {
    let mut w = Writer::new();
    for i in 0..n {
        w.dict_set(
            0,
            ScalarValue::String(format!("key-{i}")),
            Value::String("shared-value".to_string()),
        );
    }
    w.finish()
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_write");
    for &n in &[16usize, 256, 4096] {
        let doc = make_document(n);
        group.bench_with_input(BenchmarkId::new("interned", n), &n, |b, _| {
            b.iter(|| black_box(write(&doc, &[], &Options::default())));
        });
        group.bench_with_input(BenchmarkId::new("headerless", n), &n, |b, _| {
            b.iter(|| black_box(write(&doc, &[], &Options::headerless())));
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_read");
    for &n in &[16usize, 256, 4096] {
        let doc = make_document(n);
        let options = Options::default();
        let bytes = write(&doc, &[], &options);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(read(&bytes, &options).unwrap()));
        });
    }
    group.finish();
}

fn bench_interning_reduces_size(c: &mut Criterion) {
    // Not a timing benchmark - records the size delta as a side-effect so
    // `cargo bench` output documents the claim scenario 5 in the spec makes
    // (interned output is strictly smaller than uninterned for repeated
    // strings).
    let doc = make_document(64);
    let interned = write(&doc, &[], &Options::default());
    let uninterned = write(&doc, &[], &Options { string_table: false, ..Options::default() });
    assert!(interned.len() < uninterned.len());

    c.bench_function("codec_write/size_comparison_noop", |b| {
        b.iter(|| black_box((interned.len(), uninterned.len())))
    });
}

criterion_group!(benches, bench_write, bench_read, bench_interning_reduces_size);
criterion_main!(benches);
