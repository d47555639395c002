//! Field codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use omnidm_bench::profile_record;
use omnidm_codec::{DocumentCodec, FieldCodec, JsonCodec, LogicalType, RelationalCodec, Timestamp, Value};
use omnidm_core::describe;
use omnidm_testkit::Profile;

/// Benchmark encoding scalar values per backend.
fn bench_encode_scalar(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_scalar");
    let cases = [
        ("integer", LogicalType::Integer, Value::Integer(42)),
        ("text", LogicalType::Text, Value::Text("hello world".into())),
        (
            "timestamp",
            LogicalType::Timestamp,
            Value::Timestamp(Timestamp::from_millis(1_700_000_000_000)),
        ),
    ];

    for (name, ty, value) in &cases {
        group.bench_with_input(BenchmarkId::new("document", name), value, |b, value| {
            b.iter(|| black_box(DocumentCodec::encode(black_box(value), ty).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("relational", name), value, |b, value| {
            b.iter(|| black_box(RelationalCodec::encode(black_box(value), ty).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark nested sequences, which the relational codec embeds as JSON.
fn bench_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence");
    let ty = LogicalType::sequence(LogicalType::Text);

    for len in [10_usize, 100, 1_000] {
        let value = Value::sequence((0..len).map(|i| format!("item{i}")));
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("document", len), &value, |b, value| {
            b.iter(|| black_box(DocumentCodec::encode(value, &ty).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("json", len), &value, |b, value| {
            b.iter(|| black_box(JsonCodec::encode(value, &ty).unwrap()));
        });
        let native = RelationalCodec::encode(&value, &ty).unwrap();
        group.bench_with_input(BenchmarkId::new("relational_decode", len), &native, |b, native| {
            b.iter(|| black_box(RelationalCodec::decode(native, &ty).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark whole-entity conversion through the descriptor.
fn bench_native_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_record");
    let descriptor = describe::<Profile>().unwrap();

    for payload in [64_usize, 4_096] {
        let record = profile_record(8, payload);
        group.throughput(Throughput::Bytes(payload as u64));

        group.bench_with_input(BenchmarkId::new("document_encode", payload), &record, |b, record| {
            b.iter(|| black_box(descriptor.to_native_record::<DocumentCodec>(record).unwrap()));
        });
        let document = descriptor.to_native_record::<DocumentCodec>(&record).unwrap();
        group.bench_with_input(BenchmarkId::new("document_decode", payload), &document, |b, native| {
            b.iter(|| black_box(descriptor.from_native_record::<DocumentCodec, _>(native).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("relational_encode", payload), &record, |b, record| {
            b.iter(|| black_box(descriptor.to_native_record::<RelationalCodec>(record).unwrap()));
        });
        let row = descriptor.to_native_record::<RelationalCodec>(&record).unwrap();
        group.bench_with_input(BenchmarkId::new("relational_decode", payload), &row, |b, native| {
            b.iter(|| black_box(descriptor.from_native_record::<RelationalCodec, _>(native).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode_scalar, bench_sequence, bench_native_record);

criterion_main!(benches);
