//! Benchmarks for request key derivation and fingerprinting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use live_records::{
    derive_key, Filter, KeyTag, RequestDescriptor, RequestParams, Sort, SortDirection,
    WhereOperator,
};

fn params_with_filters(n: usize) -> RequestParams {
    let mut params = RequestParams::default();
    for i in 0..n {
        params.push_filter(Filter {
            field: format!("field_{}", i),
            op: if i % 2 == 0 { WhereOperator::Eq } else { WhereOperator::Gte },
            value: (i as i64).into(),
        });
    }
    params.push_sort(Sort {
        field: "created_at".into(),
        direction: SortDirection::Desc,
    });
    params.limit = Some(50);
    params
}

/// Query keys with growing filter lists
fn bench_query_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_key");

    for filters in [0, 1, 8, 32] {
        let descriptor =
            RequestDescriptor::list_records("app/users").with_params(params_with_filters(filters));
        group.bench_with_input(BenchmarkId::new("filters", filters), &descriptor, |b, d| {
            b.iter(|| derive_key(KeyTag::Query, black_box("app/users"), black_box(d)).unwrap());
        });
    }

    group.finish();
}

fn bench_record_keys(c: &mut Criterion) {
    let descriptor = RequestDescriptor::get_record("app/users", "alice");
    c.bench_function("record_key", |b| {
        b.iter(|| derive_key(KeyTag::Record, black_box("app/users"), black_box(&descriptor)).unwrap());
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let descriptor =
        RequestDescriptor::list_records("app/users").with_params(params_with_filters(8));
    c.bench_function("descriptor_fingerprint", |b| {
        b.iter(|| black_box(&descriptor).fingerprint());
    });
}

criterion_group!(benches, bench_query_keys, bench_record_keys, bench_fingerprint);
criterion_main!(benches);
