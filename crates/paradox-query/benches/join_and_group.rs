use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use paradox_query::{
    AggregateFunc, Catalog, ColumnMeta, EvalContext, Expr, JoinKind, MemoryTable, Predicate,
    QueryResult, QuerySpec, TableRef, Value, ValueKind,
};
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("PARADOX_QUERY_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (1_000..=1_000_000).contains(&v))
        .unwrap_or(50_000)
}

fn build_catalog(rows: usize) -> Catalog {
    // Small dimension so the nested-loop join stays linear in the fact rows.
    let dim_keys = 50i64;

    let dim = MemoryTable::new(
        "Dim",
        vec![
            ColumnMeta::new("Key", ValueKind::Integer),
            ColumnMeta::new("Bucket", ValueKind::Text),
        ],
        (0..dim_keys)
            .map(|key| vec![Value::Integer(key), Value::from(format!("bucket {}", key % 10))])
            .collect(),
    )
    .unwrap();

    let fact = MemoryTable::new(
        "Fact",
        vec![
            ColumnMeta::new("DimKey", ValueKind::Integer),
            ColumnMeta::new("Amount", ValueKind::Number),
        ],
        (0..rows)
            .map(|i| {
                vec![
                    Value::Integer(i as i64 % dim_keys),
                    Value::Number((i % 100) as f64 / 4.0),
                ]
            })
            .collect(),
    )
    .unwrap();

    Catalog::new().with_table(fact).with_table(dim)
}

fn bench_join_and_group(c: &mut Criterion) {
    let rows = bench_rows();
    let catalog = build_catalog(rows);

    let grouped = QuerySpec::from_table(TableRef::new("Fact"))
        .join(
            JoinKind::Inner,
            TableRef::new("Dim"),
            Some(Predicate::eq(Expr::column("DimKey"), Expr::column("Key"))),
        )
        .select(Expr::column("Bucket"))
        .select(Expr::aggregate(AggregateFunc::Sum, Expr::column("Amount")))
        .select(Expr::count_star())
        .group_by([0])
        .bind(&catalog)
        .unwrap();

    let distinct = QuerySpec::from_table(TableRef::new("Fact"))
        .select(Expr::column("DimKey"))
        .distinct()
        .bind(&catalog)
        .unwrap();

    let mut group = c.benchmark_group("join_and_group");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(rows as u64));

    for (name, query) in [("inner_join_group_by", &grouped), ("distinct", &distinct)] {
        group.bench_with_input(BenchmarkId::new(name, rows), &rows, |b, _| {
            b.iter(|| {
                let result = query
                    .execute(&EvalContext::default())
                    .unwrap()
                    .collect::<QueryResult<Vec<_>>>()
                    .unwrap();
                black_box(result);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_join_and_group);
criterion_main!(benches);
