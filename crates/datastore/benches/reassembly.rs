//! Join Reassembly Benchmarks
//!
//! Measures folding flat child rows into parents and compiling batched child
//! statements.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elif_datastore::join::{Cardinality, JoinInstructions};
use elif_datastore::{
    Criteria, OrderDirection, PostgresCompiler, QueryCache, Record, Statement, StatementCompiler,
    UnionBatch, WhereClause,
};
use serde_json::json;

fn row(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn pets_instructions() -> JoinInstructions {
    JoinInstructions {
        alias: "pets".to_string(),
        cardinality: Cardinality::Many,
        parent_key: "id".to_string(),
        child_key: "owner".to_string(),
        child_primary_key: "id".to_string(),
    }
}

fn owner_instructions() -> JoinInstructions {
    JoinInstructions {
        alias: "owner".to_string(),
        cardinality: Cardinality::One,
        parent_key: "owner".to_string(),
        child_key: "id".to_string(),
        child_primary_key: "id".to_string(),
    }
}

fn bench_to_many_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_many_reassembly");

    for parents in [10usize, 100, 1000] {
        let parent_rows: Vec<Record> = (0..parents)
            .map(|id| row(json!({ "id": id, "name": format!("user{}", id) })))
            .collect();
        let child_rows: Vec<Record> = (0..parents * 5)
            .map(|id| row(json!({ "id": id, "owner": id % parents, "name": format!("pet{}", id) })))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(parents), &parents, |b, _| {
            b.iter(|| {
                let instructions = pets_instructions();
                let mut cache = QueryCache::new("id", vec![instructions.clone()]);
                cache.set_parents(parent_rows.clone()).ok();
                cache.extend(child_rows.clone(), &instructions).ok();
                black_box(cache.combine_records())
            })
        });
    }

    group.finish();
}

fn bench_inline_dealiasing(c: &mut Criterion) {
    let mut group = c.benchmark_group("inline_dealiasing");

    for rows in [100usize, 1000] {
        let joined: Vec<Record> = (0..rows)
            .map(|id| {
                row(json!({
                    "id": id,
                    "name": format!("pet{}", id),
                    "owner": id % 10,
                    "owner___id": id % 10,
                    "owner___name": format!("user{}", id % 10),
                }))
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let mut cache = QueryCache::new("id", vec![owner_instructions()]);
                cache.set_parents(joined.clone()).ok();
                black_box(cache.combine_records())
            })
        });
    }

    group.finish();
}

fn bench_child_statement_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("child_statement_compilation");
    let compiler = PostgresCompiler::new();

    for keys in [10usize, 100] {
        let key_values: Vec<serde_json::Value> = (0..keys).map(|k| json!(k)).collect();

        group.bench_with_input(BenchmarkId::new("in", keys), &keys, |b, _| {
            b.iter(|| {
                let criteria =
                    Criteria::new().with_where(WhereClause::is_in("owner", key_values.clone()));
                black_box(compiler.compile(&Statement::find("pets", criteria)).ok())
            })
        });

        group.bench_with_input(BenchmarkId::new("union", keys), &keys, |b, _| {
            b.iter(|| {
                let mut statement = Statement::find(
                    "pets",
                    Criteria::new().with_sort("id", OrderDirection::Desc).with_limit(3),
                );
                statement.union = Some(UnionBatch {
                    column: "owner".to_string(),
                    keys: key_values.clone(),
                });
                black_box(compiler.compile(&statement).ok())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_to_many_reassembly,
    bench_inline_dealiasing,
    bench_child_statement_compilation
);
criterion_main!(benches);
