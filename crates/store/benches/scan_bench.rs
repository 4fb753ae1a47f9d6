//! Benchmarks for scan/filter and upsert throughput.
//!
//! Run with: cargo bench -p sleuth-store

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sleuth_core::{CollectionKind, MetadataValue};
use sleuth_store::{QueryMode, Row, Store};
use std::collections::HashMap;
use tempfile::TempDir;

fn make_row(idx: usize, dim: usize) -> Row {
  let mut metadata = HashMap::new();
  metadata.insert("contact".to_string(), MetadataValue::Text(format!("contact-{}", idx % 10)));
  metadata.insert("direction".to_string(), MetadataValue::Text("incoming".to_string()));
  metadata.insert("is_noise".to_string(), MetadataValue::Bool(idx % 5 == 0));
  metadata.insert("source_tag".to_string(), MetadataValue::Text("bench".to_string()));
  Row {
    id: format!("m{idx}"),
    document: format!("message body #{idx}"),
    metadata,
    vector: (0..dim).map(|i| ((idx + i) as f32 * 0.001).sin()).collect(),
  }
}

fn bench_scan_with_predicate(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let dim = 64;

  let mut group = c.benchmark_group("scan_with_predicate");
  for size in [100usize, 1_000] {
    group.throughput(Throughput::Elements(size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter(|| {
        rt.block_on(async {
          let temp_dir = TempDir::new().unwrap();
          let store = Store::open(temp_dir.path()).await.unwrap();
          store.create_collection("messages_bench", CollectionKind::Messages, dim, "bench-model").await.unwrap();

          let rows: Vec<Row> = (0..size).map(|i| make_row(i, dim)).collect();
          store.upsert("messages_bench", rows).await.unwrap();

          let results = store
            .scan(black_box("messages_bench"), Some("contact = 'contact-3'"), None)
            .await
            .unwrap();
          black_box(results);
        });
      });
    });
  }
  group.finish();
}

fn bench_knn_query(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let dim = 64;

  let mut group = c.benchmark_group("knn_query");
  group.throughput(Throughput::Elements(1));

  group.bench_function("1000_rows", |b| {
    b.iter(|| {
      rt.block_on(async {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path()).await.unwrap();
        store.create_collection("messages_bench", CollectionKind::Messages, dim, "bench-model").await.unwrap();

        let rows: Vec<Row> = (0..1_000).map(|i| make_row(i, dim)).collect();
        store.upsert("messages_bench", rows).await.unwrap();

        let query: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.001).sin()).collect();
        let results = store.query("messages_bench", black_box(&query), 10, None, QueryMode::Knn).await.unwrap();
        black_box(results);
      });
    });
  });

  group.finish();
}

criterion_group!(benches, bench_scan_with_predicate, bench_knn_query);
criterion_main!(benches);
