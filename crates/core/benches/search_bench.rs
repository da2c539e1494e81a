//! Benchmarks for core search operations using Criterion.
//! Run with: cargo bench -p memengine-core

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use memengine_core::model::{Memory, SyncMeta};
use memengine_core::search::{cosine_similarity, fuse_and_rank, tokenize, HybridSearchConfig, SearchFilters, TfIdfIndex};

fn sample_memory(id: i64) -> Memory {
    Memory {
        id,
        category: "pattern".to_string(),
        content: format!("memory number {id} about caching and database retries"),
        rationale: None,
        context: None,
        tags: vec!["database".to_string()],
        keywords: vec!["cache".to_string(), "database".to_string()],
        file_path_absolute: None,
        file_path_relative: Some("src/db.rs".to_string()),
        is_permanent: false,
        pinned: false,
        archived: false,
        outcome: None,
        worked: None,
        vector_embedding_ref: None,
        sync: SyncMeta::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "The QuickCache::invalidate_on_write method avoids stale reads by hooking db.commit()";
    c.bench_function("tokenize", |b| {
        b.iter(|| {
            black_box(tokenize(text));
        })
    });
}

fn bench_tfidf_query(c: &mut Criterion) {
    let mut index = TfIdfIndex::new();
    for i in 0..500 {
        index.add_document(i, &format!("memory {i} about caching and database retries and connection pools"), &[]);
    }

    c.bench_function("tfidf_query_500_docs", |b| {
        b.iter(|| {
            black_box(index.query("database connection pool retries", 20, 0.05));
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..384).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..384).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_384d", |bench| {
        bench.iter(|| {
            black_box(cosine_similarity(&a, &b));
        })
    });
}

fn bench_fuse_and_rank(c: &mut Criterion) {
    let rows: Vec<Memory> = (0..200).map(sample_memory).collect();
    let lexical: Vec<(i64, f32)> = (0..100).map(|i| (i, 1.0 - i as f32 / 100.0)).collect();
    let vector: Vec<(i64, f32)> = (50..150).map(|i| (i, 1.0 - (i - 50) as f32 / 100.0)).collect();
    let config = HybridSearchConfig::default();
    let filters = SearchFilters { limit: 20, ..Default::default() };

    c.bench_function("fuse_and_rank_200_docs", |b| {
        b.iter(|| {
            black_box(fuse_and_rank(&lexical, &vector, &[], rows.clone(), &config, &filters));
        })
    });
}

criterion_group!(benches, bench_tokenize, bench_tfidf_query, bench_cosine_similarity, bench_fuse_and_rank);
criterion_main!(benches);
