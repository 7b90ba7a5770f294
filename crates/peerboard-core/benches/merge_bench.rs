//! Benchmarks for merge engine operations
//!
//! Run with: cargo bench -p peerboard-core
//!
//! Establishes baselines for the operations the sync loops run on every
//! tick: single-comment merges, full-document merges, and the re-merge of
//! an already-known document (the common idle case for the pull timer).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use peerboard_core::{Comment, CommentMap, UserInfo};

fn author() -> UserInfo {
    UserInfo::new("u1", "booms", "a.png")
}

fn populated_map(comments: usize) -> CommentMap {
    let user = author();
    let mut map = CommentMap::new();
    for i in 0..comments {
        let mut comment = Comment::new(&user, format!("comment number {}", i));
        comment.id = format!("comment_{}", i);
        map.merge_comment("songs", "42", comment);
    }
    map
}

fn bench_merge_single_comment(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_single_comment");

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("into_bucket_of", size), &size, |b, &size| {
            let base = populated_map(size);
            let user = author();
            b.iter_batched(
                || {
                    let mut fresh = Comment::new(&user, "fresh");
                    fresh.id = "comment_fresh".to_string();
                    (base.clone(), fresh)
                },
                |(mut map, comment)| black_box(map.merge_comment("songs", "42", comment)),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_merge_full_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_full_document");

    for size in [10usize, 100, 1000] {
        let document = populated_map(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("into_empty", size), &document, |b, document| {
            b.iter_batched(
                CommentMap::new,
                |mut map| {
                    let changed = map.merge_map(black_box(document));
                    black_box(changed)
                },
                criterion::BatchSize::SmallInput,
            )
        });

        // The idle pull tick: everything is already known
        group.bench_with_input(BenchmarkId::new("re_merge_known", size), &document, |b, document| {
            b.iter_batched(
                || document.clone(),
                |mut map| {
                    let changed = map.merge_map(black_box(document));
                    black_box(changed)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_sorted_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_read");

    for size in [100usize, 1000] {
        let map = populated_map(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &map, |b, map| {
            b.iter(|| black_box(map.sorted("songs", "42")))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_merge_single_comment,
    bench_merge_full_document,
    bench_sorted_read
);
criterion_main!(benches);
