//! Search benchmarks.
//!
//! Run with: `cargo bench -p mcts`
//!
//! Measures full searches at several playout counts and board sizes, plus
//! the evaluation cache in isolation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use games_go::GoState;
use mcts::{CachedEvaluator, ComputationTag, EvalCache, Search, SearchParams, UniformEvaluator};

fn bench_search_playouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_playouts");
    for playouts in [50u32, 200, 800] {
        group.throughput(Throughput::Elements(u64::from(playouts)));
        group.bench_with_input(
            BenchmarkId::new("uniform_9x9", playouts),
            &playouts,
            |b, &playouts| {
                b.iter(|| {
                    let state = GoState::new(9, 7.0);
                    let params = SearchParams::for_testing().with_playouts(playouts);
                    let mut search =
                        Search::new(state, UniformEvaluator::new(), params).unwrap();
                    black_box(search.computation(playouts, ComputationTag::Forced).unwrap())
                });
            },
        );
    }
    group.finish();
}

fn bench_board_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_board_sizes");
    for size in [9usize, 13, 19] {
        group.bench_with_input(BenchmarkId::new("playouts_100", size), &size, |b, &size| {
            b.iter(|| {
                let state = GoState::new(size, 7.0);
                let params = SearchParams::for_testing().with_playouts(100);
                let mut search = Search::new(state, UniformEvaluator::new(), params).unwrap();
                black_box(search.computation(100, ComputationTag::Forced).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_cached_evaluator(c: &mut Criterion) {
    use mcts::{Ensemble, Evaluator};
    c.bench_function("cached_eval_hit", |b| {
        let state = GoState::new(19, 7.5);
        let eval = CachedEvaluator::new(UniformEvaluator::new(), 64 << 20, 361);
        // Warm the entry once.
        eval.evaluate(&state, Ensemble::None, 1.0).unwrap();
        b.iter(|| black_box(eval.evaluate(&state, Ensemble::None, 1.0).unwrap()));
    });

    c.bench_function("cache_probe_miss", |b| {
        let cache = EvalCache::new(64 << 20, 361);
        let mut key = 0u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            black_box(cache.probe(key))
        });
    });
}

criterion_group!(
    benches,
    bench_search_playouts,
    bench_board_sizes,
    bench_cached_evaluator
);
criterion_main!(benches);
