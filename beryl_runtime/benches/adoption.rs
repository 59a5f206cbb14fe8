//! Adoption Protocol Performance Benchmarks
//!
//! Measures the cost of moving compiled programs across the ownership
//! boundary and of searching through adopted headers.
//!
//! # Benchmark Categories
//!
//! 1. **Compile + Adopt**: full pipeline cost by pattern complexity
//! 2. **Search**: forward, backward and anchored throughput over an
//!    adopted graph, absorb postlude included
//! 3. **Collection**: relocating pass cost by live-pattern count

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use beryl_runtime::{
    BufHeap, Pattern, PatternEncoding, PatternOptions, Relocate, RelocationPass, SearchDirection,
};

// =============================================================================
// Benchmark Helpers
// =============================================================================

fn compile(heap: &BufHeap, source: &str) -> Pattern {
    Pattern::compile(heap, source, PatternOptions::default(), PatternEncoding::Ascii).unwrap()
}

/// Retire everything previous iterations left behind once the space
/// runs low. Nothing is live between iterations, so no pass is needed.
fn recycle(heap: &mut BufHeap) {
    if heap.free() < 64 * 1024 {
        heap.swap_spaces();
    }
}

// =============================================================================
// Compile + Adopt Benchmarks
// =============================================================================

fn bench_compile_adopt(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_adopt");

    // Three-buffer graph: header, program, forward map.
    group.bench_function("bare_pattern", |b| {
        let mut heap = BufHeap::with_defaults();
        b.iter(|| {
            recycle(&mut heap);
            black_box(compile(&heap, r"(\d+)-(\d+)"))
        })
    });

    // Five-buffer graph: literal prefix and repeat table included.
    group.bench_function("full_graph_pattern", |b| {
        let mut heap = BufHeap::with_defaults();
        b.iter(|| {
            recycle(&mut heap);
            black_box(compile(&heap, r"order x{2,8}(\d+)"))
        })
    });

    // Adoption cost tracks the program block, which tracks the source.
    for len in [16, 256, 2048].iter() {
        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::new("source_length", len), len, |b, &len| {
            let mut heap = BufHeap::with_defaults();
            let source = "a".repeat(len);
            b.iter(|| {
                recycle(&mut heap);
                black_box(compile(&heap, &source))
            })
        });
    }

    group.finish();
}

// =============================================================================
// Search Benchmarks
// =============================================================================

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let hay = b"the 1st order shipped, the 42-7 span held, 999 left";
    group.throughput(Throughput::Bytes(hay.len() as u64));

    group.bench_function("forward", |b| {
        let heap = BufHeap::with_defaults();
        let p = compile(&heap, r"(\d+)-(\d+)");
        b.iter(|| {
            black_box(
                p.search(&heap, hay, 0, hay.len(), SearchDirection::Forward)
                    .unwrap(),
            )
        })
    });

    group.bench_function("backward_settled", |b| {
        let heap = BufHeap::with_defaults();
        let p = compile(&heap, r"\d+");
        // First backward search absorbs the map; the loop then measures
        // the steady state every later search sees.
        p.search(&heap, hay, 0, hay.len(), SearchDirection::Backward)
            .unwrap();
        b.iter(|| {
            black_box(
                p.search(&heap, hay, 0, hay.len(), SearchDirection::Backward)
                    .unwrap(),
            )
        })
    });

    group.bench_function("match_at", |b| {
        let heap = BufHeap::with_defaults();
        let p = compile(&heap, r"the \w+");
        b.iter(|| black_box(p.match_at(&heap, hay, 0).unwrap()))
    });

    group.finish();
}

// =============================================================================
// Collection Benchmarks
// =============================================================================

fn bench_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection");

    for count in [1usize, 8, 32].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("relocate_live_patterns", count),
            count,
            |b, &count| {
                let mut heap = BufHeap::with_defaults();
                let patterns: Vec<Pattern> = (0..count)
                    .map(|i| compile(&heap, &format!(r"v{}_(\d+)", i)))
                    .collect();

                // Each iteration carries the live graphs to the other
                // space and swaps, so the footprint stays constant.
                b.iter(|| {
                    {
                        let mut pass = RelocationPass::new(&heap);
                        patterns.relocate_refs(&mut pass);
                        black_box(pass.relocated_count());
                    }
                    heap.swap_spaces();
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    adoption_benches,
    bench_compile_adopt,
    bench_search,
    bench_collection,
);

criterion_main!(adoption_benches);
