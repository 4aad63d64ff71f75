use std::rc::Rc;

use cartograph_core::graph::Graph;
use cartograph_core::model::{Entity, EntityId, EntityKind, Extent};
use cartograph_core::tree::Tree;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const SIZES: [i64; 2] = [1_000, 10_000];

/// A grid of `count` nodes joined into ten-node ways.
fn grid(count: i64) -> Graph {
    let side = (count as f64).sqrt().ceil() as i64;
    let mut entities = Vec::with_capacity(usize::try_from(count + count / 10).unwrap_or_default());
    let node = |i: i64| EntityId::from_parts(EntityKind::Node, i + 1);
    for i in 0..count {
        entities.push(Entity::node(node(i), [(i % side) as f64, (i / side) as f64]));
    }
    for w in 0..count / 10 {
        let nodes = (w * 10..w * 10 + 10).map(node).collect();
        entities.push(Entity::way(EntityId::from_parts(EntityKind::Way, w + 1), nodes));
    }
    Graph::from_entities(entities)
}

fn bench_intersects(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree.intersects");
    let query = Extent::new([10.0, 10.0], [20.0, 20.0]);

    for size in SIZES {
        let graph = grid(size);
        group.throughput(Throughput::Elements(size as u64));

        let mut tree = Tree::new(&graph);
        tree.rebase(&graph.base_entities(), false);
        group.bench_with_input(BenchmarkId::new("unchanged", size), &graph, |b, graph| {
            b.iter(|| black_box(tree.intersects(&query, graph)));
        });

        // Alternate between two graphs so every query patches the index.
        let moved_node = graph
            .entity(&EntityId::from_parts(EntityKind::Node, 1))
            .map(|n| Rc::new(n.move_to([15.0, 15.0])));
        if let Ok(moved_node) = moved_node {
            let moved = graph.replace(moved_node);
            let mut tree = Tree::new(&graph);
            tree.rebase(&graph.base_entities(), false);
            let mut flip = false;
            group.bench_function(BenchmarkId::new("after_move", size), |b| {
                b.iter(|| {
                    flip = !flip;
                    let target = if flip { &moved } else { &graph };
                    black_box(tree.intersects(&query, target))
                });
            });
        }
    }

    group.finish();
}

fn bench_rebase(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree.rebase");
    for size in SIZES {
        let graph = grid(size);
        let entities = graph.base_entities();
        group.throughput(Throughput::Elements(entities.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entities, |b, entities| {
            b.iter(|| {
                let mut tree = Tree::new(&graph);
                tree.rebase(entities, false);
                black_box(tree.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_intersects, bench_rebase);
criterion_main!(benches);
