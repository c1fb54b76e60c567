// ========================================================================================
//
//                 Per-tree association benchmark
//
// ========================================================================================
//
// Measures TMRCA matrix construction and a full Mantel evaluation for random
// coalescent trees of growing sample size.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tgwas::genealogy::{GenealogyMatrix, Interval, NodeRecord, Tree};
use tgwas::mantel::phenotype_distances;
use tgwas::{MantelOptions, mantel_test};

const SAMPLE_SIZES: [usize; 4] = [16, 64, 256, 512];

fn random_tree(n: usize, rng: &mut StdRng) -> Tree {
    let mut nodes: Vec<NodeRecord> = (0..n).map(|sample| NodeRecord::sample(sample, None)).collect();
    let mut active: Vec<usize> = (0..n).collect();
    let mut time = 0.0;
    while active.len() > 1 {
        time += rng.gen_range(0.01..1.0);
        let first = active.swap_remove(rng.gen_range(0..active.len()));
        let second = active.swap_remove(rng.gen_range(0..active.len()));
        let parent = nodes.len();
        nodes.push(NodeRecord::internal(time, None));
        nodes[first].parent = Some(parent);
        nodes[second].parent = Some(parent);
        active.push(parent);
    }
    match Tree::new(Interval::new(0.0, 1.0).unwrap(), nodes, n) {
        Ok(tree) => tree,
        Err(err) => panic!("random tree is invalid: {err}"),
    }
}

fn bench_tmrca(c: &mut Criterion) {
    let mut group = c.benchmark_group("tmrca_matrix");
    let mut rng = StdRng::seed_from_u64(42);
    for &n in &SAMPLE_SIZES {
        let tree = random_tree(n, &mut rng);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &tree, |b, tree| {
            b.iter(|| GenealogyMatrix::from_tree(black_box(tree)).unwrap())
        });
    }
    group.finish();
}

fn bench_mantel(c: &mut Criterion) {
    let mut group = c.benchmark_group("mantel_per_tree");
    group.sample_size(10);
    let mut rng = StdRng::seed_from_u64(7);
    let options = MantelOptions {
        permutations: 99,
        ..MantelOptions::default()
    };
    for &n in &SAMPLE_SIZES[..3] {
        let tree = random_tree(n, &mut rng);
        let phenotype = Array1::from_iter((0..n).map(|_| rng.gen_range(0.0..1.0)));
        let distances = phenotype_distances(phenotype.view());
        group.bench_with_input(BenchmarkId::from_parameter(n), &tree, |b, tree| {
            b.iter(|| {
                let genealogy = GenealogyMatrix::from_tree(tree).unwrap();
                mantel_test(genealogy.tmrca(), distances.view(), &options).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tmrca, bench_mantel);
criterion_main!(benches);
