use ndarray::{Array1, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicUsize, Ordering};
use tgwas::genealogy::{
    Interval, LocalTree, NodeId, NodeRecord, Site, StabilityError, Tree, TreeSequence,
    TreeSequenceData,
};
use tgwas::variants::{TypingFilter, VariantQuery, VariantTable};
use tgwas::{
    AnalysisUnit, AssociationConfig, AssociationEngine, AssociationError, FailurePolicy,
    Phenotype, ProgressObserver, UnitError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn star(interval: Interval, time: f64, n: usize) -> Tree {
    let mut nodes = vec![NodeRecord::internal(time, None)];
    nodes.extend((0..n).map(|sample| NodeRecord::sample(sample, Some(0))));
    Tree::new(interval, nodes, n).unwrap()
}

// ((0,1)@2,(2,3)@2)@5
fn paired_tree(interval: Interval) -> Tree {
    let nodes = vec![
        NodeRecord::internal(5.0, None),
        NodeRecord::internal(2.0, Some(0)),
        NodeRecord::internal(2.0, Some(0)),
        NodeRecord::sample(0, Some(1)),
        NodeRecord::sample(1, Some(1)),
        NodeRecord::sample(2, Some(2)),
        NodeRecord::sample(3, Some(2)),
    ];
    Tree::new(interval, nodes, 4).unwrap()
}

fn interval(left: f64, right: f64) -> Interval {
    Interval::new(left, right).unwrap()
}

#[test]
fn zero_length_tree_stays_unset_next_to_a_tested_tree() {
    init_logging();
    let ts = TreeSequenceData::new(
        vec![star(interval(0.0, 10.0), 0.0, 4), paired_tree(interval(10.0, 20.0))],
        Vec::new(),
    )
    .unwrap();
    let phenotype = Phenotype::new("disease", array![0.0, 0.0, 1.0, 1.0], 2, 0);
    let mut engine =
        AssociationEngine::per_tree(&ts, &phenotype, AssociationConfig::default()).unwrap();
    let summary = engine.run().unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.tested, 1);
    let p = engine.p_values();
    assert!(p[0].is_nan());
    assert!(p[1] > 0.0 && p[1] <= 1.0);

    let report = engine.report();
    assert_eq!(report.summary().unset, 1);
    assert_eq!(report.histogram().total(), 1);
    let points = report.manhattan(&engine.unit_positions()).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].position, 15.0);
}

#[test]
fn identical_trees_get_identical_p_values_in_any_execution_order() {
    let ts = TreeSequenceData::new(
        vec![
            paired_tree(interval(0.0, 1.0)),
            paired_tree(interval(1.0, 2.0)),
            paired_tree(interval(2.0, 3.0)),
        ],
        Vec::new(),
    )
    .unwrap();
    let phenotype = Phenotype::new("disease", array![0.1, 0.3, 1.2, 0.9], 3, 0);

    let mut parallel =
        AssociationEngine::per_tree(&ts, &phenotype, AssociationConfig::default()).unwrap();
    parallel.run().unwrap();
    let config = AssociationConfig {
        parallel: false,
        ..AssociationConfig::default()
    };
    let mut sequential = AssociationEngine::per_tree(&ts, &phenotype, config).unwrap();
    sequential.run().unwrap();

    let p = parallel.p_values();
    assert_eq!(p[0], p[1]);
    assert_eq!(p[1], p[2]);
    assert_eq!(p, sequential.p_values());
}

#[test]
fn regression_p_value_shrinks_with_noise() {
    let n = 200;
    let mut rng = StdRng::seed_from_u64(11);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let genotypes = Array1::from_iter((0..n).map(|_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 }));
    let noise = Array1::from_iter((0..n).map(|_| normal.sample(&mut rng)));

    let ts = TreeSequenceData::new(
        vec![star(interval(0.0, 100.0), 1.0, n)],
        vec![Site::new(50.0, genotypes.clone())],
    )
    .unwrap();

    let p_value_for = |scale: f64| {
        let values = &genotypes + &(&noise * scale);
        let phenotype = Phenotype::new("quantitative", values, 1, 1);
        let mut engine =
            AssociationEngine::per_site(&ts, &phenotype, AssociationConfig::default()).unwrap();
        engine.run().unwrap();
        engine.p_values()[0]
    };

    let noisy = p_value_for(2.0);
    let clean = p_value_for(0.1);
    assert!(noisy > 0.0 && noisy <= 1.0);
    assert!(clean < noisy);
    assert!(clean < 1e-6);
}

#[test]
fn constant_site_is_left_unset() {
    let ts = TreeSequenceData::new(
        vec![star(interval(0.0, 10.0), 1.0, 4)],
        vec![
            Site::new(1.0, array![1.0, 1.0, 1.0, 1.0]),
            Site::new(2.0, array![0.0, 1.0, 1.0, 0.0]),
        ],
    )
    .unwrap();
    let phenotype = Phenotype::new("quantitative", array![0.2, 1.1, 0.9, 0.1], 1, 2);
    let config = AssociationConfig {
        regression: tgwas::RegressionOptions { intercept: true },
        ..AssociationConfig::default()
    };
    let mut engine = AssociationEngine::per_site(&ts, &phenotype, config).unwrap();
    let summary = engine.run().unwrap();
    assert_eq!(summary.undefined, 1);
    assert_eq!(summary.tested, 1);
    assert!(engine.p_values()[0].is_nan());
    assert!(engine.p_values()[1] < 0.05);
}

// Descendant sets {0, 1} and {1, 2} overlap without nesting, which yields a
// covariance matrix with a negative eigenvalue.
struct OverlappingTree {
    interval: Interval,
    descendants: Vec<Vec<usize>>,
}

impl OverlappingTree {
    const TIMES: [f64; 6] = [0.0, 0.0, 0.0, 1.0, 1.0, 5.0];
    const PARENTS: [Option<NodeId>; 6] = [Some(3), Some(3), Some(4), Some(5), Some(5), None];

    fn new(interval: Interval) -> Self {
        Self {
            interval,
            descendants: vec![
                vec![0],
                vec![1],
                vec![2],
                vec![0, 1],
                vec![1, 2],
                vec![0, 1, 2],
            ],
        }
    }
}

enum MixedTree {
    Valid(Tree),
    Broken(OverlappingTree),
}

impl LocalTree for MixedTree {
    fn num_samples(&self) -> usize {
        match self {
            Self::Valid(tree) => tree.num_samples(),
            Self::Broken(_) => 3,
        }
    }

    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let count = match self {
            Self::Valid(tree) => tree.num_nodes(),
            Self::Broken(tree) => tree.descendants.len(),
        };
        0..count
    }

    fn time(&self, node: NodeId) -> f64 {
        match self {
            Self::Valid(tree) => tree.time(node),
            Self::Broken(_) => OverlappingTree::TIMES[node],
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        match self {
            Self::Valid(tree) => tree.parent(node),
            Self::Broken(_) => OverlappingTree::PARENTS[node],
        }
    }

    fn samples(&self, node: NodeId) -> &[usize] {
        match self {
            Self::Valid(tree) => tree.samples(node),
            Self::Broken(tree) => &tree.descendants[node],
        }
    }

    fn total_branch_length(&self) -> f64 {
        match self {
            Self::Valid(tree) => tree.total_branch_length(),
            Self::Broken(_) => 11.0,
        }
    }

    fn interval(&self) -> Interval {
        match self {
            Self::Valid(tree) => tree.interval(),
            Self::Broken(tree) => tree.interval,
        }
    }
}

struct MixedSequence {
    trees: Vec<MixedTree>,
}

impl TreeSequence for MixedSequence {
    type Tree = MixedTree;

    fn num_samples(&self) -> usize {
        3
    }

    fn num_trees(&self) -> usize {
        self.trees.len()
    }

    fn trees(&self) -> impl Iterator<Item = &Self::Tree> + '_ {
        self.trees.iter()
    }

    fn num_sites(&self) -> usize {
        0
    }

    fn sites(&self) -> impl Iterator<Item = &Site> + '_ {
        std::iter::empty()
    }
}

// ((0,1)@1,2)@3
fn three_sample_tree(interval: Interval) -> MixedTree {
    let nodes = vec![
        NodeRecord::internal(3.0, None),
        NodeRecord::internal(1.0, Some(0)),
        NodeRecord::sample(0, Some(1)),
        NodeRecord::sample(1, Some(1)),
        NodeRecord::sample(2, Some(0)),
    ];
    MixedTree::Valid(Tree::new(interval, nodes, 3).unwrap())
}

fn sequence_with_broken_middle_tree() -> MixedSequence {
    MixedSequence {
        trees: vec![
            three_sample_tree(interval(0.0, 1.0)),
            MixedTree::Broken(OverlappingTree::new(interval(1.0, 2.0))),
            three_sample_tree(interval(2.0, 3.0)),
        ],
    }
}

#[test]
fn abort_policy_reports_the_failing_tree_and_commits_nothing() {
    init_logging();
    let ts = sequence_with_broken_middle_tree();
    let phenotype = Phenotype::new("disease", array![0.0, 0.0, 1.0], 3, 0);
    let mut engine =
        AssociationEngine::per_tree(&ts, &phenotype, AssociationConfig::default()).unwrap();

    match engine.run() {
        Err(AssociationError::Unit {
            unit: AnalysisUnit::Tree,
            index: 1,
            source: UnitError::Stability(StabilityError::NonPsdMatrix { min_eigenvalue, .. }),
        }) => assert!(min_eigenvalue < -0.5),
        other => panic!("expected a non-PSD failure on tree 1, got {other:?}"),
    }
    assert!(engine.p_values().iter().all(|p| p.is_nan()));
    assert!(!engine.is_complete());
}

#[test]
fn skip_policy_keeps_the_remaining_trees() {
    let ts = sequence_with_broken_middle_tree();
    let phenotype = Phenotype::new("disease", array![0.0, 0.0, 1.0], 3, 0);
    let config = AssociationConfig {
        failure_policy: FailurePolicy::SkipAndContinue,
        ..AssociationConfig::default()
    };
    let mut engine = AssociationEngine::per_tree(&ts, &phenotype, config).unwrap();
    let summary = engine.run().unwrap();

    assert_eq!(summary.tested, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].index, 1);
    let p = engine.p_values();
    assert!(p[1].is_nan());
    assert!(!p[0].is_nan());
    assert_eq!(p[0], p[2]);
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    done: AtomicUsize,
    finished: AtomicUsize,
}

impl ProgressObserver for CountingObserver {
    fn on_start(&self, unit: AnalysisUnit, total: usize) {
        assert_eq!(unit, AnalysisUnit::Variant);
        self.started.fetch_add(total, Ordering::SeqCst);
    }

    fn on_unit_done(&self, unit: AnalysisUnit, index: usize) {
        assert_eq!(unit, AnalysisUnit::Variant);
        assert!(index < 3);
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn on_finish(&self, unit: AnalysisUnit) {
        assert_eq!(unit, AnalysisUnit::Variant);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn observer_sees_every_site_of_a_selected_run() {
    let ts = TreeSequenceData::new(
        vec![star(interval(0.0, 50.0), 1.0, 4), star(interval(50.0, 100.0), 2.0, 4)],
        vec![
            Site::new(10.0, array![1.0, 0.0, 0.0, 0.0]),
            Site::new(40.0, array![1.0, 1.0, 0.0, 0.0]),
            Site::new(70.0, array![0.0, 1.0, 1.0, 0.0]),
        ],
    )
    .unwrap();

    let table = VariantTable::build(&ts, &TypingFilter::default()).unwrap();
    let hit = table
        .find_variant(&VariantQuery {
            left: 30.0,
            right: 100.0,
            typed: true,
            allele_frequency: 0.5,
            seed: 1,
        })
        .unwrap();
    assert_eq!(hit.index, 1);
    assert_eq!(table.get(hit.index).unwrap().tree_index, 0);

    let causal = ts.site(hit.index).unwrap().genotypes.clone();
    let phenotype = Phenotype::new("simulated", &causal * 2.0 + 0.5, 2, 3);
    let config = AssociationConfig {
        regression: tgwas::RegressionOptions { intercept: true },
        ..AssociationConfig::default()
    };
    let observer = CountingObserver::default();
    let mut engine = AssociationEngine::per_site(&ts, &phenotype, config).unwrap();
    engine.run_with_progress(&observer).unwrap();

    assert_eq!(observer.started.load(Ordering::SeqCst), 3);
    assert_eq!(observer.done.load(Ordering::SeqCst), 3);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    assert_eq!(engine.p_values()[1], 0.0);
}
